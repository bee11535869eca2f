use std::fs;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;

use crate::kernel::bootstrap::Application;
use crate::kernel::error::{Error, KernelLifecyclePhase};
use crate::lang::LangTable;
use crate::module_system::{LoaderError, StaticDiscovery};
use crate::tests::integration::common::{Behavior, core_api, new_log, plain, stub_factory};

#[tokio::test]
async fn test_start_loads_every_module() {
    let log = new_log();
    let mut app = Application::builder()
        .name("boot-test")
        .discovery(StaticDiscovery::new(vec![core_api("keystone-server", "server"), plain("keystone-audit")]))
        .factories(stub_factory(&[("server", Behavior::Ready), ("audit", Behavior::Ready)], &log))
        .build();

    assert!(!app.is_started());
    app.start().await.expect("start should succeed");
    assert!(app.is_started());

    let ctx = app.context();
    assert!(ctx.loader().is_loaded());
    assert_eq!(ctx.loader().loaded_modules(), vec!["keystone-audit", "keystone-server"]);
    assert!(ctx.core_api("server").is_some());
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let log = new_log();
    let mut app = Application::builder()
        .discovery(StaticDiscovery::new(vec![plain("keystone-a")]))
        .factories(stub_factory(&[("a", Behavior::Ready)], &log))
        .build();

    app.start().await.expect("first start should succeed");
    match app.start().await {
        Err(Error::KernelLifecycleError { phase, .. }) => assert_eq!(phase, KernelLifecyclePhase::RunPreCheck),
        other => panic!("expected RunPreCheck lifecycle error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_report_failure_lists_every_failed_module() {
    let log = new_log();
    let mut app = Application::builder()
        .discovery(StaticDiscovery::new(vec![plain("keystone-ok"), plain("keystone-broken"), plain("keystone-sad")]))
        .factories(stub_factory(
            &[
                ("ok", Behavior::Ready),
                ("broken", Behavior::FailInit("boom".into())),
                ("sad", Behavior::FailReadiness("no disk".into())),
            ],
            &log,
        ))
        .build();

    let err = app.start().await.expect_err("start should fail");
    assert!(matches!(err, Error::Loader(LoaderError::PhaseFailed { .. })));

    let lines = app.report_failure(&err);
    assert_eq!(lines[0], "Failed to load modules: 2 module(s) failed");
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("keystone-broken: ") && lines[1].contains("boom"), "{}", lines[1]);
    assert!(lines[2].starts_with("keystone-sad: ") && lines[2].contains("no disk"), "{}", lines[2]);

    // The healthy sibling stays usable.
    assert!(app.context().get_module("ok").is_ok());
}

#[tokio::test]
async fn test_report_failure_without_module_failures() {
    let log = new_log();
    let mut app = Application::builder()
        .name("dup-app")
        .discovery(StaticDiscovery::new(vec![plain("keystone-a"), plain("keystone-a")]))
        .factories(stub_factory(&[("a", Behavior::Ready)], &log))
        .build();

    let err = app.start().await.expect_err("duplicate modules must fail discovery");
    let lines = app.report_failure(&err);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("Failed to start dup-app: "), "{}", lines[0]);
    assert!(log.lock().unwrap().is_empty(), "no module may be constructed");
}

#[tokio::test]
async fn test_ready_timeout_fails_hanging_module() {
    let log = new_log();
    let mut app = Application::builder()
        .discovery(StaticDiscovery::new(vec![plain("keystone-slow")]))
        .factories(stub_factory(&[("slow", Behavior::Hang)], &log))
        .ready_timeout(Duration::from_millis(50))
        .build();

    let err = app.start().await.expect_err("hanging module must time out");
    let lines = app.report_failure(&err);
    assert!(lines.iter().any(|l| l.contains("keystone-slow") && l.contains("not ready within")), "{:?}", lines);
}

#[tokio::test]
async fn test_directory_discovery_and_module_phrases() {
    let dir = tempdir().unwrap();
    let module_dir = dir.path().join("modules").join("greeter");
    fs::create_dir_all(module_dir.join("lang")).unwrap();
    fs::write(
        module_dir.join("keystone.json"),
        r#"{ "name": "keystone-greeter", "version": "1.2.0" }"#,
    )
    .unwrap();
    fs::write(module_dir.join("lang").join("en.json"), r#"{ "greeter": { "hello": "Hello %{who}" } }"#).unwrap();

    let log = new_log();
    let mut app = Application::builder()
        .root_dir(dir.path())
        .factories(stub_factory(&[("greeter", Behavior::Ready)], &log))
        .build();

    app.start().await.expect("start should succeed");
    let ctx = app.context();
    assert!(ctx.get_module("greeter").is_ok());
    assert_eq!(ctx.translate("greeter.hello", &json!({ "who": "world" })), "Hello world");
    // Built-in phrases survive the reload.
    assert_eq!(ctx.translate("info.loaded", &json!({ "count": 1 })), "1 module(s) loaded");
}

#[tokio::test]
async fn test_custom_translator_is_kept() {
    let mut table = LangTable::new("en");
    table.insert("en", "error.startfailed", "custom %{app}");
    let log = new_log();
    let mut app = Application::builder()
        .name("custom")
        .discovery(StaticDiscovery::new(vec![plain("keystone-x"), plain("x")]))
        .factories(stub_factory(&[], &log))
        .translator(Arc::new(table))
        .build();

    let err = app.start().await.expect_err("ambiguous alias must fail");
    assert_eq!(app.report_failure(&err), vec!["custom custom".to_string()]);
}
