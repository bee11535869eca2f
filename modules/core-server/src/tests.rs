use super::*;
use keystone_core::module_system::StaticDiscovery;
use keystone_core::storage::ConfigData;
use keystone_core::{Application, observer_sync};
use serde_json::json;

async fn booted(config: serde_json::Value) -> (Application, Arc<ServerModule>) {
    let mut factories = FactoryRegistry::new();
    register(&mut factories);
    let mut app = Application::builder()
        .config(ConfigData::from_value(config))
        .discovery(StaticDiscovery::new(vec![descriptor()]))
        .factories(factories)
        .build();
    app.start().await.expect("server should load");
    let server = app.context().get_module_as::<ServerModule>(CORE_API_NAME).unwrap();
    (app, server)
}

#[test]
fn request_headers_are_case_insensitive() {
    let request = Request::new("post", "/items").with_header("X-Trace", "abc");
    assert_eq!(request.method, "POST");
    assert_eq!(request.header("x-trace"), Some("abc"));
    assert_eq!(request.header("X-TRACE"), Some("abc"));
    assert_eq!(request.header("missing"), None);
}

#[test]
fn settings_default_address() {
    assert_eq!(ServerSettings::default().address(), "127.0.0.1:5678");
    let settings: ServerSettings = ConfigData::from_value(json!({ "port": 8080 })).parse().unwrap();
    assert_eq!(settings.address(), "127.0.0.1:8080");
}

#[tokio::test]
async fn refuses_requests_before_listening() {
    let server = ServerModule::new(MODULE_NAME);
    let response = server.handle(Request::get("/health")).await;
    assert_eq!(response.status, 503);
    assert_eq!(server.served(), 0);
}

#[tokio::test]
async fn listens_on_configured_address_after_load() {
    let (_app, server) = booted(json!({ "server": { "host": "0.0.0.0", "port": 9000 } })).await;

    assert_eq!(server.wait_listening().await.unwrap(), "0.0.0.0:9000");
    assert_eq!(server.settings().port, 9000);

    let response = server.handle(Request::get("/health")).await;
    assert!(response.is_success());
    assert_eq!(response.body, "ok");

    let missing = server.handle(Request::get("/nope")).await;
    assert_eq!(missing.status, 404);
    assert_eq!(server.served(), 2);
}

#[tokio::test]
async fn hook_rewrites_and_rejects_requests() {
    let (_app, server) = booted(json!({})).await;
    server.wait_listening().await.unwrap();

    server.route("GET", "/whoami", |req| Response::ok(req.header("x-user").unwrap_or("anonymous").to_string()));
    server.request_hook().register(observer_sync("tag-user", |req: Request| {
        Ok(Some(req.with_header("x-user", "alice")))
    }));
    server.request_hook().register(observer_sync("block-admin", |req: Request| {
        if req.path.starts_with("/admin") {
            return Err("admin is closed".into());
        }
        Ok(None)
    }));

    let response = server.handle(Request::get("/whoami")).await;
    assert_eq!(response, Response::ok("alice"));

    let blocked = server.handle(Request::get("/admin/users")).await;
    assert_eq!(blocked.status, 403);
    assert!(blocked.body.contains("admin is closed"), "{}", blocked.body);
    // Rejected requests never reach routing.
    assert_eq!(server.served(), 1);
}

#[tokio::test]
async fn invalid_port_fails_the_module() {
    let mut factories = FactoryRegistry::new();
    register(&mut factories);
    let mut app = Application::builder()
        .config(ConfigData::from_value(json!({ "keystone-server": { "port": "high" } })))
        .discovery(StaticDiscovery::new(vec![descriptor()]))
        .factories(factories)
        .build();

    let err = app.start().await.unwrap_err();
    let lines = app.report_failure(&err);
    assert!(lines.iter().any(|l| l.starts_with("keystone-server: ")), "{:?}", lines);
}
