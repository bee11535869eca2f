#![cfg(test)]

use std::fs;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::tempdir;

use crate::kernel::bootstrap::Application;
use crate::kernel::context::AppContext;
use crate::kernel::error::BoxError;
use crate::module_system::{DirectoryDiscovery, FactoryRegistry, Module, ModuleHandle};
use crate::readiness::ReadinessCell;
use crate::storage::ConfigData;
use crate::tests::integration::common::{Behavior, new_log, stub_factory};

/// Captures its config section during initialisation
#[derive(Debug)]
struct ConfiguredModule {
    name: String,
    ready: ReadinessCell<()>,
    port: Mutex<Option<u16>>,
}

#[async_trait]
impl Module for ConfiguredModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn readiness(&self) -> &ReadinessCell<()> {
        &self.ready
    }

    async fn initialize(&self, ctx: &AppContext) -> Result<(), BoxError> {
        let section = ctx.config_for(&self.name);
        let port = section.get::<u16>("port").ok_or("missing port")?;
        *self.port.lock().unwrap() = Some(port);
        ctx.log(log::Level::Info, &self.name, format!("configured on {}", port));
        self.ready.mark_ready(());
        Ok(())
    }
}

fn write_module(root: &std::path::Path, dir: &str, manifest: &str) {
    let module_dir = root.join(dir);
    fs::create_dir_all(&module_dir).unwrap();
    fs::write(module_dir.join("keystone.json"), manifest).unwrap();
}

#[tokio::test]
async fn test_boot_from_disk_with_config_file() {
    let dir = tempdir().unwrap();
    let modules = dir.path().join("modules");
    write_module(
        &modules,
        "server",
        r#"{ "name": "keystone-server", "version": "1.0.0", "core_api_name": "server", "keystone_versions": ">=0.1.0" }"#,
    );
    write_module(&modules, "audit", r#"{ "name": "keystone-audit", "version": "0.2.0" }"#);
    fs::create_dir_all(modules.join("not-a-module")).unwrap();

    let config_path = dir.path().join("config.json");
    fs::write(&config_path, r#"{ "server": { "port": 5678 } }"#).unwrap();
    let config = ConfigData::load_from_path(&config_path).await.unwrap();

    let log = new_log();
    let mut factories = stub_factory(&[("audit", Behavior::Ready)], &log);
    factories.register("server", |d, _| {
        Ok(Arc::new(ConfiguredModule { name: d.name.clone(), ready: ReadinessCell::new(), port: Mutex::new(None) })
            as ModuleHandle)
    });

    let mut app = Application::builder()
        .name("disk-app")
        .root_dir(dir.path())
        .config(config)
        .discovery(DirectoryDiscovery::new(&modules))
        .factories(factories)
        .build();
    app.start().await.expect("boot should succeed");

    let ctx = app.context();
    let server = ctx.get_module_as::<ConfiguredModule>("server").unwrap();
    assert_eq!(*server.port.lock().unwrap(), Some(5678));
    let core = ctx.core_api("server").expect("server API published");
    assert_eq!(core.name(), "keystone-server");
    assert_eq!(ctx.loader().loaded_modules(), vec!["keystone-audit", "keystone-server"]);
}

#[tokio::test]
async fn test_missing_config_fails_boot() {
    let dir = tempdir().unwrap();
    let modules = dir.path().join("modules");
    write_module(&modules, "server", r#"{ "name": "keystone-server", "version": "1.0.0", "core_api_name": "server" }"#);

    let mut factories = FactoryRegistry::new();
    factories.register("server", |d, _| {
        Ok(Arc::new(ConfiguredModule { name: d.name.clone(), ready: ReadinessCell::new(), port: Mutex::new(None) })
            as ModuleHandle)
    });
    let mut app = Application::builder().root_dir(dir.path()).factories(factories).build();

    let err = app.start().await.unwrap_err();
    let lines = app.report_failure(&err);
    assert!(lines.iter().any(|l| l.starts_with("keystone-server: ") && l.contains("missing port")), "{:?}", lines);
}
