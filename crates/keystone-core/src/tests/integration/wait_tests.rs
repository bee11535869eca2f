#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::kernel::bootstrap::Application;
use crate::kernel::context::AppContext;
use crate::kernel::error::BoxError;
use crate::module_system::{Module, ModuleHandle, StaticDiscovery};
use crate::readiness::ReadinessCell;
use crate::tests::integration::common::{Behavior, core_api, new_log, plain, position, stub_factory};

/// Ready immediately, but only "listens" once the whole application has loaded
#[derive(Debug)]
struct ListenerModule {
    name: String,
    ready: ReadinessCell<()>,
    listening: ReadinessCell<usize>,
}

#[async_trait]
impl Module for ListenerModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn readiness(&self) -> &ReadinessCell<()> {
        &self.ready
    }

    async fn initialize(&self, ctx: &AppContext) -> Result<(), BoxError> {
        self.ready.mark_ready(());
        let (ctx, listening) = (ctx.clone(), self.listening.clone());
        tokio::spawn(async move {
            match ctx.wait_until_loaded().await {
                Ok(()) => {
                    listening.mark_ready(ctx.loader().loaded_modules().len());
                }
                Err(e) => {
                    listening.mark_failed(e.to_string());
                }
            }
        });
        Ok(())
    }
}

fn listener_factory(extra: &[(&str, Behavior)]) -> crate::module_system::FactoryRegistry {
    let mut factories = stub_factory(extra, &new_log());
    factories.register("listener", |d, _| {
        Ok(Arc::new(ListenerModule {
            name: d.name.clone(),
            ready: ReadinessCell::new(),
            listening: ReadinessCell::new(),
        }) as ModuleHandle)
    });
    factories
}

#[tokio::test]
async fn test_core_api_waits_for_application_loaded() {
    let mut app = Application::builder()
        .discovery(StaticDiscovery::new(vec![
            core_api("keystone-listener", "listener"),
            plain("keystone-slow"),
        ]))
        .factories(listener_factory(&[("slow", Behavior::ReadyAfter(Duration::from_millis(20)))]))
        .build();
    app.start().await.expect("boot should succeed");

    let listener = app.context().get_module_as::<ListenerModule>("listener").unwrap();
    // Every module was loaded by the time it started listening.
    assert_eq!(listener.listening.wait().await, Ok(2));
}

#[tokio::test]
async fn test_listener_hears_about_failed_boot() {
    let mut app = Application::builder()
        .discovery(StaticDiscovery::new(vec![
            core_api("keystone-listener", "listener"),
            plain("keystone-broken"),
        ]))
        .factories(listener_factory(&[("broken", Behavior::FailInit("bad".into()))]))
        .build();
    assert!(app.start().await.is_err());

    let listener = app.context().get_module_as::<ListenerModule>("listener").unwrap();
    assert!(listener.listening.wait().await.is_err());
}

#[tokio::test]
async fn test_rest_module_waits_for_core_api_readiness() {
    let log = new_log();
    let factories = stub_factory(
        &[("db", Behavior::ReadyAfter(Duration::from_millis(25))), ("app", Behavior::Ready)],
        &log,
    );
    let mut app = Application::builder()
        .discovery(StaticDiscovery::new(vec![plain("keystone-app"), core_api("keystone-db", "db")]))
        .factories(factories)
        .build();

    let ctx = app.context().clone();
    let waiter = tokio::spawn(async move { ctx.wait_for("db").await.map(|m| m.name().to_string()) });
    app.start().await.unwrap();

    assert_eq!(waiter.await.unwrap().unwrap(), "keystone-db");
    assert!(position(&log, "ready:keystone-db") < position(&log, "init:keystone-app"));
}
