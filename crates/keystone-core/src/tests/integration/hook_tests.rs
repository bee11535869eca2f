#![cfg(test)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::hook::{HookError, HookPipeline, observer_fn, observer_sync};
use crate::kernel::bootstrap::Application;
use crate::kernel::context::AppContext;
use crate::kernel::error::BoxError;
use crate::module_system::{FactoryRegistry, Module, ModuleHandle, StaticDiscovery};
use crate::readiness::ReadinessCell;
use crate::tests::integration::common::{core_api, plain};

/// Owns a series, mutable pipeline over request paths
#[derive(Debug)]
struct RouterModule {
    name: String,
    ready: ReadinessCell<()>,
    on_request: HookPipeline<String>,
}

#[async_trait]
impl Module for RouterModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn readiness(&self) -> &ReadinessCell<()> {
        &self.ready
    }
}

/// Taps the router's hook from another module
#[derive(Debug)]
struct TapModule {
    name: String,
    ready: ReadinessCell<()>,
    seen: Arc<AtomicUsize>,
}

#[async_trait]
impl Module for TapModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn readiness(&self) -> &ReadinessCell<()> {
        &self.ready
    }

    async fn initialize(&self, ctx: &AppContext) -> Result<(), BoxError> {
        let router = ctx.wait_for_as::<RouterModule>("router").await?;
        let seen = Arc::clone(&self.seen);
        router.on_request.register(observer_sync("count", move |_path: String| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }));
        router.on_request.register(observer_fn("prefix", |path: String| async move {
            Ok::<_, BoxError>(Some(format!("/v1{}", path)))
        }));
        self.ready.mark_ready(());
        Ok(())
    }
}

fn factories(seen: &Arc<AtomicUsize>) -> FactoryRegistry {
    let mut factories = FactoryRegistry::new();
    factories.register("router", |d, _| {
        Ok(Arc::new(RouterModule {
            name: d.name.clone(),
            ready: ReadinessCell::new(),
            on_request: HookPipeline::series(true),
        }) as ModuleHandle)
    });
    let seen = Arc::clone(seen);
    factories.register("tap", move |d, _| {
        Ok(Arc::new(TapModule { name: d.name.clone(), ready: ReadinessCell::new(), seen: Arc::clone(&seen) })
            as ModuleHandle)
    });
    factories
}

#[tokio::test]
async fn test_module_taps_hook_of_core_api() {
    let seen = Arc::new(AtomicUsize::new(0));
    let mut app = Application::builder()
        .discovery(StaticDiscovery::new(vec![plain("keystone-tap"), core_api("keystone-router", "router")]))
        .factories(factories(&seen))
        .build();
    app.start().await.expect("boot should succeed");

    let router = app.context().get_module_as::<RouterModule>("router").unwrap();
    assert_eq!(router.on_request.len(), 2);

    let outcome = router.on_request.invoke("/users".to_string()).await.unwrap();
    assert_eq!(outcome.payload, "/v1/users");
    let outcome = router.on_request.invoke("/".to_string()).await.unwrap();
    assert_eq!(outcome.payload, "/v1/");
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failing_observer_surfaces_to_owner() {
    let seen = Arc::new(AtomicUsize::new(0));
    let mut app = Application::builder()
        .discovery(StaticDiscovery::new(vec![plain("keystone-tap"), core_api("keystone-router", "router")]))
        .factories(factories(&seen))
        .build();
    app.start().await.unwrap();

    let router = app.context().get_module_as::<RouterModule>("router").unwrap();
    router
        .on_request
        .register(observer_sync("deny", |path: String| Err(format!("{} is forbidden", path).into())));

    match router.on_request.invoke("/admin".to_string()).await {
        Err(HookError::ObserverFailed { index, observer, source }) => {
            assert_eq!(index, 2);
            assert_eq!(observer, "deny");
            assert_eq!(source.to_string(), "/v1/admin is forbidden");
        }
        other => panic!("expected ObserverFailed, got {:?}", other.map(|o| o.payload)),
    }
}
