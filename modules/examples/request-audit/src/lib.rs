//! Example rest-phase module that depends on the `server` core API.
//!
//! It waits for the server, tags every request with a sequential audit id
//! header and, optionally, exposes the running count at `GET /audit`.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use core_server::{Request, Response, ServerModule};
use keystone_core::kernel::error::BoxError;
use keystone_core::{AppContext, FactoryRegistry, Module, ModuleDescriptor, ModuleHandle, ReadinessCell, observer_sync};
use log::info;
use serde::Deserialize;

pub const MODULE_NAME: &str = "keystone-audit";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub header: String,
    pub expose_route: bool,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self { header: "x-audit-id".to_string(), expose_route: true }
    }
}

pub fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor::builder(MODULE_NAME, env!("CARGO_PKG_VERSION"))
        .description("Tags and counts requests")
        .build()
}

pub fn register(factories: &mut FactoryRegistry) {
    factories.register(MODULE_NAME, |descriptor, _ctx| {
        Ok(Arc::new(AuditModule::new(&descriptor.name)) as ModuleHandle)
    });
}

#[derive(Debug)]
pub struct AuditModule {
    name: String,
    ready: ReadinessCell<()>,
    seen: Arc<AtomicU64>,
}

impl AuditModule {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), ready: ReadinessCell::new(), seen: Arc::new(AtomicU64::new(0)) }
    }

    /// Requests observed so far, rejected ones included
    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Module for AuditModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn readiness(&self) -> &ReadinessCell<()> {
        &self.ready
    }

    async fn initialize(&self, ctx: &AppContext) -> Result<(), BoxError> {
        let settings: AuditSettings = ctx.config_for(&self.name).parse()?;
        let server = ctx.wait_for_as::<ServerModule>(core_server::CORE_API_NAME).await?;

        let (seen, header) = (Arc::clone(&self.seen), settings.header.clone());
        server.request_hook().register(observer_sync("audit", move |req: Request| {
            let id = seen.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Some(req.with_header(&header, &id.to_string())))
        }));

        if settings.expose_route {
            let seen = Arc::clone(&self.seen);
            server.route("GET", "/audit", move |_| Response::ok(seen.load(Ordering::SeqCst).to_string()));
        }

        info!("Auditing requests under header '{}'", settings.header);
        self.ready.mark_ready(());
        Ok(())
    }
}
