//! Core-API module owning the application's request pipeline.
//!
//! Requests are plain values handed to [`ServerModule::handle`]; every request
//! first passes through [`ServerModule::request_hook`], a mutable series hook
//! other modules register observers on to inspect, rewrite or reject it. The
//! server reports ready as soon as its hook exists (so dependants can attach
//! to it during loading) but only starts serving once the whole application
//! has loaded.
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use keystone_core::kernel::error::BoxError;
use keystone_core::{
    AppContext, FactoryRegistry, HookPipeline, Module, ModuleDescriptor, ModuleHandle, ReadinessCell, ReadinessError,
};
use serde::Deserialize;

pub const MODULE_NAME: &str = "keystone-server";
pub const CORE_API_NAME: &str = "server";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Request {
    pub fn new(method: &str, path: &str) -> Self {
        Self { method: method.to_uppercase(), path: path.to_string(), ..Self::default() }
    }

    pub fn get(path: &str) -> Self {
        Self::new("GET", path)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The module's config section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 5678 }
    }
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

type Handler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

pub fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor::builder(MODULE_NAME, env!("CARGO_PKG_VERSION"))
        .description("Interceptable request pipeline")
        .core_api(CORE_API_NAME)
        .build()
}

pub fn register(factories: &mut FactoryRegistry) {
    factories.register(MODULE_NAME, |descriptor, _ctx| {
        Ok(Arc::new(ServerModule::new(&descriptor.name)) as ModuleHandle)
    });
}

pub struct ServerModule {
    name: String,
    ready: ReadinessCell<()>,
    /// Settles with the bound address once the application has loaded
    listening: ReadinessCell<String>,
    settings: Mutex<ServerSettings>,
    request_hook: HookPipeline<Request>,
    routes: RwLock<HashMap<(String, String), Handler>>,
    served: AtomicU64,
}

impl fmt::Debug for ServerModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerModule")
            .field("name", &self.name)
            .field("listening", &self.listening)
            .field("request_hook", &self.request_hook)
            .field("served", &self.served)
            .finish_non_exhaustive()
    }
}

impl ServerModule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ready: ReadinessCell::new(),
            listening: ReadinessCell::new(),
            settings: Mutex::new(ServerSettings::default()),
            request_hook: HookPipeline::series(true),
            routes: RwLock::new(HashMap::new()),
            served: AtomicU64::new(0),
        }
    }

    /// Series, mutable hook every request passes through before routing.
    ///
    /// An observer returning `Some(request)` replaces the request; an error rejects it.
    pub fn request_hook(&self) -> &HookPipeline<Request> {
        &self.request_hook
    }

    pub fn settings(&self) -> ServerSettings {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Add a route, replacing any existing handler for the same method and path.
    pub fn route<F>(&self, method: &str, path: &str, handler: F)
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((method.to_uppercase(), path.to_string()), Arc::new(handler));
    }

    pub fn is_listening(&self) -> bool {
        self.listening.is_ready()
    }

    /// Resolves with the address once serving starts.
    pub async fn wait_listening(&self) -> Result<String, ReadinessError> {
        self.listening.wait().await
    }

    pub fn served(&self) -> u64 {
        self.served.load(Ordering::SeqCst)
    }

    pub async fn handle(&self, request: Request) -> Response {
        if !self.is_listening() {
            return Response::new(503, "not listening yet");
        }

        let request = match self.request_hook.invoke(request).await {
            Ok(outcome) => outcome.payload,
            Err(e) => {
                log::warn!("Request rejected by hook: {}", e);
                return Response::new(403, e.to_string());
            }
        };

        let handler = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(request.method.clone(), request.path.clone()))
            .cloned();
        self.served.fetch_add(1, Ordering::SeqCst);
        match handler {
            Some(handler) => handler(&request),
            None => Response::new(404, format!("no route for {} {}", request.method, request.path)),
        }
    }
}

#[async_trait]
impl Module for ServerModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn readiness(&self) -> &ReadinessCell<()> {
        &self.ready
    }

    async fn initialize(&self, ctx: &AppContext) -> Result<(), BoxError> {
        let settings: ServerSettings = ctx.config_for(&self.name).parse()?;
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner) = settings.clone();
        self.route("GET", "/health", |_| Response::ok("ok"));
        self.ready.mark_ready(());

        let (ctx, listening, name) = (ctx.clone(), self.listening.clone(), self.name.clone());
        tokio::spawn(async move {
            match ctx.wait_until_loaded().await {
                Ok(()) => {
                    let address = settings.address();
                    ctx.log(log::Level::Info, &name, format!("listening on {}", address));
                    listening.mark_ready(address);
                }
                Err(e) => {
                    ctx.log(log::Level::Warn, &name, format!("not serving: {}", e));
                    listening.mark_failed(e.to_string());
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests;
