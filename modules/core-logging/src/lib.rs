//! Core-API module installing the process-wide `tracing` subscriber.
//!
//! Library code everywhere logs through the `log` facade; this module bridges
//! those records into `tracing` (`tracing-log`) and installs a `fmt`
//! subscriber filtered by `RUST_LOG` or the module's `level` setting.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use keystone_core::kernel::error::BoxError;
use keystone_core::{AppContext, FactoryRegistry, Module, ModuleDescriptor, ModuleHandle, ReadinessCell};
use log::{debug, info};
use serde::Deserialize;
use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

pub const MODULE_NAME: &str = "keystone-logger";
/// Name the module is published under as a core API
pub const CORE_API_NAME: &str = "logger";

/// The module's config section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
    pub show_target: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false, show_target: true }
    }
}

/// Install the global subscriber. Returns `false` if one was already installed.
pub fn init_subscriber(settings: &LoggingSettings) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    // A `log` logger may already be set (tests, embedding applications).
    if let Err(e) = LogTracer::init() {
        debug!("log bridge not installed: {}", e);
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(settings.show_target);
    let installed = if settings.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.is_ok()
}

/// Descriptor used when the module is registered in code rather than discovered on disk
pub fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor::builder(MODULE_NAME, env!("CARGO_PKG_VERSION"))
        .description("Installs the tracing subscriber")
        .core_api(CORE_API_NAME)
        .build()
}

/// Register the module's constructor.
pub fn register(factories: &mut FactoryRegistry) {
    factories.register(MODULE_NAME, |descriptor, _ctx| {
        Ok(Arc::new(LoggingModule::new(&descriptor.name)) as ModuleHandle)
    });
}

#[derive(Debug)]
pub struct LoggingModule {
    name: String,
    ready: ReadinessCell<()>,
    settings: Mutex<Option<LoggingSettings>>,
    installed: AtomicBool,
}

impl LoggingModule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ready: ReadinessCell::new(),
            settings: Mutex::new(None),
            installed: AtomicBool::new(false),
        }
    }

    /// Settings in effect, once initialised
    pub fn settings(&self) -> Option<LoggingSettings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Whether this instance installed the global subscriber
    pub fn installed_subscriber(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Module for LoggingModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn readiness(&self) -> &ReadinessCell<()> {
        &self.ready
    }

    async fn initialize(&self, ctx: &AppContext) -> Result<(), BoxError> {
        let settings: LoggingSettings = ctx.config_for(&self.name).parse()?;
        let installed = init_subscriber(&settings);
        self.installed.store(installed, Ordering::SeqCst);
        if installed {
            info!("Logging initialised at level '{}'", settings.level);
        } else {
            ctx.log(log::Level::Debug, &self.name, "a subscriber was already installed, keeping it");
        }
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner) = Some(settings);
        self.ready.mark_ready(());
        Ok(())
    }
}
