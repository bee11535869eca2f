#![cfg(test)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::kernel::context::AppContext;
use crate::kernel::error::BoxError;
use crate::module_system::{
    FactoryRegistry, LoaderConfig, Module, ModuleDescriptor, ModuleHandle,
};
use crate::readiness::ReadinessCell;
use crate::storage::ConfigData;

// ===== MOCK MODULES =====

/// Shared record of `init:<name>` / `ready:<name>` entries, in the order they happened
pub type OrderLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> OrderLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &OrderLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Position of `entry` in the log; panics when missing
pub fn position(log: &OrderLog, entry: &str) -> usize {
    entries(log)
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("'{}' not in log {:?}", entry, entries(log)))
}

/// What a [`StubModule`] does when initialised
#[derive(Debug, Clone)]
pub enum Behavior {
    Ready,
    ReadyAfter(Duration),
    FailInit(String),
    FailReadiness(String),
    PanicInit(String),
    /// Never settles
    Hang,
}

#[derive(Debug)]
pub struct StubModule {
    name: String,
    behavior: Behavior,
    ready: ReadinessCell<()>,
    log: OrderLog,
}

impl StubModule {
    pub fn new(name: &str, behavior: Behavior, log: OrderLog) -> Self {
        Self { name: name.to_string(), behavior, ready: ReadinessCell::new(), log }
    }
}

#[async_trait]
impl Module for StubModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn readiness(&self) -> &ReadinessCell<()> {
        &self.ready
    }

    async fn initialize(&self, _ctx: &AppContext) -> Result<(), BoxError> {
        self.log.lock().unwrap().push(format!("init:{}", self.name));
        match &self.behavior {
            Behavior::Ready => {
                self.log.lock().unwrap().push(format!("ready:{}", self.name));
                self.ready.mark_ready(());
            }
            Behavior::ReadyAfter(delay) => {
                let (delay, cell, log, name) = (*delay, self.ready.clone(), Arc::clone(&self.log), self.name.clone());
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    log.lock().unwrap().push(format!("ready:{}", name));
                    cell.mark_ready(());
                });
            }
            Behavior::FailInit(message) => return Err(message.clone().into()),
            Behavior::FailReadiness(reason) => {
                self.ready.mark_failed(reason.clone());
            }
            Behavior::PanicInit(message) => panic!("{}", message),
            Behavior::Hang => {}
        }
        Ok(())
    }
}

// ===== DESCRIPTORS & FACTORIES =====

pub fn core_api(name: &str, api: &str) -> ModuleDescriptor {
    ModuleDescriptor::builder(name, "1.0.0").core_api(api).build()
}

pub fn plain(name: &str) -> ModuleDescriptor {
    ModuleDescriptor::builder(name, "1.0.0").build()
}

/// Factory building a [`StubModule`] with the given behaviour for each name
pub fn stub_factory(specs: &[(&str, Behavior)], log: &OrderLog) -> FactoryRegistry {
    let mut factories = FactoryRegistry::new();
    for (name, behavior) in specs {
        let (behavior, log) = (behavior.clone(), Arc::clone(log));
        factories.register(name, move |descriptor, _ctx| {
            Ok(Arc::new(StubModule::new(&descriptor.name, behavior.clone(), Arc::clone(&log))) as ModuleHandle)
        });
    }
    factories
}

pub fn test_context() -> AppContext {
    context_with(LoaderConfig::default())
}

pub fn context_with(loader_config: LoaderConfig) -> AppContext {
    AppContext::new("test-app", std::env::temp_dir(), ConfigData::new(), loader_config)
}
