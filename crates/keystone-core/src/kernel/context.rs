use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use crate::event::{LifecycleEvent, SharedEventChannel, create_channel};
use crate::lang::{LangTable, Translator};
use crate::module_system::graph::name_candidates;
use crate::module_system::registry::downcast_module;
use crate::module_system::{DependencyLoader, LoaderConfig, LoaderError, LookupError, Module, ModuleHandle};
use crate::storage::ConfigData;

struct ContextInner {
    name: String,
    root_dir: PathBuf,
    events: SharedEventChannel<LifecycleEvent>,
    loader: DependencyLoader,
    config: ConfigData,
    translator: RwLock<Arc<dyn Translator>>,
}

/// Everything a module can reach: the loader, lifecycle events, config and
/// translation.
///
/// Passed to every factory and `Module::initialize`. Cloning is cheap and
/// clones share state, so modules may keep one for later use.
#[derive(Clone)]
pub struct AppContext {
    inner: Arc<ContextInner>,
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContext")
            .field("name", &self.inner.name)
            .field("root_dir", &self.inner.root_dir)
            .field("loader", &self.inner.loader)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    pub fn new(name: &str, root_dir: impl Into<PathBuf>, config: ConfigData, loader_config: LoaderConfig) -> Self {
        let events = create_channel();
        let loader = DependencyLoader::new(loader_config, Arc::clone(&events));
        Self {
            inner: Arc::new(ContextInner {
                name: name.to_string(),
                root_dir: root_dir.into(),
                events,
                loader,
                config,
                translator: RwLock::new(Arc::new(LangTable::builtin())),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn root_dir(&self) -> &Path {
        &self.inner.root_dir
    }

    /// The process-wide lifecycle channel
    pub fn events(&self) -> &SharedEventChannel<LifecycleEvent> {
        &self.inner.events
    }

    pub fn loader(&self) -> &DependencyLoader {
        &self.inner.loader
    }

    pub fn config(&self) -> &ConfigData {
        &self.inner.config
    }

    // --- Module access ---

    /// See [`DependencyLoader::wait_for`].
    pub async fn wait_for(&self, name: &str) -> Result<ModuleHandle, LoaderError> {
        self.inner.loader.wait_for(name).await
    }

    /// Wait for a module and downcast it to its concrete type.
    pub async fn wait_for_as<T: Module + 'static>(&self, name: &str) -> Result<Arc<T>, LoaderError> {
        let handle = self.wait_for(name).await?;
        downcast_module::<T>(handle).map_err(|_| LoaderError::TypeMismatch { name: name.to_string() })
    }

    pub fn get_module(&self, name: &str) -> Result<ModuleHandle, LookupError> {
        self.inner.loader.get_module(name)
    }

    pub fn get_module_as<T: Module + 'static>(&self, name: &str) -> Result<Arc<T>, LookupError> {
        self.inner.loader.get_module_as::<T>(name)
    }

    /// Loaded core-API module published under `api_name`
    pub fn core_api(&self, api_name: &str) -> Option<ModuleHandle> {
        self.inner.loader.core_api(api_name)
    }

    /// Resolve once every module is loaded.
    pub async fn wait_until_loaded(&self) -> Result<(), LoaderError> {
        self.inner.loader.wait_until_loaded().await
    }

    // --- Module-scoped helpers ---

    /// Config section of `module`, looked up by its short or prefixed name
    pub fn config_for(&self, module: &str) -> ConfigData {
        let prefix = &self.inner.loader.config().module_prefix;
        name_candidates(module, prefix)
            .iter()
            .find(|candidate| self.inner.config.contains_key(candidate))
            .map(|candidate| self.inner.config.section(candidate))
            .unwrap_or_default()
    }

    /// Log on behalf of `module`, tagged with its short name.
    pub fn log(&self, level: log::Level, module: &str, message: impl fmt::Display) {
        let prefix = &self.inner.loader.config().module_prefix;
        let short = module.strip_prefix(prefix.as_str()).unwrap_or(module);
        log::log!(target: "keystone::module", level, "{}: {}", short, message);
    }

    pub fn translate(&self, key: &str, data: &Value) -> String {
        self.translator().translate(key, data)
    }

    pub fn translator(&self) -> Arc<dyn Translator> {
        Arc::clone(&self.inner.translator.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the translator (e.g. with a table that includes module phrases).
    pub fn set_translator(&self, translator: Arc<dyn Translator>) {
        *self.inner.translator.write().unwrap_or_else(PoisonError::into_inner) = translator;
    }
}
