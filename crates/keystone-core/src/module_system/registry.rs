use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::module_system::descriptor::ModuleDescriptor;
use crate::module_system::error::{LookupError, ModuleError, PhaseFailure};
use crate::module_system::graph::name_candidates;
use crate::module_system::traits::{Module, ModuleHandle, ModuleState};

/// Lifecycle slot of a module the loader has started on
#[derive(Debug, Clone)]
enum ModuleSlot {
    /// Claimed by the loader, constructor not yet returned
    Reserved,
    Constructed(ModuleHandle),
    Initializing(ModuleHandle),
    Ready(ModuleHandle),
    Failed(Arc<ModuleError>),
}

impl ModuleSlot {
    fn state(&self) -> ModuleState {
        match self {
            ModuleSlot::Reserved => ModuleState::Discovered,
            ModuleSlot::Constructed(_) => ModuleState::Constructed,
            ModuleSlot::Initializing(_) => ModuleState::Initializing,
            ModuleSlot::Ready(_) => ModuleState::Ready,
            ModuleSlot::Failed(_) => ModuleState::Failed,
        }
    }
}

/// Book-keeping of every discovered module and how far it got.
///
/// Only the dependency loader mutates the registry; everyone else reads it
/// through the loader.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    prefix: String,
    descriptors: BTreeMap<String, ModuleDescriptor>,
    slots: HashMap<String, ModuleSlot>,
    /// core API name -> module name, for ready core-API modules
    core_apis: HashMap<String, String>,
}

impl ModuleRegistry {
    pub fn new(prefix: &str) -> Self {
        Self { prefix: prefix.to_string(), ..Self::default() }
    }

    pub(crate) fn set_descriptors(&mut self, descriptors: impl IntoIterator<Item = ModuleDescriptor>) {
        self.descriptors = descriptors.into_iter().map(|d| (d.name.clone(), d)).collect();
    }

    /// Record a descriptor the loader was handed directly; known names keep their descriptor.
    pub(crate) fn add_descriptor(&mut self, descriptor: ModuleDescriptor) {
        self.descriptors.entry(descriptor.name.clone()).or_insert(descriptor);
    }

    /// Installed name for `name`, accepting the short alias or the prefixed form
    pub fn resolve(&self, name: &str) -> Option<&str> {
        name_candidates(name, &self.prefix)
            .iter()
            .find_map(|candidate| self.descriptors.get_key_value(candidate.as_str()))
            .map(|(key, _)| key.as_str())
    }

    pub fn descriptor(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.resolve(name).and_then(|n| self.descriptors.get(n))
    }

    pub fn descriptors(&self) -> Vec<ModuleDescriptor> {
        self.descriptors.values().cloned().collect()
    }

    /// `None` for names that were never discovered
    pub fn state(&self, name: &str) -> Option<ModuleState> {
        let name = self.resolve(name)?;
        Some(self.slots.get(name).map_or(ModuleState::Discovered, ModuleSlot::state))
    }

    /// Synchronous lookup of a ready module.
    pub fn get(&self, name: &str) -> Result<ModuleHandle, LookupError> {
        let resolved = self
            .resolve(name)
            .ok_or_else(|| LookupError::NotFound { name: name.to_string() })?;
        match self.slots.get(resolved) {
            Some(ModuleSlot::Ready(handle)) => Ok(Arc::clone(handle)),
            other => Err(LookupError::NotLoaded {
                name: resolved.to_string(),
                state: other.map_or(ModuleState::Discovered, ModuleSlot::state),
            }),
        }
    }

    /// Typed variant of [`get`](Self::get).
    pub fn get_as<T: Module + 'static>(&self, name: &str) -> Result<Arc<T>, LookupError> {
        let handle = self.get(name)?;
        downcast_module::<T>(handle)
    }

    /// Ready or failed outcome of an installed module, `None` while still in flight
    pub fn settled(&self, installed_name: &str) -> Option<Result<ModuleHandle, Arc<ModuleError>>> {
        match self.slots.get(installed_name)? {
            ModuleSlot::Ready(handle) => Some(Ok(Arc::clone(handle))),
            ModuleSlot::Failed(error) => Some(Err(Arc::clone(error))),
            _ => None,
        }
    }

    /// Loaded core-API module published under `api_name`
    pub fn core_api(&self, api_name: &str) -> Option<ModuleHandle> {
        let module = self.core_apis.get(api_name)?;
        match self.slots.get(module) {
            Some(ModuleSlot::Ready(handle)) => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, ModuleSlot::Ready(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn failures(&self) -> Vec<PhaseFailure> {
        let mut failures: Vec<PhaseFailure> = self
            .slots
            .iter()
            .filter_map(|(name, slot)| match slot {
                ModuleSlot::Failed(error) => Some(PhaseFailure { module: name.clone(), error: Arc::clone(error) }),
                _ => None,
            })
            .collect();
        failures.sort_by(|a, b| a.module.cmp(&b.module));
        failures
    }

    // --- Loader-side transitions ---

    /// Claim `name` for instantiation. `false` if the loader already started on it.
    pub(crate) fn claim(&mut self, name: &str) -> bool {
        if self.slots.contains_key(name) {
            return false;
        }
        self.slots.insert(name.to_string(), ModuleSlot::Reserved);
        true
    }

    pub(crate) fn mark_constructed(&mut self, name: &str, handle: ModuleHandle) {
        self.slots.insert(name.to_string(), ModuleSlot::Constructed(handle));
    }

    pub(crate) fn mark_initializing(&mut self, name: &str, handle: ModuleHandle) {
        self.slots.insert(name.to_string(), ModuleSlot::Initializing(handle));
    }

    pub(crate) fn mark_ready(&mut self, name: &str, handle: ModuleHandle) {
        if let Some(api) = self.descriptors.get(name).and_then(|d| d.core_api_name.clone()) {
            self.core_apis.insert(api, name.to_string());
        }
        self.slots.insert(name.to_string(), ModuleSlot::Ready(handle));
    }

    pub(crate) fn mark_failed(&mut self, name: &str, error: Arc<ModuleError>) {
        self.slots.insert(name.to_string(), ModuleSlot::Failed(error));
    }
}

/// Downcast a module handle to its concrete type.
pub fn downcast_module<T: Module + 'static>(handle: ModuleHandle) -> Result<Arc<T>, LookupError> {
    let name = handle.name().to_string();
    handle
        .into_any_arc()
        .downcast::<T>()
        .map_err(|_| LookupError::TypeMismatch { name })
}
