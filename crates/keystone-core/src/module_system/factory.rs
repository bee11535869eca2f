use std::collections::BTreeMap;
use std::fmt;

use crate::kernel::constants::MODULE_PREFIX;
use crate::kernel::context::AppContext;
use crate::kernel::error::BoxError;
use crate::module_system::ModuleHandle;
use crate::module_system::descriptor::ModuleDescriptor;
use crate::module_system::error::InstantiationError;
use crate::module_system::graph::name_candidates;

/// Constructs module instances from their descriptors.
///
/// Construction is synchronous; asynchronous set-up belongs in
/// [`Module::initialize`](crate::module_system::Module::initialize).
pub trait ModuleFactory: Send + Sync {
    fn construct(&self, descriptor: &ModuleDescriptor, ctx: &AppContext) -> Result<ModuleHandle, InstantiationError>;
}

/// Constructor closure stored in a [`FactoryRegistry`]
pub type ConstructorFn = Box<dyn Fn(&ModuleDescriptor, &AppContext) -> Result<ModuleHandle, BoxError> + Send + Sync>;

/// Maps module names to constructor closures.
///
/// Modules are compiled in, so this is how a descriptor found on disk is
/// tied to the Rust type implementing it. Lookups accept the short alias or
/// the prefixed name.
pub struct FactoryRegistry {
    constructors: BTreeMap<String, ConstructorFn>,
    prefix: String,
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("modules", &self.constructors.keys().collect::<Vec<_>>())
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::with_prefix(MODULE_PREFIX)
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self { constructors: BTreeMap::new(), prefix: prefix.to_string() }
    }

    /// Register the constructor for `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: &str, constructor: F) -> &mut Self
    where
        F: Fn(&ModuleDescriptor, &AppContext) -> Result<ModuleHandle, BoxError> + Send + Sync + 'static,
    {
        if self.constructors.insert(name.to_string(), Box::new(constructor)).is_some() {
            log::warn!("Replaced module factory for '{}'", name);
        }
        self
    }

    fn lookup(&self, name: &str) -> Option<&ConstructorFn> {
        name_candidates(name, &self.prefix)
            .iter()
            .find_map(|candidate| self.constructors.get(candidate))
    }

    pub fn has(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleFactory for FactoryRegistry {
    fn construct(&self, descriptor: &ModuleDescriptor, ctx: &AppContext) -> Result<ModuleHandle, InstantiationError> {
        let constructor = self
            .lookup(&descriptor.name)
            .ok_or_else(|| InstantiationError::NoFactory { name: descriptor.name.clone() })?;
        constructor(descriptor, ctx).map_err(|source| InstantiationError::ConstructorFailed {
            name: descriptor.name.clone(),
            source,
        })
    }
}
