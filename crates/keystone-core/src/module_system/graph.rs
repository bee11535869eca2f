use std::collections::HashMap;
use std::fmt;

use crate::module_system::descriptor::ModuleDescriptor;
use crate::module_system::error::DiscoveryError;

/// The two loading phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadPhase {
    /// Modules that publish a core API
    CoreApis,
    Rest,
}

impl LoadPhase {
    pub const ORDER: [LoadPhase; 2] = [LoadPhase::CoreApis, LoadPhase::Rest];
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadPhase::CoreApis => write!(f, "core-api"),
            LoadPhase::Rest => write!(f, "rest"),
        }
    }
}

/// Names under which a module asked for as `name` may be installed, most specific first.
///
/// `server` may be installed as `server` or `keystone-server`; `keystone-server`
/// as itself or `server`.
pub fn name_candidates(name: &str, prefix: &str) -> Vec<String> {
    let mut candidates = vec![name.to_string()];
    match name.strip_prefix(prefix) {
        Some(short) if !short.is_empty() => candidates.push(short.to_string()),
        _ => candidates.push(format!("{}{}", prefix, name)),
    }
    candidates
}

/// Descriptors partitioned into loading phases.
///
/// Built once per load and never recomputed. Every descriptor lands in
/// exactly one phase, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    core_api_phase: Vec<ModuleDescriptor>,
    rest_phase: Vec<ModuleDescriptor>,
}

impl DependencyGraph {
    /// Validate `descriptors` and partition them by `is_core_api`.
    pub fn build(descriptors: Vec<ModuleDescriptor>, prefix: &str) -> Result<Self, DiscoveryError> {
        validate(&descriptors, prefix)?;
        let (core_api_phase, rest_phase) = descriptors.into_iter().partition(|d| d.is_core_api);
        Ok(Self { core_api_phase, rest_phase })
    }

    pub fn phase(&self, phase: LoadPhase) -> &[ModuleDescriptor] {
        match phase {
            LoadPhase::CoreApis => &self.core_api_phase,
            LoadPhase::Rest => &self.rest_phase,
        }
    }

    pub fn core_api_phase(&self) -> &[ModuleDescriptor] {
        &self.core_api_phase
    }

    pub fn rest_phase(&self) -> &[ModuleDescriptor] {
        &self.rest_phase
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.core_api_phase.iter().chain(self.rest_phase.iter())
    }

    pub fn len(&self) -> usize {
        self.core_api_phase.len() + self.rest_phase.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate(descriptors: &[ModuleDescriptor], prefix: &str) -> Result<(), DiscoveryError> {
    let mut by_name: HashMap<&str, &ModuleDescriptor> = HashMap::new();
    for descriptor in descriptors {
        if let Some(first) = by_name.insert(&descriptor.name, descriptor) {
            return Err(DiscoveryError::DuplicateModule {
                name: descriptor.name.clone(),
                first: first.root_dir.clone(),
                second: descriptor.root_dir.clone(),
            });
        }
    }

    // `x` and `keystone-x` side by side would make the alias `x` ambiguous.
    for descriptor in descriptors {
        if let Some(short) = descriptor.name.strip_prefix(prefix) {
            if by_name.contains_key(short) {
                return Err(DiscoveryError::AmbiguousAlias {
                    alias: short.to_string(),
                    short: short.to_string(),
                    prefixed: descriptor.name.clone(),
                });
            }
        }
    }

    let mut apis: HashMap<&str, &str> = HashMap::new();
    for descriptor in descriptors {
        if let Some(api) = descriptor.core_api_name.as_deref() {
            if let Some(other) = apis.insert(api, &descriptor.name) {
                return Err(DiscoveryError::DuplicateCoreApi {
                    api: api.to_string(),
                    module: descriptor.name.clone(),
                    other: other.to_string(),
                });
            }
        }
    }
    Ok(())
}
