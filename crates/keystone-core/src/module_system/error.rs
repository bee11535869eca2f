//! # Keystone Core Module System Errors
//!
//! Error taxonomy of the module system:
//!
//! - [`DiscoveryError`]: a descriptor is duplicated, malformed or incompatible.
//!   Fatal before any loading phase starts.
//! - [`InstantiationError`]: no factory or the constructor failed. Scoped to one module.
//! - [`ModuleError`]: everything that can go wrong for a single module,
//!   aggregated by the loader at the phase boundary.
//! - [`LoaderError`]: what `load` and `wait_for` callers see.
//! - [`LookupError`]: synchronous `get_module` failures.
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::kernel::error::BoxError;
use crate::module_system::graph::LoadPhase;
use crate::module_system::loader::LoaderState;
use crate::module_system::traits::ModuleState;
use crate::module_system::version::VersionError;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Duplicate module '{name}' (found in '{first}' and '{second}')")]
    DuplicateModule {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Module alias '{alias}' is ambiguous: both '{short}' and '{prefixed}' are installed")]
    AmbiguousAlias {
        alias: String,
        short: String,
        prefixed: String,
    },

    #[error("Module '{module}' and '{other}' both claim core API name '{api}'")]
    DuplicateCoreApi {
        api: String,
        module: String,
        other: String,
    },

    #[error("Invalid module manifest '{path}': {message}")]
    InvalidManifest {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Module '{name}' requires keystone {required}, running {running}")]
    IncompatibleVersion {
        name: String,
        required: String,
        running: String,
    },

    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    #[error("I/O error during module discovery '{operation}' on '{path}': {source}")]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl DiscoveryError {
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        DiscoveryError::Io { path, operation: operation.into(), source }
    }
}

#[derive(Debug, Error)]
pub enum InstantiationError {
    #[error("No factory registered for module '{name}'")]
    NoFactory { name: String },

    #[error("Constructor of module '{name}' failed: {source}")]
    ConstructorFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("Constructor of module '{name}' panicked: {message}")]
    ConstructorPanicked { name: String, message: String },
}

/// Why a single module did not reach ready
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error(transparent)]
    Instantiation(#[from] InstantiationError),

    #[error("Initialization of module '{name}' failed: {source}")]
    InitializationFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("Module '{name}' panicked during initialization: {message}")]
    InitializationPanicked { name: String, message: String },

    #[error("Module '{name}' reported failure: {reason}")]
    ReadinessFailed { name: String, reason: String },

    #[error("Module '{name}' was not ready within {timeout:?}")]
    ReadinessTimeout { name: String, timeout: Duration },

    #[error("Module '{name}' was rejected by the loader: {reason}")]
    Rejected { name: String, reason: String },
}

/// One failed module inside an aggregated phase failure
#[derive(Debug, Clone)]
pub struct PhaseFailure {
    pub module: String,
    pub error: Arc<ModuleError>,
}

impl fmt::Display for PhaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.module, self.error)
    }
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("{} module(s) failed in the {phase} phase: {}", .failures.len(), summarize(.failures))]
    PhaseFailed {
        phase: LoadPhase,
        failures: Vec<PhaseFailure>,
    },

    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Loader already started (state: {state})")]
    AlreadyStarted { state: LoaderState },

    #[error("Module '{name}' has already been loaded")]
    ModuleAlreadyLoaded { name: String },

    #[error("'{name}' is not a known dependency")]
    UnknownDependency { name: String },

    #[error("Dependency '{name}' failed to load: {source}")]
    DependencyFailed {
        name: String,
        #[source]
        source: Arc<ModuleError>,
    },

    #[error("'{name}' is a library package and is never loaded as a module")]
    NotAModule { name: String },

    #[error("Loading stopped before '{name}' settled")]
    LoadAborted { name: String },

    #[error("Application failed to load: {reason}")]
    LoadFailed { reason: String },

    #[error("Module '{name}' is not of the requested type")]
    TypeMismatch { name: String },
}

impl LoaderError {
    /// Every failed module carried by this error, with its cause
    pub fn module_failures(&self) -> Vec<PhaseFailure> {
        match self {
            LoaderError::PhaseFailed { failures, .. } => failures.clone(),
            LoaderError::DependencyFailed { name, source } => vec![PhaseFailure {
                module: name.clone(),
                error: Arc::clone(source),
            }],
            _ => Vec::new(),
        }
    }
}

fn summarize(failures: &[PhaseFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("'{name}' is not a known dependency")]
    NotFound { name: String },

    #[error("Module '{name}' is known but not loaded (state: {state})")]
    NotLoaded { name: String, state: ModuleState },

    #[error("Module '{name}' is not of the requested type")]
    TypeMismatch { name: String },
}
