use std::sync::Arc;

use crate::event::Event;
use crate::module_system::error::ModuleError;
use crate::module_system::loader::LoaderState;
use crate::module_system::ModuleHandle;

/// Name of [`LifecycleEvent::ModuleReady`]
pub const MODULE_READY: &str = "module.ready";
/// Name of [`LifecycleEvent::ModuleFailed`]
pub const MODULE_FAILED: &str = "module.failed";
/// Name of [`LifecycleEvent::LoaderStateChanged`]
pub const LOADER_STATE: &str = "loader.state";

/// Events published on the application-wide lifecycle channel
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// A module reached ready and was added to the loaded set
    ModuleReady { name: String, instance: ModuleHandle },
    /// A module failed to construct, initialize or become ready
    ModuleFailed { name: String, error: Arc<ModuleError> },
    /// The dependency loader moved between states
    LoaderStateChanged { from: LoaderState, to: LoaderState },
}

impl LifecycleEvent {
    /// Module name carried by module events
    pub fn module_name(&self) -> Option<&str> {
        match self {
            LifecycleEvent::ModuleReady { name, .. } | LifecycleEvent::ModuleFailed { name, .. } => Some(name),
            LifecycleEvent::LoaderStateChanged { .. } => None,
        }
    }
}

impl Event for LifecycleEvent {
    fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::ModuleReady { .. } => MODULE_READY,
            LifecycleEvent::ModuleFailed { .. } => MODULE_FAILED,
            LifecycleEvent::LoaderStateChanged { .. } => LOADER_STATE,
        }
    }
}
