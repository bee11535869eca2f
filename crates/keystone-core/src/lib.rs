//! # Keystone Core
//!
//! Module loading for asynchronous applications: modules are discovered from
//! manifests, constructed through registered factories and brought up in two
//! phases (core APIs first, everything else second), with readiness cells,
//! a typed event channel and hook pipelines for coordination between them.
pub mod event;
pub mod hook;
pub mod kernel;
pub mod lang;
pub mod module_system;
pub mod readiness;
pub mod storage;

// Re-export key public types/traits for easier use by the binary and modules
pub use event::{Event, EventChannel, LifecycleEvent, SubscriptionGuard};
pub use hook::{HookMode, HookObserver, HookPipeline, observer_fn, observer_sync};
pub use kernel::error::{BoxError, Error as KernelError, Result as KernelResult};
pub use kernel::{AppContext, Application, ApplicationBuilder};
pub use module_system::{
    DependencyLoader, DirectoryDiscovery, FactoryRegistry, LoaderConfig, Module, ModuleDescriptor, ModuleHandle,
    StaticDiscovery,
};
pub use readiness::{ReadinessCell, ReadinessError};
pub use storage::ConfigData;

// Shared fixtures and cross-subsystem tests
#[cfg(test)]
mod tests;
