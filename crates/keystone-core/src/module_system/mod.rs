//! # Keystone Core Module System
//!
//! Discovery, instantiation and readiness tracking of application modules.
//!
//! ## Key Components:
//!
//! - **[`traits`]**: the [`Module`] trait every module implements and the
//!   [`ModuleState`] lifecycle tag.
//! - **[`descriptor`]**: [`ModuleDescriptor`], parsed from `keystone.json`
//!   manifests or built in code with [`DescriptorBuilder`].
//! - **[`discovery`]**: the [`ModuleDiscovery`] collaborator
//!   ([`DirectoryDiscovery`], [`StaticDiscovery`]).
//! - **[`graph`]**: [`DependencyGraph`], the two-phase partition of descriptors.
//! - **[`factory`]**: [`ModuleFactory`] and the closure-based [`FactoryRegistry`].
//! - **[`registry`]**: [`ModuleRegistry`], the loaded/failed book-keeping.
//! - **[`loader`]**: [`DependencyLoader`], which drives all of the above.
//! - **[`version`]**: semver range checks against the running API version.
//! - **[`error`]**: the module system error taxonomy.
pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod factory;
pub mod graph;
pub mod loader;
pub mod registry;
pub mod traits;
pub mod version;

pub use descriptor::{DescriptorBuilder, ModuleDescriptor};
pub use discovery::{DirectoryDiscovery, ModuleDiscovery, StaticDiscovery};
pub use error::{DiscoveryError, InstantiationError, LoaderError, LookupError, ModuleError, PhaseFailure};
pub use factory::{FactoryRegistry, ModuleFactory};
pub use graph::{DependencyGraph, LoadPhase};
pub use loader::{DependencyLoader, LoaderConfig, LoaderState};
pub use registry::ModuleRegistry;
pub use traits::{Module, ModuleHandle, ModuleState};
pub use version::VersionRange;

// Test module declaration
#[cfg(test)]
mod tests;
