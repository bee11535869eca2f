//! # Keystone Core Kernel Errors
//!
//! Defines the top-level error type for the Keystone core.
//!
//! Every subsystem owns a typed error enum ([`DiscoveryError`], [`LoaderError`],
//! [`LookupError`], [`HookError`], [`ReadinessError`], [`StorageSystemError`],
//! [`LangError`], [`EventSystemError`]); this module funnels them into [`Error`] so that callers
//! crossing subsystem boundaries can use a single `Result` type.
use std::result::Result as StdResult;

use thiserror::Error as ThisError;

use crate::event::EventSystemError;
use crate::hook::error::HookError;
use crate::lang::error::LangError;
use crate::module_system::error::{DiscoveryError, LoaderError, LookupError};
use crate::readiness::ReadinessError;
use crate::storage::error::StorageSystemError;

/// Boxed error used wherever a cause crosses a module or observer boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error for the Keystone core.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Descriptor discovery or validation failed before any phase started
    #[error("Module discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// The dependency loader failed (phase failure, unknown dependency, ...)
    #[error("Module loader error: {0}")]
    Loader(#[from] LoaderError),

    /// Synchronous module lookup failed
    #[error("Module lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// A readiness cell settled as failed
    #[error("Readiness error: {0}")]
    Readiness(#[from] ReadinessError),

    /// Listener panics surfaced from an event publish
    #[error("Event system error: {0}")]
    EventSystem(#[from] EventSystemError),

    /// A hook observer failed during invocation
    #[error("Hook pipeline error: {0}")]
    Hook(#[from] HookError),

    /// Config loading or (de)serialization failed
    #[error("Storage system error: {0}")]
    StorageSystem(#[from] StorageSystemError),

    /// Phrase loading failed
    #[error("Lang error: {0}")]
    Lang(#[from] LangError),

    /// Error occurring during a specific application lifecycle phase.
    #[error("Kernel lifecycle error during {phase}: {message}")]
    KernelLifecycleError {
        phase: KernelLifecyclePhase,
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },
}

/// Represents a specific phase in the application's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum KernelLifecyclePhase {
    #[error("RunPreCheck")]
    RunPreCheck,
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;
