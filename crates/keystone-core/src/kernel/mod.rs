//! # Keystone Core Kernel
//!
//! The `kernel` module ties the subsystems together into a runnable
//! application.
//!
//! ## Key Responsibilities & Components:
//!
//! - **Application Bootstrapping**: [`Application`](bootstrap::Application)
//!   (built with [`ApplicationBuilder`](bootstrap::ApplicationBuilder)) runs
//!   discovery and the phased module load exactly once and renders failures.
//! - **Module Context**: [`AppContext`](context::AppContext) is what every
//!   factory and module receives: the loader, lifecycle events, config and
//!   translation.
//! - **Core Constants**: system-wide names and versions in `constants`.
//! - **Error Handling**: the top-level [`Error`](error::Error) and its
//!   `Result` alias in `error`.
pub mod bootstrap;
pub mod constants;
pub mod context;
pub mod error;

pub use bootstrap::{Application, ApplicationBuilder};
pub use context::AppContext;
pub use error::{BoxError, Error, Result};

// Test module declaration
#[cfg(test)]
mod tests;
