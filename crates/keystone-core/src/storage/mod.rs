//! # Keystone Core Storage
//!
//! Configuration data shared by the application and its modules. The
//! config file is keyed by module name; see [`ConfigData::section`].
pub mod config;
pub mod error;

/// Re-export key types
pub use config::{ConfigData, ConfigFormat};
pub use error::StorageSystemError;
