use std::fmt;
use std::str::FromStr;

use semver::{Version, VersionReq};
use thiserror::Error;

/// Error type for version parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Invalid version '{input}': {message}")]
    InvalidVersion { input: String, message: String },

    #[error("Invalid version constraint '{input}': {message}")]
    InvalidConstraint { input: String, message: String },
}

/// Parse a module or API version string such as `"1.2.3"`.
pub fn parse_version(input: &str) -> Result<Version, VersionError> {
    Version::parse(input.trim()).map_err(|e| VersionError::InvalidVersion {
        input: input.to_string(),
        message: e.to_string(),
    })
}

/// Represents a version requirement range using semver constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    /// The original constraint string (e.g., "^1.2.3", ">=0.1, <0.3")
    constraint: String,
    req: VersionReq,
}

impl VersionRange {
    /// Creates a new version range from a constraint string.
    pub fn from_constraint(constraint: &str) -> Result<Self, VersionError> {
        let req = VersionReq::parse(constraint).map_err(|e| VersionError::InvalidConstraint {
            input: constraint.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { constraint: constraint.to_string(), req })
    }

    /// Range accepting every version
    pub fn any() -> Self {
        Self { constraint: "*".to_string(), req: VersionReq::STAR }
    }

    /// Checks if a specific `semver::Version` satisfies this range.
    pub fn includes(&self, version: &Version) -> bool {
        self.req.matches(version)
    }

    pub fn semver_req(&self) -> &VersionReq {
        &self.req
    }

    pub fn constraint_string(&self) -> &str {
        &self.constraint
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.constraint)
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionRange::from_constraint(s)
    }
}
