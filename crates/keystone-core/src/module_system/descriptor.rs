use std::path::{Path, PathBuf};

use semver::Version;
use serde::Deserialize;

use crate::module_system::error::DiscoveryError;
use crate::module_system::version::{VersionRange, parse_version};

/// Immutable description of an installed module.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDescriptor {
    /// Unique, fully-qualified name (e.g. `keystone-server`)
    pub name: String,

    pub version: Version,

    pub description: String,

    /// True exactly when the module provides a core API
    pub is_core_api: bool,

    /// Name the core API is published under (e.g. `server`)
    pub core_api_name: Option<String>,

    /// Directory the module was discovered in
    pub root_dir: PathBuf,

    /// Module config schema, relative to `root_dir`
    pub config_schema: Option<PathBuf>,

    /// Keystone API versions this module works with
    pub keystone_versions: VersionRange,

    /// `false` for library-only packages: discovered so their names
    /// resolve, but never instantiated
    pub is_module: bool,
}

impl ModuleDescriptor {
    /// Create a builder for a descriptor named `name`
    pub fn builder(name: &str, version: &str) -> DescriptorBuilder {
        DescriptorBuilder::new(name, version)
    }

    /// `name` with `prefix` removed, if it carries it
    pub fn short_name<'a>(&'a self, prefix: &str) -> &'a str {
        self.name.strip_prefix(prefix).unwrap_or(&self.name)
    }

    pub fn is_compatible_with(&self, api_version: &Version) -> bool {
        self.keystone_versions.includes(api_version)
    }

    /// Absolute path of the config schema, if one is declared
    pub fn config_schema_path(&self) -> Option<PathBuf> {
        self.config_schema.as_ref().map(|p| self.root_dir.join(p))
    }

    /// Parse a `keystone.json` manifest found in `root_dir`.
    pub fn from_manifest_str(content: &str, manifest_path: &Path, root_dir: &Path) -> Result<Self, DiscoveryError> {
        let raw: RawModuleManifest = serde_json::from_str(content).map_err(|e| DiscoveryError::InvalidManifest {
            path: manifest_path.to_path_buf(),
            message: format!("Failed to parse manifest JSON: {}", e),
            source: Some(Box::new(e)),
        })?;

        if raw.name.trim().is_empty() {
            return Err(DiscoveryError::InvalidManifest {
                path: manifest_path.to_path_buf(),
                message: "module name must not be empty".to_string(),
                source: None,
            });
        }

        let version = parse_version(&raw.version).map_err(|e| DiscoveryError::InvalidManifest {
            path: manifest_path.to_path_buf(),
            message: e.to_string(),
            source: Some(Box::new(e)),
        })?;

        let keystone_versions = match raw.keystone_versions.as_deref() {
            Some(constraint) => VersionRange::from_constraint(constraint).map_err(|e| DiscoveryError::InvalidManifest {
                path: manifest_path.to_path_buf(),
                message: e.to_string(),
                source: Some(Box::new(e)),
            })?,
            None => VersionRange::any(),
        };

        let core_api_name = raw.core_api_name.filter(|n| !n.trim().is_empty());
        Ok(Self {
            is_core_api: raw.is_core_api || core_api_name.is_some(),
            name: raw.name,
            version,
            description: raw.description,
            core_api_name,
            root_dir: root_dir.to_path_buf(),
            config_schema: raw.config_schema.map(PathBuf::from),
            keystone_versions,
            is_module: raw.module,
        })
    }
}

// --- Intermediate struct for deserialization ---

#[derive(Deserialize, Debug)]
struct RawModuleManifest {
    name: String,
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    is_core_api: bool,
    #[serde(default)]
    core_api_name: Option<String>,
    #[serde(default)]
    keystone_versions: Option<String>,
    #[serde(default)]
    config_schema: Option<String>,
    #[serde(default = "default_true")]
    module: bool,
}

fn default_true() -> bool {
    true
}

/// Builder for creating module descriptors in code
pub struct DescriptorBuilder {
    descriptor: ModuleDescriptor,
}

impl DescriptorBuilder {
    /// An unparseable version falls back to `0.0.0`
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            descriptor: ModuleDescriptor {
                name: name.to_string(),
                version: parse_version(version).unwrap_or_else(|_| Version::new(0, 0, 0)),
                description: String::new(),
                is_core_api: false,
                core_api_name: None,
                root_dir: PathBuf::new(),
                config_schema: None,
                keystone_versions: VersionRange::any(),
                is_module: true,
            },
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.descriptor.description = description.to_string();
        self
    }

    /// Mark this as a core-API module published under `api_name`
    pub fn core_api(mut self, api_name: &str) -> Self {
        self.descriptor.is_core_api = true;
        self.descriptor.core_api_name = Some(api_name.to_string());
        self
    }

    pub fn root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.descriptor.root_dir = root_dir.into();
        self
    }

    pub fn config_schema(mut self, schema: impl Into<PathBuf>) -> Self {
        self.descriptor.config_schema = Some(schema.into());
        self
    }

    pub fn keystone_versions(mut self, range: VersionRange) -> Self {
        self.descriptor.keystone_versions = range;
        self
    }

    /// Mark this as a library-only package that is never instantiated
    pub fn library(mut self) -> Self {
        self.descriptor.is_module = false;
        self
    }

    pub fn build(self) -> ModuleDescriptor {
        self.descriptor
    }
}
