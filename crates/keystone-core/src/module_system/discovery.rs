use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::kernel::constants::MANIFEST_FILE_NAME;
use crate::module_system::descriptor::ModuleDescriptor;
use crate::module_system::error::DiscoveryError;

/// Produces the descriptors of every installed module.
#[async_trait]
pub trait ModuleDiscovery: Send + Sync {
    async fn discover(&self) -> Result<Vec<ModuleDescriptor>, DiscoveryError>;
}

/// Discovery over a fixed, in-memory list
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    descriptors: Vec<ModuleDescriptor>,
}

impl StaticDiscovery {
    pub fn new(descriptors: Vec<ModuleDescriptor>) -> Self {
        Self { descriptors }
    }
}

#[async_trait]
impl ModuleDiscovery for StaticDiscovery {
    async fn discover(&self) -> Result<Vec<ModuleDescriptor>, DiscoveryError> {
        Ok(self.descriptors.clone())
    }
}

/// Scans `<root>/*/keystone.json`.
///
/// Only direct children of the root are considered. Entries without a
/// manifest are skipped; an unreadable or malformed manifest fails discovery.
#[derive(Debug, Clone)]
pub struct DirectoryDiscovery {
    root: PathBuf,
    manifest_name: String,
}

impl DirectoryDiscovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest_name: MANIFEST_FILE_NAME.to_string(),
        }
    }

    /// Look for `manifest_name` instead of `keystone.json`
    pub fn with_manifest_name(mut self, manifest_name: &str) -> Self {
        self.manifest_name = manifest_name.to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn load_manifest(&self, manifest_path: &Path, module_dir: &Path) -> Result<ModuleDescriptor, DiscoveryError> {
        let content = fs::read_to_string(manifest_path)
            .await
            .map_err(|e| DiscoveryError::io(e, "read_manifest", manifest_path.to_path_buf()))?;
        ModuleDescriptor::from_manifest_str(&content, manifest_path, module_dir)
    }
}

#[async_trait]
impl ModuleDiscovery for DirectoryDiscovery {
    async fn discover(&self) -> Result<Vec<ModuleDescriptor>, DiscoveryError> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| DiscoveryError::io(e, "read_dir", self.root.clone()))?;

        let mut descriptors = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DiscoveryError::io(e, "next_entry", self.root.clone()))?
        {
            let module_dir = entry.path();
            let is_dir = match entry.file_type().await {
                Ok(file_type) => file_type.is_dir(),
                Err(e) => {
                    log::warn!("Skipping {}: {}", module_dir.display(), e);
                    continue;
                }
            };
            if !is_dir {
                continue;
            }

            let manifest_path = module_dir.join(&self.manifest_name);
            match fs::metadata(&manifest_path).await {
                Ok(meta) if meta.is_file() => {}
                _ => {
                    log::debug!("No {} in {}, skipping", self.manifest_name, module_dir.display());
                    continue;
                }
            }

            let descriptor = self.load_manifest(&manifest_path, &module_dir).await?;
            log::debug!("Discovered module '{}' in {}", descriptor.name, module_dir.display());
            descriptors.push(descriptor);
        }

        // Directory iteration order is platform-dependent.
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(descriptors)
    }
}
