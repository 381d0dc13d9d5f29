//! Install configuration: the user-facing input for a cluster.
//!
//! `InstallConfig` is the JSON document describing the cluster (name, base
//! domain, platform section). `InstallConfigAsset` is the root of the asset
//! graph: it hydrates from `install-config.json` left by a previous run, or
//! generates that file from a config supplied by the caller.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::asset::{Asset, AssetFile, FileFetcher, Parents};
use crate::error::AssetError;
use crate::types::{Platform, PlatformConfig};

/// Filename of the persisted install config
pub const INSTALL_CONFIG_FILENAME: &str = "install-config.json";

fn new_cluster_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Installation configuration that can be saved/loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallConfig {
    /// Cluster name; becomes the first label of every cluster hostname
    pub cluster_name: String,
    /// DNS zone the cluster lives under
    pub base_domain: String,
    /// Unique ID used to tag infrastructure (generated when absent)
    #[serde(default = "new_cluster_id")]
    pub cluster_id: String,
    /// SSH public key installed on every node
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ssh_key: String,
    /// Number of master machines
    #[serde(default = "default_masters")]
    pub masters: u32,
    /// Number of worker machines
    #[serde(default = "default_workers")]
    pub workers: u32,
    pub platform: PlatformConfig,
}

fn default_masters() -> u32 {
    3
}

fn default_workers() -> u32 {
    3
}

impl InstallConfig {
    /// Create a configuration with a fresh cluster ID and no platform
    pub fn new(cluster_name: impl Into<String>, base_domain: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            base_domain: base_domain.into(),
            cluster_id: new_cluster_id(),
            ssh_key: String::new(),
            masters: default_masters(),
            workers: default_workers(),
            platform: PlatformConfig::default(),
        }
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize install config to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write install config to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read install config from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse install config JSON")?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Cluster name is a DNS label: 1-63 chars, lowercase alphanumeric and '-'
        let name = self.cluster_name.trim();
        if name.is_empty() {
            anyhow::bail!("Cluster name must be specified");
        }
        if name.len() > 63 {
            anyhow::bail!("Cluster name must be at most 63 characters long");
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            anyhow::bail!("Cluster name can only contain lowercase letters, digits, and '-'");
        }
        if name.starts_with('-') || name.ends_with('-') {
            anyhow::bail!("Cluster name must start and end with a letter or digit");
        }

        let domain = self.base_domain.trim();
        if domain.is_empty() {
            anyhow::bail!("Base domain must be specified");
        }
        if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
            anyhow::bail!("Base domain {:?} is not a valid DNS name", domain);
        }

        if self.cluster_id.trim().is_empty() {
            anyhow::bail!("Cluster ID must not be empty");
        }

        if self.masters == 0 {
            anyhow::bail!("At least one master is required");
        }

        match self.platform.classify()? {
            Platform::Aws(aws) if aws.region.trim().is_empty() => {
                anyhow::bail!("AWS region must be specified")
            }
            Platform::OpenStack(openstack) if openstack.region.trim().is_empty() => {
                anyhow::bail!("OpenStack region must be specified")
            }
            Platform::Libvirt(libvirt) if libvirt.uri.trim().is_empty() => {
                anyhow::bail!("Libvirt URI must be specified")
            }
            _ => {}
        }

        Ok(())
    }
}

/// Asset wrapping the install config.
///
/// Declarative: a config found on disk is hydrated and reused. Otherwise the
/// config handed to [`InstallConfigAsset::from_config`] is validated and
/// written out.
#[derive(Debug, Default)]
pub struct InstallConfigAsset {
    config: Option<InstallConfig>,
    files: Vec<AssetFile>,
}

impl InstallConfigAsset {
    /// Asset that generates `install-config.json` from `config`
    pub fn from_config(config: InstallConfig) -> Self {
        Self {
            config: Some(config),
            files: Vec::new(),
        }
    }

    /// The resolved configuration
    pub fn config(&self) -> Result<&InstallConfig, AssetError> {
        self.config
            .as_ref()
            .ok_or_else(|| AssetError::config("install config has not been resolved"))
    }
}

impl Asset for InstallConfigAsset {
    fn name(&self) -> &'static str {
        "Install Config"
    }

    fn dependencies(&self) -> Vec<Box<dyn Asset>> {
        Vec::new()
    }

    fn generate(&mut self, _parents: &Parents<'_>) -> Result<(), AssetError> {
        let config = self.config.as_ref().ok_or_else(|| {
            AssetError::config(format!(
                "no install config provided and no {} in the asset directory",
                INSTALL_CONFIG_FILENAME
            ))
        })?;
        // Keep the typed platform error; validate() would flatten it
        config.platform.classify()?;
        config
            .validate()
            .map_err(|e| AssetError::config(format!("{:#}", e)))?;

        let data = serde_json::to_vec_pretty(config)?;
        self.files = vec![AssetFile::new(INSTALL_CONFIG_FILENAME, data)];
        Ok(())
    }

    fn files(&self) -> &[AssetFile] {
        &self.files
    }

    fn load(&mut self, fetcher: &dyn FileFetcher) -> Result<bool, AssetError> {
        let Some(file) = fetcher.fetch_by_name(INSTALL_CONFIG_FILENAME)? else {
            return Ok(false);
        };
        let config: InstallConfig = serde_json::from_slice(&file.data)?;
        config
            .validate()
            .map_err(|e| AssetError::config(format!("{}: {:#}", INSTALL_CONFIG_FILENAME, e)))?;
        if self.config.as_ref().is_some_and(|provided| *provided != config) {
            info!(
                "Using {} from the asset directory instead of the provided config",
                INSTALL_CONFIG_FILENAME
            );
        }
        self.config = Some(config);
        self.files = vec![file];
        Ok(true)
    }
}
