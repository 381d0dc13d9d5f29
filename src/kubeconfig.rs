//! Admin kubeconfig asset.
//!
//! Produces the administrative credential for the new cluster. The file is a
//! JSON-encoded kubeconfig (kubectl accepts JSON as well as YAML) pointing at
//! the cluster API endpoint and carrying a bearer token minted per cluster.

use crate::asset::{Asset, AssetFile, FileFetcher, Parents};
use crate::error::Result;
use crate::installconfig::{InstallConfig, InstallConfigAsset};
use serde::{Deserialize, Serialize};

/// Filename of the admin kubeconfig, relative to the asset directory
pub const KUBECONFIG_FILENAME: &str = "auth/kubeconfig";

/// Port the cluster API listens on
pub const API_PORT: u16 = 6443;

const ADMIN_USER: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub clusters: Vec<NamedCluster>,
    pub users: Vec<NamedUser>,
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    pub current_context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEntry {
    pub server: String,
    #[serde(rename = "insecure-skip-tls-verify", default)]
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: UserEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub cluster: String,
    pub user: String,
}

impl Kubeconfig {
    /// Admin kubeconfig for the cluster described by `config`.
    pub fn admin(config: &InstallConfig, token: impl Into<String>) -> Self {
        let cluster = config.cluster_name.clone();
        Self {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: vec![NamedCluster {
                name: cluster.clone(),
                cluster: ClusterEntry {
                    server: api_url(config),
                    insecure_skip_tls_verify: false,
                },
            }],
            users: vec![NamedUser {
                name: ADMIN_USER.to_string(),
                user: UserEntry {
                    token: token.into(),
                },
            }],
            contexts: vec![NamedContext {
                name: ADMIN_USER.to_string(),
                context: ContextEntry {
                    cluster,
                    user: ADMIN_USER.to_string(),
                },
            }],
            current_context: ADMIN_USER.to_string(),
        }
    }
}

/// `https://api.<cluster>.<base domain>:6443`
pub fn api_url(config: &InstallConfig) -> String {
    format!(
        "https://api.{}.{}:{}",
        config.cluster_name, config.base_domain, API_PORT
    )
}

/// Asset producing `auth/kubeconfig`.
#[derive(Debug, Default)]
pub struct AdminKubeconfig {
    files: Vec<AssetFile>,
}

impl Asset for AdminKubeconfig {
    fn name(&self) -> &'static str {
        "Kubeconfig Admin"
    }

    fn dependencies(&self) -> Vec<Box<dyn Asset>> {
        vec![Box::new(InstallConfigAsset::default())]
    }

    fn generate(&mut self, parents: &Parents<'_>) -> Result<()> {
        let install_config = parents.get::<InstallConfigAsset>()?.config()?;
        let token = uuid::Uuid::new_v4().simple().to_string();
        let kubeconfig = Kubeconfig::admin(install_config, token);
        let data = serde_json::to_vec_pretty(&kubeconfig)?;
        self.files = vec![AssetFile::new(KUBECONFIG_FILENAME, data)];
        Ok(())
    }

    fn files(&self) -> &[AssetFile] {
        &self.files
    }

    fn load(&mut self, fetcher: &dyn FileFetcher) -> Result<bool> {
        match fetcher.fetch_by_name(KUBECONFIG_FILENAME)? {
            Some(file) => {
                serde_json::from_slice::<Kubeconfig>(&file.data)?;
                self.files = vec![file];
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
