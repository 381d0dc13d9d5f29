//! Terraform variables asset.
//!
//! Flattens the install config into the variables file consumed by the
//! provisioning templates in `data/`. Variable names match the `variable`
//! blocks declared in `data/config.tf` and the per-platform `main.tf`.

use crate::asset::{Asset, AssetFile, FileFetcher, Parents};
use crate::error::Result;
use crate::installconfig::{InstallConfig, InstallConfigAsset};
use crate::types::Platform;
use serde::{Deserialize, Serialize};

/// Filename of the serialized variables, relative to the asset directory
pub const TFVARS_FILENAME: &str = "terraform.tfvars.json";

/// Variables handed to Terraform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TfVars {
    pub cluster_name: String,
    pub base_domain: String,
    pub cluster_id: String,
    pub master_count: u32,
    pub worker_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_master_instance_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openstack_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openstack_base_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openstack_cloud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openstack_external_network: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub libvirt_uri: Option<String>,
}

impl TfVars {
    /// Build the variables for `config`.
    ///
    /// # Errors
    ///
    /// Propagates platform classification errors (`NoKnownPlatform`, `Config`).
    pub fn from_install_config(config: &InstallConfig) -> Result<Self> {
        let mut vars = Self {
            cluster_name: config.cluster_name.clone(),
            base_domain: config.base_domain.clone(),
            cluster_id: config.cluster_id.clone(),
            master_count: config.masters,
            worker_count: config.workers,
            ssh_key: Some(config.ssh_key.clone()).filter(|key| !key.is_empty()),
            aws_region: None,
            aws_master_instance_type: None,
            openstack_region: None,
            openstack_base_image: None,
            openstack_cloud: None,
            openstack_external_network: None,
            libvirt_uri: None,
        };

        match config.platform.classify()? {
            Platform::Aws(aws) => {
                vars.aws_region = Some(aws.region);
                vars.aws_master_instance_type = aws.master_instance_type;
            }
            Platform::OpenStack(openstack) => {
                vars.openstack_region = Some(openstack.region);
                vars.openstack_base_image = Some(openstack.base_image);
                vars.openstack_cloud = Some(openstack.cloud);
                vars.openstack_external_network = Some(openstack.external_network);
            }
            Platform::Libvirt(libvirt) => {
                vars.libvirt_uri = Some(libvirt.uri);
            }
        }

        Ok(vars)
    }
}

/// Asset producing `terraform.tfvars.json`.
#[derive(Debug, Default)]
pub struct TerraformVariables {
    files: Vec<AssetFile>,
}

impl TerraformVariables {
    /// The variables file, once generated or loaded
    pub fn file(&self) -> Option<&AssetFile> {
        self.files.first()
    }
}

impl Asset for TerraformVariables {
    fn name(&self) -> &'static str {
        "Terraform Variables"
    }

    fn dependencies(&self) -> Vec<Box<dyn Asset>> {
        vec![Box::new(InstallConfigAsset::default())]
    }

    fn generate(&mut self, parents: &Parents<'_>) -> Result<()> {
        let install_config = parents.get::<InstallConfigAsset>()?.config()?;
        let vars = TfVars::from_install_config(install_config)?;
        let data = serde_json::to_vec_pretty(&vars)?;
        self.files = vec![AssetFile::new(TFVARS_FILENAME, data)];
        Ok(())
    }

    fn files(&self) -> &[AssetFile] {
        &self.files
    }

    fn load(&mut self, fetcher: &dyn FileFetcher) -> Result<bool> {
        match fetcher.fetch_by_name(TFVARS_FILENAME)? {
            Some(file) => {
                // Reject a corrupt file instead of handing it to Terraform
                serde_json::from_slice::<TfVars>(&file.data)?;
                self.files = vec![file];
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssetError;
    use crate::types::{AwsPlatform, OpenStackPlatform};

    #[test]
    fn test_aws_vars() {
        let mut config = InstallConfig::new("demo", "example.com");
        config.platform.aws = Some(AwsPlatform {
            region: "us-test-1".to_string(),
            master_instance_type: Some("m5.xlarge".to_string()),
        });
        let vars = TfVars::from_install_config(&config).expect("vars");
        assert_eq!(vars.aws_region.as_deref(), Some("us-test-1"));
        assert_eq!(vars.aws_master_instance_type.as_deref(), Some("m5.xlarge"));
        assert!(vars.libvirt_uri.is_none());
        assert!(vars.ssh_key.is_none());

        let value = serde_json::to_value(&vars).expect("serialize");
        assert_eq!(value["cluster_name"], "demo");
        assert!(value.get("openstack_region").is_none());
    }

    #[test]
    fn test_openstack_vars() {
        let mut config = InstallConfig::new("demo", "example.com");
        config.ssh_key = "ssh-ed25519 AAAA".to_string();
        config.platform.openstack = Some(OpenStackPlatform {
            region: "regionOne".to_string(),
            base_image: "rhcos".to_string(),
            cloud: "openstack".to_string(),
            external_network: "public".to_string(),
        });
        let vars = TfVars::from_install_config(&config).expect("vars");
        assert_eq!(vars.openstack_region.as_deref(), Some("regionOne"));
        assert_eq!(vars.openstack_external_network.as_deref(), Some("public"));
        assert_eq!(vars.ssh_key.as_deref(), Some("ssh-ed25519 AAAA"));
    }

    #[test]
    fn test_no_platform() {
        let config = InstallConfig::new("demo", "example.com");
        let err = TfVars::from_install_config(&config).unwrap_err();
        assert!(matches!(err, AssetError::NoKnownPlatform));
    }

    #[test]
    fn test_generate_requires_install_config_parent() {
        let mut asset = TerraformVariables::default();
        let err = asset.generate(&Parents::empty("Terraform Variables")).unwrap_err();
        assert!(matches!(err, AssetError::MissingParent { .. }));
        assert!(asset.file().is_none());
    }
}
