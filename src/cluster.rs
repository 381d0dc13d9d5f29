//! Cluster asset: launches the infrastructure with Terraform.
//!
//! Generating this asset creates real, billable resources. Its `load` refuses
//! to continue when a previous run left `terraform.tfstate` behind, and its
//! `generate` always stages `metadata.json` so a failed launch can still be
//! found and destroyed.

use crate::asset::persist;
use crate::asset::{Asset, AssetFile, FileFetcher, Parents};
use crate::data;
use crate::error::{AssetError, FirstError, Result};
use crate::installconfig::{InstallConfig, InstallConfigAsset};
use crate::kubeconfig::AdminKubeconfig;
use crate::terraform::{Provisioner, STATE_FILE_NAME, Terraform};
use crate::tfvars::TerraformVariables;
use crate::types::{ClusterMetadata, ClusterPlatformMetadata};
use std::fs;
use std::path::Path;
use tracing::info;

/// Filename of the cluster metadata record
pub const METADATA_FILENAME: &str = "metadata.json";

/// Prefix of the scratch directory Terraform runs in
const WORKDIR_PREFIX: &str = "clustergen-";

/// Launches the cluster and captures the resulting Terraform state.
pub struct Cluster {
    provisioner: Box<dyn Provisioner>,
    files: Vec<AssetFile>,
}

impl Cluster {
    /// Cluster asset driven by `provisioner` instead of the `terraform`
    /// binary on `PATH`.
    pub fn with_provisioner(provisioner: impl Provisioner + 'static) -> Self {
        Self {
            provisioner: Box::new(provisioner),
            files: Vec::new(),
        }
    }

    /// Run Terraform in a scratch directory, staging the state file into
    /// `staged` and filling in the platform part of `metadata`.
    fn launch(
        &self,
        install_config: &InstallConfig,
        tfvars: &TerraformVariables,
        metadata: &mut ClusterMetadata,
        staged: &mut Vec<AssetFile>,
    ) -> Result<()> {
        let workdir = tempfile::Builder::new()
            .prefix(WORKDIR_PREFIX)
            .tempdir()?;
        let dir = workdir.path();

        let vars = tfvars
            .file()
            .ok_or_else(|| AssetError::config("terraform variables have not been generated"))?;
        persist::write_files(dir, std::slice::from_ref(vars))?;

        let platform = install_config.platform.classify()?;
        metadata.platform =
            ClusterPlatformMetadata::for_platform(&platform, &install_config.cluster_id);

        data::unpack(dir, platform.kind())?;
        data::unpack_config(dir)?;

        info!("Using Terraform to create cluster...");
        self.provisioner
            .init(dir)
            .map_err(|e| AssetError::tool("failed to initialize terraform", e))?;

        let applied = self
            .provisioner
            .apply(dir)
            .map_err(|e| AssetError::tool("failed to run terraform", e));
        let mut outcome = FirstError::from_result(applied);

        // A failed apply can still leave state describing what was created
        match read_state(dir) {
            Ok(state) => staged.push(state),
            Err(e) => outcome.record(e),
        }

        outcome.into_result()
    }
}

fn read_state(dir: &Path) -> Result<AssetFile> {
    let data = fs::read(dir.join(STATE_FILE_NAME))
        .map_err(|e| AssetError::tool("failed to read terraform state", e.into()))?;
    Ok(AssetFile::new(STATE_FILE_NAME, data))
}

impl Default for Cluster {
    fn default() -> Self {
        Self::with_provisioner(Terraform::default())
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let files: Vec<&str> = self.files.iter().map(|file| file.filename.as_str()).collect();
        f.debug_struct("Cluster").field("files", &files).finish()
    }
}

impl Asset for Cluster {
    fn name(&self) -> &'static str {
        "Cluster"
    }

    fn dependencies(&self) -> Vec<Box<dyn Asset>> {
        vec![
            Box::new(InstallConfigAsset::default()),
            Box::new(TerraformVariables::default()),
            Box::new(AdminKubeconfig::default()),
        ]
    }

    fn generate(&mut self, parents: &Parents<'_>) -> Result<()> {
        let install_config = parents.get::<InstallConfigAsset>()?.config()?;
        let tfvars = parents.get::<TerraformVariables>()?;
        // Consumed by the bootstrap health check, which lives outside this crate
        parents.get::<AdminKubeconfig>()?;

        let mut metadata = ClusterMetadata {
            cluster_name: install_config.cluster_name.clone(),
            ..ClusterMetadata::default()
        };
        let mut staged = Vec::new();
        let launched = self.launch(install_config, tfvars, &mut metadata, &mut staged);

        // Metadata is staged on every path past this point
        let mut outcome = FirstError::from_result(launched);
        match serde_json::to_vec(&metadata) {
            Ok(data) => staged.push(AssetFile::new(METADATA_FILENAME, data)),
            Err(e) => outcome.record(AssetError::tool(
                "failed to serialize cluster metadata",
                e.into(),
            )),
        }

        self.files = staged;
        outcome.into_result()
    }

    fn files(&self) -> &[AssetFile] {
        &self.files
    }

    fn load(&mut self, fetcher: &dyn FileFetcher) -> Result<bool> {
        if fetcher.fetch_by_name(STATE_FILE_NAME)?.is_some() {
            return Err(AssetError::AlreadyExists {
                filename: STATE_FILE_NAME.to_string(),
            });
        }
        Ok(false)
    }
}
