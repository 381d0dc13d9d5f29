use crate::asset::Asset;
use crate::asset::store::Store;
use crate::cluster::Cluster;
use crate::installconfig::{InstallConfig, InstallConfigAsset};
use crate::kubeconfig::AdminKubeconfig;
use crate::terraform::Terraform;
use crate::tfvars::TerraformVariables;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;

/// clustergen - generate cluster assets and launch the cluster with Terraform
#[derive(Parser)]
#[command(name = "clustergen")]
#[command(about = "Resolve cluster assets and provision infrastructure with Terraform")]
#[command(version)]
pub struct Cli {
    /// Log filter (e.g. `debug`, `clustergen=trace`); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a target asset and everything it depends on
    Create {
        /// Asset to produce
        #[arg(value_enum)]
        target: Target,

        /// Asset directory; output of earlier runs here is reused
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Install config to use when the asset directory has none
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Terraform executable
        #[arg(long)]
        terraform: Option<PathBuf>,
    },
    /// Validate an install config file
    Validate {
        /// Path to the install config
        config: PathBuf,
    },
}

/// Assets that can be requested from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Target {
    InstallConfig,
    Tfvars,
    Kubeconfig,
    Cluster,
}

impl Target {
    /// Resolve this target in `store`, returning the files it holds.
    pub fn fetch(self, store: &mut Store) -> crate::error::Result<Vec<String>> {
        let asset: &dyn Asset = match self {
            Self::InstallConfig => store.fetch_default::<InstallConfigAsset>()?,
            Self::Tfvars => store.fetch_default::<TerraformVariables>()?,
            Self::Kubeconfig => store.fetch_default::<AdminKubeconfig>()?,
            Self::Cluster => store.fetch_default::<Cluster>()?,
        };
        Ok(asset.files().iter().map(|f| f.filename.clone()).collect())
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}

/// Build a store for `dir`, seeded from the command line options.
pub fn prepare_store(
    dir: &Path,
    config: Option<&Path>,
    terraform: Option<&Path>,
) -> Result<Store> {
    let mut store = Store::new(dir);
    if let Some(path) = config {
        let install_config = InstallConfig::load_from_file(path)?;
        store.provide(InstallConfigAsset::from_config(install_config));
    }
    if let Some(binary) = terraform {
        store.provide(Cluster::with_provisioner(Terraform::new(binary)));
    }
    Ok(store)
}

/// `clustergen create`
pub fn run_create(
    target: Target,
    dir: &Path,
    config: Option<&Path>,
    terraform: Option<&Path>,
) -> Result<()> {
    let mut store = prepare_store(dir, config, terraform)?;
    let files = target.fetch(&mut store).map_err(|e| {
        let hint = if e.is_already_exists() {
            " (the cluster was already launched from this directory; destroy it or use a new directory)"
        } else {
            ""
        };
        anyhow::Error::new(e).context(format!("failed to create {}{}", target, hint))
    })?;

    for file in files {
        info!("Wrote {}", dir.join(file).display());
    }
    Ok(())
}

/// `clustergen validate`
pub fn run_validate(path: &Path) -> Result<InstallConfig> {
    let config = InstallConfig::load_from_file(path)?;
    config
        .validate()
        .with_context(|| format!("{} is not a valid install config", path.display()))?;
    Ok(config)
}
