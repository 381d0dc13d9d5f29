//! clustergen library
//!
//! Resolves the graph of assets needed to launch a cluster (install config,
//! Terraform variables, admin kubeconfig) and provisions the cluster with
//! Terraform.

pub mod asset;
pub mod cli;
pub mod cluster;
pub mod data;
pub mod error;
pub mod installconfig;
pub mod kubeconfig;
pub mod process_guard;
pub mod terraform;
pub mod tfvars;
pub mod tool_runner;
pub mod tool_traits;
pub mod types;

// Re-export main types for convenience
pub use asset::state::{AssetState, AssetTransitionError};
pub use asset::store::Store;
pub use asset::{Asset, AssetFile, FileFetcher, Parents};
pub use cluster::{Cluster, METADATA_FILENAME};
pub use error::{AssetError, FirstError, Phase, Result};
pub use installconfig::{INSTALL_CONFIG_FILENAME, InstallConfig, InstallConfigAsset};
pub use kubeconfig::{AdminKubeconfig, KUBECONFIG_FILENAME};
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use terraform::{Provisioner, STATE_FILE_NAME, Terraform};
pub use tfvars::{TFVARS_FILENAME, TerraformVariables};
pub use tool_runner::{ToolOutput, run_tool_safe};
pub use tool_traits::ToolArgs;
pub use types::{ClusterMetadata, Platform, PlatformConfig, PlatformKind};
