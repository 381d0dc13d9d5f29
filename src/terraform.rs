//! Terraform driver.
//!
//! [`Provisioner`] is the seam between the cluster asset and the tool that
//! creates infrastructure; [`Terraform`] implements it by running the
//! `terraform` executable through the process-guarded tool runner.

use crate::error::Result;
use crate::tool_runner::run_tool_safe;
use crate::tool_traits::ToolArgs;
use std::path::{Path, PathBuf};

/// State file Terraform leaves in its working directory
pub const STATE_FILE_NAME: &str = "terraform.tfstate";

/// Default executable, looked up on `PATH`
pub const DEFAULT_BINARY: &str = "terraform";

/// Creates infrastructure from a prepared working directory.
///
/// Both steps succeed only on exit status 0. After `apply`, durable output is
/// `dir/terraform.tfstate`, which may exist even when `apply` failed.
pub trait Provisioner {
    fn init(&self, dir: &Path) -> Result<()>;

    fn apply(&self, dir: &Path) -> Result<()>;
}

/// `terraform init -input=false`
#[derive(Debug, Clone)]
pub struct TerraformInit<'a> {
    pub binary: &'a Path,
    pub dir: &'a Path,
}

/// `terraform apply -auto-approve -input=false`
#[derive(Debug, Clone)]
pub struct TerraformApply<'a> {
    pub binary: &'a Path,
    pub dir: &'a Path,
}

fn automation_env() -> Vec<(String, String)> {
    vec![("TF_IN_AUTOMATION".to_string(), "1".to_string())]
}

impl ToolArgs for TerraformInit<'_> {
    fn program(&self) -> &Path {
        self.binary
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["init".to_string(), "-input=false".to_string()]
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        automation_env()
    }

    fn working_dir(&self) -> &Path {
        self.dir
    }
}

impl ToolArgs for TerraformApply<'_> {
    fn program(&self) -> &Path {
        self.binary
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "apply".to_string(),
            "-auto-approve".to_string(),
            "-input=false".to_string(),
        ]
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        automation_env()
    }

    fn working_dir(&self) -> &Path {
        self.dir
    }
}

/// The real `terraform` executable.
#[derive(Debug, Clone)]
pub struct Terraform {
    binary: PathBuf,
}

impl Terraform {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl Default for Terraform {
    fn default() -> Self {
        Self::new(DEFAULT_BINARY)
    }
}

impl Provisioner for Terraform {
    fn init(&self, dir: &Path) -> Result<()> {
        run_tool_safe(&TerraformInit {
            binary: &self.binary,
            dir,
        })?
        .ensure_success()?;
        Ok(())
    }

    fn apply(&self, dir: &Path) -> Result<()> {
        run_tool_safe(&TerraformApply {
            binary: &self.binary,
            dir,
        })?
        .ensure_success()?;
        Ok(())
    }
}
