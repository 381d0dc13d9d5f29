//! Embedded Terraform package.
//!
//! The per-platform templates under `data/` are compiled into the binary and
//! written into the provisioning working directory on demand.

use crate::asset::AssetFile;
use crate::asset::persist;
use crate::error::Result;
use crate::types::PlatformKind;
use std::path::Path;
use tracing::debug;

/// Shared variable declarations, unpacked next to every platform package
pub const CONFIG_TF: &str = include_str!("../data/config.tf");

const AWS_MAIN_TF: &str = include_str!("../data/aws/main.tf");
const OPENSTACK_MAIN_TF: &str = include_str!("../data/openstack/main.tf");
const LIBVIRT_MAIN_TF: &str = include_str!("../data/libvirt/main.tf");

/// `(filename, contents)` pairs making up the package for `platform`
pub fn platform_files(platform: PlatformKind) -> Vec<(&'static str, &'static str)> {
    let main = match platform {
        PlatformKind::Aws => AWS_MAIN_TF,
        PlatformKind::OpenStack => OPENSTACK_MAIN_TF,
        PlatformKind::Libvirt => LIBVIRT_MAIN_TF,
    };
    vec![("main.tf", main)]
}

/// Write the package for `platform` into `dir`.
pub fn unpack(dir: &Path, platform: PlatformKind) -> Result<()> {
    let files: Vec<AssetFile> = platform_files(platform)
        .into_iter()
        .map(|(name, contents)| AssetFile::new(name, contents))
        .collect();
    persist::write_files(dir, &files)?;
    debug!("Unpacked {} templates into {}", platform, dir.display());
    Ok(())
}

/// Write `config.tf` into `dir`.
pub fn unpack_config(dir: &Path) -> Result<()> {
    persist::write_files(dir, &[AssetFile::new("config.tf", CONFIG_TF)])
}
