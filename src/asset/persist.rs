//! Asset directory persistence.
//!
//! Generated files are written under the asset directory using their relative
//! filenames. Each file is written to a temporary sibling and renamed into
//! place, so a single file is either fully present or absent. The file set as
//! a whole is not transactional: an interrupted run may leave some files of
//! an asset behind, and hazardous assets must treat any of them as evidence
//! that an attempt was made.

use crate::asset::{AssetFile, FileFetcher};
use crate::error::{AssetError, Result};
use std::fs::{self, DirBuilder, Permissions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Mode for persisted files (owner rw, group r)
pub const FILE_MODE: u32 = 0o640;

/// Mode for directories created under the asset directory
pub const DIR_MODE: u32 = 0o750;

/// Resolve `filename` under `dir`, rejecting anything that could escape it.
pub fn asset_path(dir: &Path, filename: &str) -> Result<PathBuf> {
    let relative = Path::new(filename);
    let valid = !filename.is_empty()
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if !valid {
        return Err(AssetError::InvalidFilename(filename.to_string()));
    }
    Ok(dir.join(relative))
}

/// Write every file of an asset under `dir`.
///
/// Parent directories are created as needed. Stops at the first failing file;
/// files written before it stay on disk.
pub fn write_files(dir: &Path, files: &[AssetFile]) -> Result<()> {
    for file in files {
        let path = asset_path(dir, &file.filename)?;
        let parent = path.parent().unwrap_or(dir);
        DirBuilder::new()
            .recursive(true)
            .mode(DIR_MODE)
            .create(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(&file.data)?;
        tmp.as_file().sync_all()?;
        tmp.as_file()
            .set_permissions(Permissions::from_mode(FILE_MODE))?;
        tmp.persist(&path).map_err(|e| AssetError::from(e.error))?;

        debug!("Wrote {} ({} bytes)", path.display(), file.data.len());
    }
    Ok(())
}

/// [`FileFetcher`] backed by the asset directory.
#[derive(Debug, Clone)]
pub struct DiskFetcher {
    directory: PathBuf,
}

impl DiskFetcher {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl FileFetcher for DiskFetcher {
    fn fetch_by_name(&self, name: &str) -> Result<Option<AssetFile>> {
        let path = asset_path(&self.directory, name)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(AssetFile::new(name, data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
