//! Asset engine: the dependency graph of files needed to launch a cluster.
//!
//! An [`Asset`] declares the assets it depends on, knows how to generate its
//! own output from those dependencies, and knows how to recognise output left
//! behind by a previous run. The [`store::Store`] walks the graph, and
//! [`persist`] moves files between assets and the asset directory.
//!
//! # Modules
//!
//! - `state`: per-asset resolution state machine
//! - `store`: depth-first, memoized resolver
//! - `persist`: asset directory writer and [`FileFetcher`] implementation

pub mod persist;
pub mod state;
pub mod store;

use crate::error::{AssetError, Result};
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// A single output file owned by an asset.
///
/// `filename` is relative to the asset directory and may contain
/// subdirectories (e.g. `auth/kubeconfig`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFile {
    pub filename: String,
    pub data: Vec<u8>,
}

impl AssetFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

/// Read access to files persisted by a previous run.
///
/// Implementations never interpret file content; that is up to the asset.
pub trait FileFetcher {
    /// Returns the file if it exists, `None` if it does not.
    fn fetch_by_name(&self, name: &str) -> Result<Option<AssetFile>>;
}

/// A unit of generatable output in the dependency graph.
///
/// # Contract
///
/// - `dependencies()` is pure and returns the same list every time it is
///   called within a run.
/// - `generate()` is called at most once per run, only after every declared
///   dependency resolved. It fills the list returned by `files()` and may
///   leave a partial, diagnostic list behind when it fails.
/// - `load()` returning `Ok(true)` means the asset hydrated itself from disk
///   and must not be generated. Returning `Err` also prevents generation;
///   hazardous assets use this to refuse resuming (see
///   [`AssetError::AlreadyExists`]).
pub trait Asset: Any {
    /// Human-friendly name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Direct dependencies, in the order they should be resolved.
    fn dependencies(&self) -> Vec<Box<dyn Asset>>;

    /// Produce this asset's output from its resolved parents.
    fn generate(&mut self, parents: &Parents<'_>) -> Result<()>;

    /// Files currently held by the asset.
    fn files(&self) -> &[AssetFile];

    /// Probe persisted storage for output of a previous run.
    fn load(&mut self, fetcher: &dyn FileFetcher) -> Result<bool>;
}

/// Cache key for an asset: its concrete type.
pub(crate) fn asset_key(asset: &(dyn Asset + 'static)) -> TypeId {
    let any: &(dyn Any + 'static) = asset;
    any.type_id()
}

/// Read-only view of an asset's resolved dependencies.
pub struct Parents<'a> {
    requested_by: &'static str,
    assets: HashMap<TypeId, &'a (dyn Asset + 'static)>,
}

impl<'a> Parents<'a> {
    pub(crate) fn new(
        requested_by: &'static str,
        assets: impl IntoIterator<Item = &'a (dyn Asset + 'static)>,
    ) -> Self {
        Self {
            requested_by,
            assets: assets
                .into_iter()
                .map(|asset| (asset_key(asset), asset))
                .collect(),
        }
    }

    /// View with no parents, for assets without dependencies.
    pub fn empty(requested_by: &'static str) -> Self {
        Self {
            requested_by,
            assets: HashMap::new(),
        }
    }

    /// Borrow the resolved dependency of type `T`.
    ///
    /// # Errors
    ///
    /// `MissingParent` if `T` was not declared as a dependency.
    pub fn get<T: Asset>(&self) -> Result<&'a T> {
        self.assets
            .get(&TypeId::of::<T>())
            .and_then(|asset| {
                let any: &'a (dyn Any + 'static) = *asset;
                any.downcast_ref::<T>()
            })
            .ok_or_else(|| AssetError::MissingParent {
                asset: std::any::type_name::<T>(),
                requested_by: self.requested_by,
            })
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
