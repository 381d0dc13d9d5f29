//! Asset Store: the per-run dependency resolver.
//!
//! A `Store` is one resolution run against one asset directory. It resolves a
//! requested asset depth-first: dependencies first (in declared order), then
//! `load`, then `generate` and persistence. Every asset type is loaded or
//! generated at most once per store.
//!
//! # Resolution Rules
//!
//! | Situation                          | Outcome |
//! |------------------------------------|---------|
//! | Type already `Resolved`            | Memoized instance is returned |
//! | Type already `Failed`              | `PreviouslyFailed` wrapping the first failure, nothing re-run |
//! | Type still `Resolving`             | `DependencyCycle` |
//! | A dependency fails                 | Target `Failed`, dependency error returned unchanged |
//! | `load` returns `Ok(true)`          | `Resolved`, `generate` skipped |
//! | `load` returns `Err`               | `Failed`, `generate` skipped |
//! | `generate` fails                   | `Failed`, partial files still persisted |

use crate::asset::persist::{self, DiskFetcher};
use crate::asset::state::AssetState;
use crate::asset::{Asset, Parents, asset_key};
use crate::error::{AssetError, Phase, Result};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Memo table entry for one asset type.
struct Entry {
    name: &'static str,
    state: AssetState,
    /// Present once the asset reached a terminal state.
    asset: Option<Box<dyn Asset>>,
    /// The error that made this asset `Failed`.
    failure: Option<AssetError>,
}

/// One resolution run.
pub struct Store {
    directory: PathBuf,
    fetcher: DiskFetcher,
    entries: HashMap<TypeId, Entry>,
    /// Instances supplied up front, used instead of the declared ones.
    provided: HashMap<TypeId, Box<dyn Asset>>,
    /// Names of assets currently being resolved, outermost first.
    chain: Vec<&'static str>,
}

impl Store {
    /// Create a store persisting to `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        let directory = directory.into();
        Self {
            fetcher: DiskFetcher::new(directory.clone()),
            directory,
            entries: HashMap::new(),
            provided: HashMap::new(),
            chain: Vec::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Seed the instance used whenever an asset of this type is requested.
    ///
    /// The seeded instance still goes through `load` and `generate`. Has no
    /// effect on a type that was already visited in this run.
    pub fn provide<A: Asset>(&mut self, asset: A) {
        let key = TypeId::of::<A>();
        if self.entries.contains_key(&key) {
            debug!("Ignoring provided {}: already visited", asset.name());
            return;
        }
        self.provided.insert(key, Box::new(asset));
    }

    /// Resolve `asset` and everything it depends on.
    ///
    /// Returns the resolved instance held by the store, which may be a
    /// memoized or provided instance rather than the one passed in.
    pub fn fetch(&mut self, asset: Box<dyn Asset>) -> Result<&dyn Asset> {
        let key = self.resolve(asset)?;
        self.entries
            .get(&key)
            .and_then(|entry| entry.asset.as_deref())
            .ok_or_else(|| AssetError::config("resolved asset missing from store"))
    }

    /// Typed convenience over [`Store::fetch`] starting from `A::default()`.
    pub fn fetch_default<A: Asset + Default>(&mut self) -> Result<&A> {
        self.resolve(Box::new(A::default()))?;
        self.get::<A>()
            .ok_or_else(|| AssetError::config("resolved asset missing from store"))
    }

    /// Borrow a resolved asset of type `A`.
    pub fn get<A: Asset>(&self) -> Option<&A> {
        let entry = self.entries.get(&TypeId::of::<A>())?;
        if entry.state != AssetState::Resolved {
            return None;
        }
        let any: &(dyn Any + 'static) = entry.asset.as_deref()?;
        any.downcast_ref::<A>()
    }

    /// Resolution state of type `A` in this run.
    pub fn state<A: Asset>(&self) -> AssetState {
        self.entries
            .get(&TypeId::of::<A>())
            .map(|entry| entry.state)
            .unwrap_or_default()
    }

    fn resolve(&mut self, asset: Box<dyn Asset>) -> Result<TypeId> {
        let key = asset_key(asset.as_ref());

        if let Some(entry) = self.entries.get(&key) {
            match entry.state {
                AssetState::Resolved => return Ok(key),
                AssetState::Failed => {
                    let cause = match &entry.failure {
                        Some(failure) => failure.clone(),
                        None => AssetError::config(format!("{} failed earlier", entry.name)),
                    };
                    return Err(AssetError::PreviouslyFailed {
                        asset: entry.name,
                        cause: Box::new(cause),
                    });
                }
                AssetState::Resolving => {
                    let mut chain = self.chain.clone();
                    chain.push(entry.name);
                    error!("Dependency cycle: {}", chain.join(" -> "));
                    return Err(AssetError::DependencyCycle { chain });
                }
                AssetState::Unvisited => {}
            }
        }

        let mut asset = self.provided.remove(&key).unwrap_or(asset);
        let name = asset.name();
        self.enter(key, name)?;

        let result = self.resolve_entered(name, asset.as_mut());
        self.chain.pop();

        self.finish(key, &result, asset)?;
        result.map(|()| key)
    }

    fn enter(&mut self, key: TypeId, name: &'static str) -> Result<()> {
        let entry = self.entries.entry(key).or_insert(Entry {
            name,
            state: AssetState::Unvisited,
            asset: None,
            failure: None,
        });
        entry.state = entry.state.transition(AssetState::Resolving)?;
        self.chain.push(name);
        debug!("Resolving {}", name);
        Ok(())
    }

    fn finish(&mut self, key: TypeId, result: &Result<()>, asset: Box<dyn Asset>) -> Result<()> {
        let state = match result {
            Ok(()) => AssetState::Resolved,
            Err(_) => AssetState::Failed,
        };
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.state = entry.state.transition(state)?;
            entry.asset = Some(asset);
            entry.failure = result.as_ref().err().cloned();
            debug!("{} {}", entry.name, state);
        }
        Ok(())
    }

    /// Dependencies, load, generate and persist for an asset already marked
    /// `Resolving`.
    fn resolve_entered(&mut self, name: &'static str, asset: &mut dyn Asset) -> Result<()> {
        let mut parent_keys = Vec::new();
        for dependency in asset.dependencies() {
            // Dependency errors are already wrapped where they happened
            let dep_key = self.resolve(dependency)?;
            if !parent_keys.contains(&dep_key) {
                parent_keys.push(dep_key);
            }
        }

        let found = asset
            .load(&self.fetcher)
            .map_err(|e| e.in_phase(name, Phase::Load))?;
        if found {
            info!("Loaded {} from {}", name, self.directory.display());
            return Ok(());
        }

        let generated = {
            let parents = Parents::new(
                name,
                parent_keys
                    .iter()
                    .filter_map(|k| self.entries.get(k))
                    .filter_map(|entry| entry.asset.as_deref()),
            );
            asset.generate(&parents)
        };

        let persisted = persist::write_files(&self.directory, asset.files());
        match (generated, persisted) {
            (Ok(()), Ok(())) => {
                debug!("Generated {} ({} files)", name, asset.files().len());
                Ok(())
            }
            (Ok(()), Err(e)) => Err(e.in_phase(name, Phase::Persist)),
            (Err(e), persisted) => {
                if let Err(persist_err) = persisted {
                    error!("Failed to persist partial output of {}: {}", name, persist_err);
                }
                Err(e.in_phase(name, Phase::Generate))
            }
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let states: Vec<(&str, AssetState)> = self
            .entries
            .values()
            .map(|entry| (entry.name, entry.state))
            .collect();
        f.debug_struct("Store")
            .field("directory", &self.directory)
            .field("entries", &states)
            .finish()
    }
}
