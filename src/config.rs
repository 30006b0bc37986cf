//! Configuration surface for mapped files, slot stores, and hash tables.
//!
//! Options are plain structs with `Default` impls matching the documented
//! defaults; callers that want file/env driven configuration can still load
//! them through [`figment`], which is how the rest of the stack (and its
//! sibling crates) source settings.

use std::path::Path;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Access mode a mapped file (and everything built on top of it) was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Reads and writes are both permitted.
    ReadWrite,
    /// Every mutator returns [`crate::error::Error::NoWrite`]; used for read replicas or
    /// opening a store that another process owns for writing.
    ReadOnly,
}

impl Default for StorageMode {
    fn default() -> Self {
        Self::ReadWrite
    }
}

/// Bytes added to a mapped file on each extension. Defaults to 10 MiB, matching the
/// original substrate's `EXTEND_SIZE`.
pub const DEFAULT_EXTEND_SIZE: u64 = 10 * 1024 * 1024;

/// Load ratio at which a slot store triggers an extension. `>= 1.0` disables growth.
pub const DEFAULT_LOAD_RATIO: f64 = 0.8;

/// Default bucket array size for a freshly created hash table.
pub const DEFAULT_BUCKET_COUNT: usize = 10_000_000;

/// Tuning knobs for an individual [`crate::storage::SlotStore`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotStoreConfig {
    /// Number of slots to allocate on first creation. Ignored on reopen: the
    /// on-disk header is authoritative.
    pub initial_capacity: usize,
    /// `count / capacity` threshold that triggers [`crate::storage::SlotStore::extend`].
    /// `>= 1.0` disables auto-extension entirely (used for the bucket store, whose
    /// array size must stay fixed after construction).
    pub load_ratio: f64,
    /// Bytes added to the backing data file per extension.
    pub extend_size: u64,
    /// Access mode.
    pub mode: StorageMode,
}

impl Default for SlotStoreConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 1024,
            load_ratio: DEFAULT_LOAD_RATIO,
            extend_size: DEFAULT_EXTEND_SIZE,
            mode: StorageMode::default(),
        }
    }
}

impl SlotStoreConfig {
    /// A config whose load ratio disables auto-extension, used for the bucket store
    /// whose size is fixed once the hash table is created.
    #[must_use]
    pub fn fixed(initial_capacity: usize, mode: StorageMode) -> Self {
        Self {
            initial_capacity,
            load_ratio: 2.0,
            extend_size: DEFAULT_EXTEND_SIZE,
            mode,
        }
    }
}

/// Constructor-visible configuration for a [`crate::hash::HashMap`] or
/// [`crate::hash::HashSet`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HashTableConfig {
    /// Access mode; disables all mutators when `ReadOnly`.
    pub mode: StorageMode,
    /// Fixed bucket array size. Ignored on reopen — the value stored in the bucket
    /// file's header at creation time wins.
    pub bucket_count: usize,
    /// Load ratio applied to the entry and doc slot stores (not the bucket store,
    /// which never grows).
    pub load_ratio: f64,
    /// Bytes added per extension to the entry and doc slot stores.
    pub extend_size: u64,
}

impl Default for HashTableConfig {
    fn default() -> Self {
        Self {
            mode: StorageMode::default(),
            bucket_count: DEFAULT_BUCKET_COUNT,
            load_ratio: DEFAULT_LOAD_RATIO,
            extend_size: DEFAULT_EXTEND_SIZE,
        }
    }
}

/// Failure loading a [`HashTableConfig`] or [`SlotStoreConfig`] from an external source.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `figment` failed to merge or deserialize the configuration sources.
    #[error("failed to load configuration: {0}")]
    Figment(#[from] figment::Error),
}

/// Loads a [`HashTableConfig`], overlaying a TOML file (if present) with
/// `SHMAP_`-prefixed environment variables, falling back to [`HashTableConfig::default`]
/// for anything neither source sets.
pub fn load_hash_table_config(toml_path: impl AsRef<Path>) -> Result<HashTableConfig, ConfigError> {
    let config = Figment::from(figment::providers::Serialized::defaults(
        HashTableConfig::default(),
    ))
    .merge(Toml::file(toml_path.as_ref()))
    .merge(Env::prefixed("SHMAP_"))
    .extract()?;
    Ok(config)
}
