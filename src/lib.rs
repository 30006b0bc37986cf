//! # `shmap-core`
//!
//! A persistent, memory-mapped associative store: a hash map and hash set
//! whose contents survive process restarts because every byte lives in files
//! mapped into the address space. Readers follow pointers straight into the
//! mapping; writers mutate in place and let the kernel's page cache flush
//! dirty pages back to disk.
//!
//! The crate is organized bottom-up:
//!
//! - [`storage`] — L0/L1: a self-describing mapped file ([`storage::MappedFile`])
//!   and the slot-indexed store built on top of it ([`storage::SlotStore`]).
//! - [`hash`] — L2: [`hash::HashMap`] and [`hash::HashSet`], separate-chaining
//!   hash tables composed from slot stores.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use shmap_core::config::HashTableConfig;
//! use shmap_core::hash::HashSet;
//!
//! # fn main() -> shmap_core::error::Result<()> {
//! let mut set: HashSet<64> = HashSet::open("./data/tags", HashTableConfig::default())?;
//! set.insert("rust")?;
//! assert!(set.has("rust")?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Scope
//!
//! Single-process, single-writer, best-effort durability via `flush` rather
//! than transactional guarantees. Directory bootstrap, concurrent writer
//! coordination, and cross-machine replication are explicit non-goals left
//! to callers.

#![warn(missing_docs)]
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )
)]

pub mod config;
pub mod error;
pub mod hash;
pub mod storage;

pub use config::{HashTableConfig, SlotStoreConfig, StorageMode};
pub use error::{Error, HashStatus, Result};
pub use hash::{HashMap, HashSet};
pub use storage::{MappedFile, SlotStore, SENTINEL};
