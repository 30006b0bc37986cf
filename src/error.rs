//! Error types for `shmap-core`.

use thiserror::Error;

/// Errors produced by the slot-store layer (L1) and the mapped-file layer (L0).
///
/// Mirrors the `STO_RESULT` status codes of the original storage substrate,
/// one variant per failure kind instead of a raw status integer.
#[derive(Error, Debug)]
pub enum Error {
    /// An I/O or mapping failure originating from the underlying file or `mmap` call.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A positional insert targeted a slot that is already occupied.
    #[error("slot {0} is already occupied")]
    SlotExists(u64),

    /// A slot index fell outside `[0, capacity)`.
    #[error("slot index {pos} is out of range (capacity {capacity})")]
    IllegalPos {
        /// The offending slot index.
        pos: u64,
        /// The capacity at the time of the check.
        capacity: u64,
    },

    /// A lookup, update, or delete targeted a slot whose occupancy bit is clear.
    #[error("slot {0} holds no record")]
    NoResult(u64),

    /// A mutator was called on a store opened in read-only mode.
    #[error("store is read-only")]
    NoWrite,

    /// A key exceeded the compile-time `MAX_KEY_LEN` bound of the hash table.
    #[error("key of {len} bytes exceeds the {max} byte key limit")]
    KeyTooLong {
        /// Length of the rejected key.
        len: usize,
        /// Configured maximum key length.
        max: usize,
    },

    /// The on-disk header failed a basic sanity check (size, version, capacity bookkeeping).
    #[error("corrupt or incompatible header in {path}: {reason}")]
    InvalidHeader {
        /// Path to the offending file.
        path: std::path::PathBuf,
        /// Human-readable description of what failed.
        reason: String,
    },
}

/// Result type alias used throughout `shmap-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Status codes returned by hash-layer operations: a tri-state return rather
/// than an `Error` because "key absent" / "repeat" are expected outcomes, not
/// failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashStatus {
    /// The operation completed and mutated the store.
    Ok,
    /// Delete: key was not found. Map: insertion was a no-op (duplicate posting).
    Repeat,
    /// The bucket addressed by the key's hash was absent (delete only).
    BucketAbsent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_carry_context() {
        let err = Error::IllegalPos {
            pos: 42,
            capacity: 10,
        };
        assert_eq!(
            err.to_string(),
            "slot index 42 is out of range (capacity 10)"
        );
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
