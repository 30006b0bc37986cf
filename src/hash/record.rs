//! Fixed-size, plain-old-data record layouts stored inside the hash table's
//! three slot stores: buckets, chain entries, and (map only) postings.

use crate::error::Error;
use crate::storage::SENTINEL;

/// A bucket: the head of a singly-linked chain of entries, or [`SENTINEL`] if
/// no chain has ever been written here. Shared by the map and the set — the
/// original's `HashBucket`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// Slot of the first entry in this bucket's chain.
    pub head: u64,
}

impl Default for Bucket {
    fn default() -> Self {
        Self { head: SENTINEL }
    }
}

/// One `{doc_slot, score}` posting in a map entry's top-K list.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Posting {
    /// Slot of the payload in the doc store.
    pub doc_slot: u64,
    /// Caller-assigned relevance score; postings are kept sorted by this,
    /// descending.
    pub score: u8,
}

/// A chain entry in a hash map: a key, a next-entry link, and a score-sorted
/// top-`TOPK` postings list. `K` is the fixed `term` buffer size
/// (`MAX_KEY_LEN`); both are compile-time constants, matching the original's
/// `HASH_MAP_CONF(entry, max_query_len, topk)` macro.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MapEntry<const K: usize, const TOPK: usize> {
    /// Slot of the next entry in this bucket's chain, or [`SENTINEL`].
    pub next: u64,
    /// Key bytes, zero-padded; see [`encode_term`] for the encoding rule.
    pub term: [u8; K],
    /// Top-`TOPK` postings, `item[0..item_num]` sorted non-increasing by score.
    pub item: [Posting; TOPK],
    /// Number of postings actually in use; always `<= TOPK`.
    pub item_num: u64,
}

impl<const K: usize, const TOPK: usize> Default for MapEntry<K, TOPK> {
    fn default() -> Self {
        Self {
            next: SENTINEL,
            term: [0u8; K],
            item: [Posting::default(); TOPK],
            item_num: 0,
        }
    }
}

/// A chain entry in a hash set: just a key and a next-entry link.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SetEntry<const K: usize> {
    /// Slot of the next entry in this bucket's chain, or [`SENTINEL`].
    pub next: u64,
    /// Key bytes, zero-padded; see [`encode_term`] for the encoding rule.
    pub term: [u8; K],
}

impl<const K: usize> Default for SetEntry<K> {
    fn default() -> Self {
        Self {
            next: SENTINEL,
            term: [0u8; K],
        }
    }
}

/// Encodes `key` into a fixed `K`-byte buffer, left-justified and
/// zero-padded. Rejects keys longer than `K` (a key longer than
/// `MAX_KEY_LEN` returns an error without mutation); a key of exactly `K` bytes
/// is accepted and occupies the whole buffer (no trailing NUL), which
/// [`term_matches`] handles by falling back to a full-width comparison.
pub fn encode_term<const K: usize>(key: &[u8]) -> Result<[u8; K], Error> {
    if key.len() > K {
        tracing::warn!(len = key.len(), max = K, "rejected oversize key");
        return Err(Error::KeyTooLong {
            len: key.len(),
            max: K,
        });
    }
    let mut term = [0u8; K];
    term[..key.len()].copy_from_slice(key);
    Ok(term)
}

/// Byte-equality of a stored term's NUL-terminated prefix against `key`.
/// If no NUL byte is present (the key exactly filled the buffer), the whole
/// buffer is the comparand.
#[must_use]
pub fn term_matches<const K: usize>(term: &[u8; K], key: &[u8]) -> bool {
    let len = term.iter().position(|&b| b == 0).unwrap_or(K);
    &term[..len] == key
}
