//! Separate-chaining hash set: the same bucket/entry chain structure
//! as [`crate::hash::HashMap`], without postings or a doc store. Mirrors the
//! original's `SharedHashSet<ENTRY>`.

use std::path::Path;

use crate::config::{HashTableConfig, SlotStoreConfig};
use crate::error::{HashStatus, Result};
use crate::hash::fun::bucket_index;
use crate::hash::record::{encode_term, term_matches, Bucket, SetEntry};
use crate::storage::{SlotStore, SENTINEL};

/// A persistent, memory-mapped set of string keys.
///
/// `K` is `MAX_KEY_LEN`, a compile-time constant matching the original's
/// code-generation macro.
pub struct HashSet<const K: usize> {
    bucket: SlotStore<Bucket>,
    entry: SlotStore<SetEntry<K>>,
    bucket_count: u64,
}

impl<const K: usize> HashSet<K> {
    /// Opens (or creates) the set rooted at directory `dir`, laying out the
    /// four files: `bucket.{data,bit}`, `value.{data,bit}` (the set omits
    /// `doc.{data,bit}`, which only the map needs).
    pub fn open(dir: impl AsRef<Path>, config: HashTableConfig) -> Result<Self> {
        let dir = dir.as_ref();
        let bucket = SlotStore::open(
            dir.join("bucket.data"),
            dir.join("bucket.bit"),
            SlotStoreConfig::fixed(config.bucket_count, config.mode),
        )?;
        let entry = SlotStore::open(
            dir.join("value.data"),
            dir.join("value.bit"),
            SlotStoreConfig {
                initial_capacity: config.bucket_count * 3,
                load_ratio: config.load_ratio,
                extend_size: config.extend_size,
                mode: config.mode,
            },
        )?;
        let bucket_count = bucket.capacity();
        tracing::debug!(bucket_count, "opened hash set");
        Ok(Self {
            bucket,
            entry,
            bucket_count,
        })
    }

    /// Fixed bucket array size (unchanged across reopen).
    pub fn bucket_count(&self) -> u64 {
        self.bucket_count
    }

    /// Number of distinct keys stored.
    pub fn len(&self) -> u64 {
        self.entry.len()
    }

    /// Whether the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_entry(&self, key: &[u8]) -> Result<Option<(SetEntry<K>, u64)>> {
        let idx = bucket_index(key, self.bucket_count);
        let Some(bucket) = self.bucket.find_ptr(idx)?.copied() else {
            return Ok(None);
        };
        let mut cur = bucket.head;
        while cur != SENTINEL {
            let Some(entry) = self.entry.find_ptr(cur)?.copied() else {
                return Ok(None);
            };
            if term_matches(&entry.term, key) {
                return Ok(Some((entry, cur)));
            }
            cur = entry.next;
        }
        Ok(None)
    }

    /// Inserts `key`. A no-op (returning `Ok`) if the key is already present:
    /// the original distinguishes neither case in its return code.
    pub fn insert(&mut self, key: &str) -> Result<HashStatus> {
        let key_bytes = key.as_bytes();
        let term = encode_term::<K>(key_bytes)?;
        let idx = bucket_index(key_bytes, self.bucket_count);

        if self.find_entry(key_bytes)?.is_some() {
            return Ok(HashStatus::Ok);
        }

        let new_entry = SetEntry::<K> {
            term,
            ..SetEntry::default()
        };
        let new_slot = self.entry.insert(&new_entry, None)?;

        match self.bucket.find_ptr(idx)?.copied() {
            None => {
                self.bucket
                    .insert_or_update(idx, &Bucket { head: new_slot })?;
            }
            Some(bucket) => {
                let mut tail_pos = bucket.head;
                let mut tail = self.entry.find(tail_pos)?;
                while tail.next != SENTINEL {
                    tail_pos = tail.next;
                    tail = self.entry.find(tail_pos)?;
                }
                tail.next = new_slot;
                self.entry.update(tail_pos, &tail)?;
            }
        }
        Ok(HashStatus::Ok)
    }

    /// Whether `key` is present.
    pub fn has(&self, key: &str) -> Result<bool> {
        Ok(self.find_entry(key.as_bytes())?.is_some())
    }

    /// Removes `key`.
    pub fn remove(&mut self, key: &str) -> Result<HashStatus> {
        let key_bytes = key.as_bytes();
        let idx = bucket_index(key_bytes, self.bucket_count);
        let Some(bucket) = self.bucket.find_ptr(idx)?.copied() else {
            return Ok(HashStatus::BucketAbsent);
        };

        let mut pre: Option<(SetEntry<K>, u64)> = None;
        let mut cur_pos = bucket.head;
        while cur_pos != SENTINEL {
            let Some(cur) = self.entry.find_ptr(cur_pos)?.copied() else {
                break;
            };
            if term_matches(&cur.term, key_bytes) {
                let after = cur.next;
                match pre {
                    None => {
                        self.entry.delete(cur_pos)?;
                        if after == SENTINEL {
                            self.bucket.delete(idx)?;
                        } else {
                            self.bucket.update(idx, &Bucket { head: after })?;
                        }
                    }
                    Some((mut pre_entry, pre_pos)) => {
                        pre_entry.next = after;
                        self.entry.update(pre_pos, &pre_entry)?;
                        self.entry.delete(cur_pos)?;
                    }
                }
                return Ok(HashStatus::Ok);
            }
            pre = Some((cur, cur_pos));
            cur_pos = cur.next;
        }
        Ok(HashStatus::Repeat)
    }

    /// Flushes every underlying store.
    pub fn flush(&mut self) -> Result<()> {
        self.bucket.flush()?;
        self.entry.flush()
    }

    /// Walks a bucket's chain, returning the keys in chain order. Used by
    /// tests to assert chain shape and (defensively) to bound traversal —
    /// the original's `printStatus` cycle check: a chain longer than
    /// `entry_count` slots indicates a cycle.
    #[cfg(test)]
    fn chain_terms(&self, bucket_idx: u64) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let Some(bucket) = self.bucket.find_ptr(bucket_idx)?.copied() else {
            return Ok(out);
        };
        let mut cur = bucket.head;
        let mut steps = 0u64;
        let max_steps = self.entry.capacity() + 1;
        while cur != SENTINEL {
            steps += 1;
            assert!(steps <= max_steps, "cycle detected in chain");
            let entry = self.entry.find(cur)?;
            let len = entry.term.iter().position(|&b| b == 0).unwrap_or(K);
            out.push(String::from_utf8_lossy(&entry.term[..len]).into_owned());
            cur = entry.next;
        }
        Ok(out)
    }
}
