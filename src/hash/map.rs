//! Separate-chaining hash map with a bounded, score-sorted top-K postings
//! list per key. Mirrors the original's `SharedHashMap<ENTRY, V>`:
//! three slot stores (buckets, chain entries, payload docs) instead of one.

use std::path::Path;

use crate::config::{HashTableConfig, SlotStoreConfig, StorageMode};
use crate::error::{Error, HashStatus, Result};
use crate::hash::fun::bucket_index;
use crate::hash::record::{encode_term, term_matches, Bucket, MapEntry, Posting};
use crate::storage::{SlotStore, SENTINEL};

/// A persistent, memory-mapped hash map from string keys to a bounded,
/// score-ranked list of payload records.
///
/// `K` is `MAX_KEY_LEN`, `TOPK` the maximum postings retained per key, and `V`
/// the caller-supplied fixed-size payload type — both compile-time constants,
/// matching the original's code-generation macro.
pub struct HashMap<const K: usize, const TOPK: usize, V> {
    bucket: SlotStore<Bucket>,
    entry: SlotStore<MapEntry<K, TOPK>>,
    doc: SlotStore<V>,
    bucket_count: u64,
}

impl<const K: usize, const TOPK: usize, V: Copy> HashMap<K, TOPK, V> {
    /// Opens (or creates) the map rooted at directory `dir`, laying out the
    /// six files: `bucket.{data,bit}`, `value.{data,bit}`,
    /// `doc.{data,bit}`.
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
        let doc = SlotStore::open(
            dir.join("doc.data"),
            dir.join("doc.bit"),
            SlotStoreConfig {
                initial_capacity: config.bucket_count,
                load_ratio: config.load_ratio,
                extend_size: config.extend_size,
                mode: config.mode,
            },
        )?;
        // Invariant: "bucket_count is fixed after construction"; on
        // reopen the bucket store's own on-disk capacity is authoritative,
        // not whatever the caller passed this time.
        let bucket_count = bucket.capacity();
        tracing::debug!(bucket_count, "opened hash map");
        Ok(Self {
            bucket,
            entry,
            doc,
            bucket_count,
        })
    }

    /// Fixed bucket array size (unchanged across reopen).
    pub fn bucket_count(&self) -> u64 {
        self.bucket_count
    }

    /// Number of chain entries currently stored (distinct keys).
    pub fn key_count(&self) -> u64 {
        self.entry.len()
    }

    /// Inserts a caller-supplied payload into the doc store and returns its
    /// slot, for use as the `doc_slot` argument to [`Self::map`]. The
    /// original's `insertObj`.
    pub fn insert_doc(&mut self, payload: &V) -> Result<u64> {
        self.doc.insert(payload, None)
    }

    fn find_entry(&self, key: &[u8]) -> Result<Option<(MapEntry<K, TOPK>, u64)>> {
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

    /// Associates `key` with `{doc_slot, score}`, keeping the key's postings
    /// sorted non-increasing by score and bounded to `TOPK` entries.
    /// Returns [`HashStatus::Repeat`] without mutating anything if
    /// `doc_slot` is already posted under `key`.
    pub fn map(&mut self, key: &str, doc_slot: u64, score: u8) -> Result<HashStatus> {
        let key_bytes = key.as_bytes();
        let term = encode_term::<K>(key_bytes)?;
        let idx = bucket_index(key_bytes, self.bucket_count);

        match self.find_entry(key_bytes)? {
            None => {
                let mut new_entry = MapEntry::<K, TOPK> {
                    term,
                    item_num: 1,
                    ..MapEntry::default()
                };
                new_entry.item[0] = Posting { doc_slot, score };
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
            Some((mut entry, entry_pos)) => {
                let item_num = entry.item_num as usize;
                if entry.item[..item_num].iter().any(|p| p.doc_slot == doc_slot) {
                    return Ok(HashStatus::Repeat);
                }
                insert_posting(&mut entry, doc_slot, score);
                self.entry.update(entry_pos, &entry)?;
                Ok(HashStatus::Ok)
            }
        }
    }

    /// Resolves `key`'s postings to their payloads, in the entry's stored
    /// order (descending by score). Entries whose doc slot can no longer be
    /// resolved are silently skipped.
    pub fn get(&self, key: &str) -> Result<Vec<(V, u8)>> {
        let Some((entry, _)) = self.find_entry(key.as_bytes())? else {
            return Ok(Vec::new());
        };
        let item_num = entry.item_num as usize;
        let mut out = Vec::with_capacity(item_num);
        for posting in &entry.item[..item_num] {
            if let Some(doc) = self.doc.find_ptr(posting.doc_slot)? {
                out.push((*doc, posting.score));
            }
        }
        Ok(out)
    }

    /// Removes `key` and its chain entry. The associated doc slots
    /// are left untouched — callers own the doc store's lifecycle.
    pub fn remove(&mut self, key: &str) -> Result<HashStatus> {
        let key_bytes = key.as_bytes();
        let idx = bucket_index(key_bytes, self.bucket_count);
        let Some(bucket) = self.bucket.find_ptr(idx)?.copied() else {
            return Ok(HashStatus::BucketAbsent);
        };

        let mut pre: Option<(MapEntry<K, TOPK>, u64)> = None;
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
        self.entry.flush()?;
        self.doc.flush()
    }
}

/// Inserts `{doc_slot, score}` into `entry`'s postings keeping
/// `item[0..item_num]` sorted non-increasing by score, dropping the lowest
/// scoring posting if the list is already at `TOPK` (the "insertion rule").
/// Assumes `doc_slot` is not already present (callers check that
/// first) and `item_num >= 1` (the key-absent path is handled separately, so
/// this is only reached once a first posting already exists).
fn insert_posting<const K: usize, const TOPK: usize>(
    entry: &mut MapEntry<K, TOPK>,
    doc_slot: u64,
    score: u8,
) {
    let item_num = entry.item_num as usize;
    let mut changed = false;
    let mut i = item_num as isize - 1;
    while i >= 0 {
        let idx = i as usize;
        let dominated =
            entry.item[idx].score < score || (score == 0 && entry.item[idx].score == score);
        if dominated {
            changed = true;
            if idx < TOPK - 1 {
                entry.item[idx + 1] = entry.item[idx];
            }
            if idx == 0 {
                entry.item[0] = Posting { doc_slot, score };
                break;
            }
            i -= 1;
        } else {
            if idx != TOPK - 1 {
                entry.item[idx + 1] = Posting { doc_slot, score };
                if idx == item_num - 1 {
                    changed = true;
                }
            }
            break;
        }
    }
    if changed && item_num < TOPK {
        entry.item_num += 1;
    }
}
