//! Slot-indexed storage layer (L1): a presence bitmap paired with a payload
//! container, giving insert / find / update / delete at the granularity of a
//! slot index. Mirrors `CDataStorage<T>` from the original substrate: two
//! [`MappedFile`]s collaborate, one holding `item_size`-byte records, the
//! other a bitmap of which slots are occupied.

use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{trace, warn};

use crate::config::{SlotStoreConfig, StorageMode};
use crate::error::{Error, Result};
use crate::storage::mapped_file::MappedFile;

/// The "no such slot" sentinel used for chain links and for "append at
/// `next_write_pos`". Slot indices are otherwise plain `u64`s;
/// the Rust API spells "append" as `None` rather than asking callers to pass
/// this value directly (see `SlotStore::insert`).
pub const SENTINEL: u64 = u64::MAX;

fn bit_len_bytes(bit_count: u64) -> u64 {
    bit_count.div_ceil(8)
}

/// A presence bitmap plus a fixed-size-record payload file, addressed by slot
/// index. Generic over the caller-supplied POD record type, as in the
/// original's `CDataStorage<T>` template, made generic instead of code-generated.
pub struct SlotStore<T> {
    data: MappedFile,
    bit: MappedFile,
    load_ratio: f64,
    mode: StorageMode,
    capacity: u64,
    storage_item_count: AtomicU64,
    next_write_pos: u64,
    delete_pos: Option<u64>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Copy> SlotStore<T> {
    fn item_size() -> u64 {
        std::mem::size_of::<T>() as u64
    }

    /// Opens (or creates, in read-write mode) the `data` and `bit` files at the
    /// given paths and loads bookkeeping state from the data file's header.
    /// Combines the original's two-phase construct-then-`Init()` into a single
    /// fallible constructor, since the Rust type has no uninitialized state to
    /// expose between the two.
    pub fn open(
        data_path: impl AsRef<Path>,
        bit_path: impl AsRef<Path>,
        config: SlotStoreConfig,
    ) -> Result<Self> {
        let data = MappedFile::sample_map(
            data_path,
            Self::item_size(),
            config.initial_capacity as u64,
            config.extend_size,
            config.mode,
        )?;
        let bit_capacity_bytes = bit_len_bytes(config.initial_capacity as u64).max(1);
        let bit = MappedFile::sample_map(
            bit_path,
            1,
            bit_capacity_bytes,
            config.extend_size,
            config.mode,
        )?;

        // On open, capacity/item_size/next_write_pos/count are reloaded from
        // the data file's header, overriding whatever the caller passed in.
        let header = data.header();
        let capacity = header.real_capacity;
        let next_write_pos = header.next_write_pos;
        let storage_item_count = header.item_count;

        Ok(Self {
            data,
            bit,
            load_ratio: config.load_ratio,
            mode: config.mode,
            capacity,
            storage_item_count: AtomicU64::new(storage_item_count),
            next_write_pos,
            delete_pos: None,
            _record: PhantomData,
        })
    }

    /// Slots actually addressable right now.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Number of occupied slots. Backed by an atomic counter so readers of
    /// statistics observe a consistent scalar even if this were shared.
    pub fn len(&self) -> u64 {
        self.storage_item_count.load(Ordering::Acquire)
    }

    /// Whether no slots are occupied.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slot index the next sequential (`pos = None`) insert will land on.
    pub fn next_write_pos(&self) -> u64 {
        self.next_write_pos
    }

    fn check_pos(&self, pos: u64) -> Result<()> {
        // `pos < capacity` is the valid range; a `pos == capacity` request is
        // out of range rather than silently accepted past the addressable data
        // region.
        if pos >= self.capacity {
            return Err(Error::IllegalPos {
                pos,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    fn require_writable(&self) -> Result<()> {
        if self.mode == StorageMode::ReadOnly {
            warn!("mutator called on a read-only slot store");
            return Err(Error::NoWrite);
        }
        Ok(())
    }

    fn bit_offset(pos: u64) -> (u64, u8) {
        (pos / 8, (pos % 8) as u8)
    }

    fn bit_get(&self, pos: u64) -> Result<bool> {
        let (byte_idx, bit) = Self::bit_offset(pos);
        let mut buf = [0u8; 1];
        self.bit.read(crate::storage::header::Header::SIZE as u64 + byte_idx, &mut buf)?;
        Ok((buf[0] >> bit) & 1 == 1)
    }

    fn bit_set(&mut self, pos: u64) -> Result<()> {
        let (byte_idx, bit) = Self::bit_offset(pos);
        let offset = crate::storage::header::Header::SIZE as u64 + byte_idx;
        let mut buf = [0u8; 1];
        self.bit.read(offset, &mut buf)?;
        buf[0] |= 1 << bit;
        self.bit.write_positional(offset, &buf, false)
    }

    /// Clears the occupancy bit. The original toggles it with XOR, which would
    /// silently *set* an already-clear bit; every call site here checks
    /// occupancy first, so a direct AND-NOT is equivalent and safe.
    fn bit_clear(&mut self, pos: u64) -> Result<()> {
        let (byte_idx, bit) = Self::bit_offset(pos);
        let offset = crate::storage::header::Header::SIZE as u64 + byte_idx;
        let mut buf = [0u8; 1];
        self.bit.read(offset, &mut buf)?;
        buf[0] &= !(1 << bit);
        self.bit.write_positional(offset, &buf, false)
    }

    fn record_bytes(record: &T) -> &[u8] {
        // SAFETY: `T: Copy` guarantees no destructor/interior pointer
        // invariants are violated by viewing it as its own byte pattern.
        unsafe {
            std::slice::from_raw_parts((record as *const T).cast::<u8>(), Self::item_size() as usize)
        }
    }

    fn read_record(&self, pos: u64) -> Result<T> {
        let mut slot = MaybeUninit::<T>::uninit();
        let offset = crate::storage::header::Header::SIZE as u64 + pos * Self::item_size();
        // SAFETY: `slot` has room for exactly `item_size()` bytes and is not
        // read until fully written by `self.data.read` below.
        let buf = unsafe {
            std::slice::from_raw_parts_mut(slot.as_mut_ptr().cast::<u8>(), Self::item_size() as usize)
        };
        self.data.read(offset, buf)?;
        // SAFETY: every byte of `slot` was just written by the read above.
        Ok(unsafe { slot.assume_init() })
    }

    fn write_record_at(&mut self, pos: u64, record: &T, sync: bool) -> Result<()> {
        let offset = crate::storage::header::Header::SIZE as u64 + pos * Self::item_size();
        self.data.write_positional(offset, Self::record_bytes(record), sync)
    }

    /// Free-slot search: prefer the most recently freed slot, else scan
    /// forward from `startpos` for a clear bit, else scan backward from
    /// `startpos` to zero. The original's backward scan uses an unsigned
    /// cursor compared `>= 0`, which never terminates; this walks an
    /// inclusive range down to zero explicitly instead.
    fn find_idle_pos(&self, startpos: u64) -> Result<u64> {
        if let Some(hint) = self.delete_pos {
            return Ok(hint);
        }
        let mut i = startpos + 1;
        while i < self.capacity {
            if !self.bit_get(i)? {
                return Ok(i);
            }
            i += 1;
        }
        warn!(startpos, "forward scan for a free slot found none, falling back to backward scan");
        let mut i = startpos;
        loop {
            if !self.bit_get(i)? {
                return Ok(i);
            }
            if i == 0 {
                break;
            }
            i -= 1;
        }
        // Auto-extension (triggered from `insert` once the load ratio is hit)
        // guarantees a free slot exists; reaching here means capacity is full
        // with extension disabled or exhausted.
        Err(Error::IllegalPos {
            pos: startpos,
            capacity: self.capacity,
        })
    }

    fn record_header_bookkeeping(&mut self) -> Result<()> {
        let count = self.len();
        let next_write_pos = self.next_write_pos;
        self.data.with_header_mut(|h| {
            h.item_count = count;
            h.next_write_pos = next_write_pos;
        })?;
        Ok(())
    }

    /// Inserts `record` at `pos`, or at `next_write_pos` when `pos` is `None`
    /// (the Rust spelling of the original's `SIZE_MAX` "append" sentinel).
    /// Returns the slot actually written. Autogrows per `load_ratio` after a
    /// successful insert.
    pub fn insert(&mut self, record: &T, pos: Option<u64>) -> Result<u64> {
        self.require_writable()?;
        let written_pos = match pos {
            None => {
                let pos = self.next_write_pos;
                self.check_pos(pos)?;
                self.write_record_at(pos, record, false)?;
                self.bit_set(pos)?;
                self.storage_item_count.fetch_add(1, Ordering::AcqRel);
                if self.delete_pos == Some(pos) {
                    self.delete_pos = None;
                }
                self.next_write_pos = self.find_idle_pos(pos)?;
                self.record_header_bookkeeping()?;
                pos
            }
            Some(pos) => {
                self.check_pos(pos)?;
                if self.bit_get(pos)? {
                    return Err(Error::SlotExists(pos));
                }
                self.write_record_at(pos, record, false)?;
                self.bit_set(pos)?;
                self.storage_item_count.fetch_add(1, Ordering::AcqRel);
                if pos == self.next_write_pos {
                    if self.delete_pos == Some(pos) {
                        self.delete_pos = None;
                    }
                    self.next_write_pos = self.find_idle_pos(pos)?;
                    self.record_header_bookkeeping()?;
                }
                pos
            }
        };

        trace!(pos = written_pos, "inserted record");

        if self.load_ratio < 1.0
            && self.len() as f64 / self.capacity as f64 >= self.load_ratio
        {
            self.extend()?;
        }
        Ok(written_pos)
    }

    /// Copies `size_of::<T>()` bytes out of slot `pos` into an owned `T`.
    /// `Err(NoResult)` if the slot is unoccupied.
    pub fn find(&self, pos: u64) -> Result<T> {
        self.check_pos(pos)?;
        if !self.bit_get(pos)? {
            return Err(Error::NoResult(pos));
        }
        self.read_record(pos)
    }

    /// Zero-copy lookup: a borrow into the mapping, valid only until the next
    /// call that may extend (and thus remap) this store. The borrow checker
    /// enforces that directly, since extension requires `&mut self` — the
    /// safe analogue of the original's "re-fetch the base pointer after any
    /// mutation" discipline.
    pub fn find_ptr(&self, pos: u64) -> Result<Option<&T>> {
        self.check_pos(pos)?;
        if !self.bit_get(pos)? {
            return Ok(None);
        }
        let offset = crate::storage::header::Header::SIZE as u64 + pos * Self::item_size();
        let bytes = self.data.slice(offset, Self::item_size() as usize)?;
        // SAFETY: `bytes` is `item_size()` bytes from the mapping, 8-byte
        // aligned (the data region starts right after the header, itself a
        // multiple of 8 bytes, and every slot is `item_size()`-aligned), and
        // `T: Copy` has no interior pointers this cast could invalidate.
        Ok(Some(unsafe { &*(bytes.as_ptr().cast::<T>()) }))
    }

    /// In-place overwrite. `Err(NoResult)` if the slot is unoccupied.
    pub fn update(&mut self, pos: u64, record: &T) -> Result<()> {
        self.require_writable()?;
        self.check_pos(pos)?;
        if !self.bit_get(pos)? {
            return Err(Error::NoResult(pos));
        }
        self.write_record_at(pos, record, false)
    }

    /// Updates `pos` if occupied, else inserts `record` there.
    pub fn insert_or_update(&mut self, pos: u64, record: &T) -> Result<()> {
        self.require_writable()?;
        self.check_pos(pos)?;
        if self.bit_get(pos)? {
            self.write_record_at(pos, record, false)
        } else {
            self.insert(record, Some(pos)).map(|_| ())
        }
    }

    /// Clears the occupancy bit for `pos` and records it as the reuse hint for
    /// the next sequential insert. The payload bytes are left untouched.
    pub fn delete(&mut self, pos: u64) -> Result<()> {
        self.require_writable()?;
        self.check_pos(pos)?;
        if !self.bit_get(pos)? {
            return Err(Error::NoResult(pos));
        }
        self.bit_clear(pos)?;
        self.storage_item_count.fetch_sub(1, Ordering::AcqRel);
        self.delete_pos = Some(pos);
        trace!(pos, "deleted record");
        self.record_header_bookkeeping()
    }

    /// Extends the data file by its configured `extend_size`, then extends the
    /// bit file too if its existing byte capacity can no longer address every
    /// bit of the new data capacity; otherwise just flushes the bit file.
    pub fn extend(&mut self) -> Result<()> {
        self.require_writable()?;
        self.data.extend_and_remap(None)?;
        let new_capacity = self.data.real_capacity();
        self.capacity = new_capacity;

        let bit_capacity_bytes = self.bit.real_capacity();
        if new_capacity > bit_capacity_bytes * 8 {
            let needed = bit_len_bytes(new_capacity).saturating_sub(bit_capacity_bytes);
            self.bit.extend_and_remap(Some(needed))?;
        } else {
            self.bit.flush()?;
        }
        trace!(new_capacity, "slot store extended");
        Ok(())
    }

    /// Flushes both underlying files, persisting header bookkeeping first.
    pub fn flush(&mut self) -> Result<()> {
        if self.mode == StorageMode::ReadOnly {
            return Ok(());
        }
        self.record_header_bookkeeping()?;
        self.bit.flush()?;
        self.data.flush()
    }
}

impl<T> Drop for SlotStore<T> {
    fn drop(&mut self) {
        // Best-effort: header bookkeeping was already kept current by every
        // mutator, so a drop only needs to flush pages to disk.
        if self.mode == StorageMode::ReadWrite {
            if let Err(err) = self.bit.flush() {
                tracing::warn!(%err, "failed to flush bit file on drop");
            }
            if let Err(err) = self.data.flush() {
                tracing::warn!(%err, "failed to flush data file on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SlotStoreConfig;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Rec {
        a: u64,
        b: u64,
    }

    fn store(dir: &Path, capacity: usize) -> SlotStore<Rec> {
        SlotStore::open(
            dir.join("data.dat"),
            dir.join("data.bit"),
            SlotStoreConfig {
                initial_capacity: capacity,
                ..SlotStoreConfig::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn bit_matches_find_after_insert_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path(), 16);
        let pos = s.insert(&Rec { a: 1, b: 2 }, None).unwrap();
        assert!(s.find(pos).is_ok());
        s.delete(pos).unwrap();
        assert!(matches!(s.find(pos), Err(Error::NoResult(_))));
    }

    #[test]
    fn positional_insert_into_occupied_slot_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path(), 16);
        s.insert(&Rec { a: 1, b: 1 }, Some(3)).unwrap();
        assert!(matches!(
            s.insert(&Rec { a: 2, b: 2 }, Some(3)),
            Err(Error::SlotExists(3))
        ));
    }

    #[test]
    fn slot_reuse_after_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path(), 16);
        let a = s.insert(&Rec { a: 1, b: 0 }, None).unwrap();
        let b = s.insert(&Rec { a: 2, b: 0 }, None).unwrap();
        let _c = s.insert(&Rec { a: 3, b: 0 }, None).unwrap();
        assert_eq!((a, b), (0, 1));
        s.delete(b).unwrap();
        let d = s.insert(&Rec { a: 4, b: 0 }, None).unwrap();
        assert_eq!(d, b);
    }

    #[test]
    fn find_idle_pos_falls_back_to_backward_scan_when_forward_scan_is_exhausted() {
        // Sized so the page-boundary rounding in `MappedFile::create_and_map`
        // lands close to the requested capacity regardless of the host's page
        // size, keeping the occupy-everything-but-one-slot loop below cheap.
        #[repr(C)]
        #[derive(Clone, Copy)]
        struct BigRec([u8; 505]);

        let dir = tempfile::tempdir().unwrap();
        let mut s: SlotStore<BigRec> = SlotStore::open(
            dir.path().join("data.dat"),
            dir.path().join("data.bit"),
            SlotStoreConfig {
                initial_capacity: 8,
                ..SlotStoreConfig::default()
            },
        )
        .unwrap();

        let capacity = s.capacity();
        // Occupy every slot except index 1. A forward scan from any startpos
        // above it finds nothing free and must fall back to the backward scan,
        // which has to walk all the way down to find the one gap.
        for i in 0..capacity {
            if i != 1 {
                s.insert(&BigRec([0u8; 505]), Some(i)).unwrap();
            }
        }

        assert_eq!(s.find_idle_pos(capacity - 2).unwrap(), 1);
    }

    #[test]
    fn auto_extends_past_load_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = SlotStore::<Rec>::open(
            dir.path().join("data.dat"),
            dir.path().join("data.bit"),
            SlotStoreConfig {
                initial_capacity: 10,
                load_ratio: 0.8,
                extend_size: 4096,
                mode: StorageMode::ReadWrite,
            },
        )
        .unwrap();
        let initial_capacity = s.capacity();
        let mut positions = Vec::new();
        for i in 0..9 {
            positions.push(s.insert(&Rec { a: i, b: 0 }, None).unwrap());
        }
        assert!(s.capacity() > initial_capacity);
        for (i, pos) in positions.iter().enumerate() {
            let rec = s.find(*pos).unwrap();
            assert_eq!(rec.a, i as u64);
        }
    }

    #[test]
    fn read_only_store_rejects_mutation() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut s = store(dir.path(), 8);
            s.insert(&Rec { a: 1, b: 1 }, None).unwrap();
            s.flush().unwrap();
        }
        let mut s = SlotStore::<Rec>::open(
            dir.path().join("data.dat"),
            dir.path().join("data.bit"),
            SlotStoreConfig {
                mode: StorageMode::ReadOnly,
                ..SlotStoreConfig::default()
            },
        )
        .unwrap();
        assert!(matches!(
            s.insert(&Rec { a: 2, b: 2 }, None),
            Err(Error::NoWrite)
        ));
    }

    #[test]
    fn round_trip_through_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let pos;
        {
            let mut s = store(dir.path(), 8);
            pos = s.insert(&Rec { a: 11, b: 22 }, None).unwrap();
            s.flush().unwrap();
        }
        let s = SlotStore::<Rec>::open(
            dir.path().join("data.dat"),
            dir.path().join("data.bit"),
            SlotStoreConfig::default(),
        )
        .unwrap();
        assert_eq!(s.find(pos).unwrap(), Rec { a: 11, b: 22 });
    }
}
