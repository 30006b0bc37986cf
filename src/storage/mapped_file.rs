//! The block-mapped file container (L0).
//!
//! Owns one file on disk, exposes it as a contiguous mapping prefixed by a
//! self-describing [`Header`], and grows the file in place while the header
//! tracks how much of it is actually addressable. Mirrors `CBaseMmap` from the
//! original substrate: `sample_map` opens the file if it exists and creates it
//! otherwise, writes land through `write_sequential` / `write_positional`, and
//! `extend_and_remap` invalidates any previously returned base pointer.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use memmap2::{Mmap, MmapMut};
use tracing::{debug, trace, warn};

use crate::config::StorageMode;
use crate::error::{Error, Result};
use crate::storage::header::Header;

/// The OS page size, read once per process and memoized.
fn page_size() -> u64 {
    static PAGE_SIZE: OnceLock<u64> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        #[cfg(unix)]
        {
            // SAFETY: sysconf(_SC_PAGESIZE) only reads a kernel-reported scalar; it
            // never touches memory we own.
            let reported = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            if reported > 0 {
                return reported as u64;
            }
        }
        4096
    })
}

enum Mapping {
    ReadWrite(MmapMut),
    ReadOnly(Mmap),
}

impl Mapping {
    fn as_ptr(&self) -> *const u8 {
        match self {
            Mapping::ReadWrite(m) => m.as_ptr(),
            Mapping::ReadOnly(m) => m.as_ptr(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Mapping::ReadWrite(m) => m.len(),
            Mapping::ReadOnly(m) => m.len(),
        }
    }

    fn as_mut_ptr(&mut self) -> Result<*mut u8> {
        match self {
            Mapping::ReadWrite(m) => Ok(m.as_mut_ptr()),
            Mapping::ReadOnly(_) => Err(Error::NoWrite),
        }
    }

    fn flush_range(&self, offset: usize, len: usize, sync: bool) -> std::io::Result<()> {
        match self {
            Mapping::ReadWrite(m) => {
                if sync {
                    m.flush_range(offset, len)
                } else {
                    m.flush_async_range(offset, len)
                }
            }
            Mapping::ReadOnly(_) => Ok(()),
        }
    }

    fn flush(&self) -> std::io::Result<()> {
        match self {
            Mapping::ReadWrite(m) => m.flush_async(),
            Mapping::ReadOnly(_) => Ok(()),
        }
    }
}

/// One file, mapped into the address space behind a [`Header`].
///
/// `mapping` is `Some` at every point a caller can observe; it is only
/// transiently `None` while `extend_and_remap` unmaps the old region before
/// mapping the extended one.
pub struct MappedFile {
    mapping: Option<Mapping>,
    file: File,
    path: PathBuf,
    mode: StorageMode,
    extend_size: u64,
    total_size: u64,
}

impl MappedFile {
    fn mapping(&self) -> &Mapping {
        self.mapping
            .as_ref()
            .expect("MappedFile::mapping observed mid-extend")
    }

    /// Opens the file if it exists, otherwise creates it with a
    /// header sized for `initial_capacity` records of `item_size` bytes each. Fails
    /// in read-only mode if the file is missing.
    pub fn sample_map(
        path: impl AsRef<Path>,
        item_size: u64,
        initial_capacity: u64,
        extend_size: u64,
        mode: StorageMode,
    ) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open_and_map(path, extend_size, mode)
        } else if mode == StorageMode::ReadOnly {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist and mode is read-only", path.display()),
            )))
        } else {
            Self::create_and_map(path, item_size, initial_capacity, extend_size)
        }
    }

    /// Creates a new file, rounds its size up to the next page boundary, and credits
    /// the rounding slack to `real_capacity`.
    pub fn create_and_map(
        path: impl AsRef<Path>,
        item_size: u64,
        initial_capacity: u64,
        extend_size: u64,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let unrounded = item_size
            .saturating_mul(initial_capacity)
            .saturating_add(Header::SIZE as u64);
        let page = page_size();
        let rounded = unrounded.next_multiple_of(page);
        let slack = rounded - unrounded;
        let real_capacity = initial_capacity + slack / item_size.max(1);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(rounded)?;
        if rounded > 0 {
            file.write_at(&[0u8], rounded - 1)?;
        }

        // SAFETY: `file` is open read-write and sized to `rounded` bytes above.
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };
        // SAFETY: the mapping is `rounded >= Header::SIZE` bytes and page (hence
        // 8-byte) aligned, so a `Header` pointer cast is valid.
        let header_ptr = mmap.as_mut_ptr().cast::<Header>();
        unsafe {
            header_ptr.write(Header::new(item_size, real_capacity));
        }

        debug!(path = %path.display(), real_capacity, item_size, "created mapped file");

        Ok(Self {
            mapping: Some(Mapping::ReadWrite(mmap)),
            file,
            path,
            mode: StorageMode::ReadWrite,
            extend_size,
            total_size: rounded,
        })
    }

    /// Opens an existing file and maps it, loading `item_size` / `real_capacity`
    /// from its header rather than trusting caller-supplied values.
    pub fn open_and_map(
        path: impl AsRef<Path>,
        extend_size: u64,
        mode: StorageMode,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(mode == StorageMode::ReadWrite)
            .open(&path)?;
        let total_size = file.metadata()?.len();

        let mapping = if mode == StorageMode::ReadWrite {
            // SAFETY: `file` is open read-write.
            Mapping::ReadWrite(unsafe { MmapMut::map_mut(&file)? })
        } else {
            // SAFETY: `file` is open at least read-only.
            Mapping::ReadOnly(unsafe { Mmap::map(&file)? })
        };

        if (mapping.len() as u64) < Header::SIZE as u64 {
            return Err(Error::InvalidHeader {
                path,
                reason: "file is smaller than a single header".to_string(),
            });
        }

        let mut opened = Self {
            mapping: Some(mapping),
            file,
            path: path.clone(),
            mode,
            extend_size,
            total_size,
        };

        if let Err(reason) = opened.header().validate(total_size) {
            return Err(Error::InvalidHeader { path, reason });
        }

        Ok(opened)
    }

    /// Pointer to the header at the start of the mapping.
    ///
    /// # Safety
    /// Valid because every constructor path above verifies the mapping is at
    /// least `Header::SIZE` bytes before returning, and pages are far more
    /// aligned than a `u64`-field struct requires.
    pub fn header(&self) -> &Header {
        unsafe { &*self.mapping().as_ptr().cast::<Header>() }
    }

    fn header_mut(&mut self) -> Result<&mut Header> {
        let ptr = self
            .mapping
            .as_mut()
            .expect("MappedFile::header_mut observed mid-extend")
            .as_mut_ptr()?
            .cast::<Header>();
        // SAFETY: see `header`; `&mut self` guarantees exclusive access.
        Ok(unsafe { &mut *ptr })
    }

    /// Directly mutates bookkeeping fields of the header (item_count, next_write_pos).
    /// Used by the slot-store layer, which owns those invariants.
    pub fn with_header_mut<R>(&mut self, f: impl FnOnce(&mut Header) -> R) -> Result<R> {
        Ok(f(self.header_mut()?))
    }

    /// Slots actually addressable in the data region right now.
    pub fn real_capacity(&self) -> u64 {
        self.header().real_capacity
    }

    fn data_offset(&self, slot: u64, item_size: u64) -> u64 {
        Header::SIZE as u64 + slot * item_size
    }

    /// Writes `bytes` at `next_write_pos` (per the header) and returns that slot
    /// index. Does **not** advance `next_write_pos` — the slot-store layer does
    /// that once it has flipped the corresponding bitmap bit.
    pub fn write_sequential(&mut self, bytes: &[u8], sync: bool) -> Result<u64> {
        if self.mode == StorageMode::ReadOnly {
            return Err(Error::NoWrite);
        }
        let item_size = self.header().item_size;
        let next_write_pos = self.header().next_write_pos;
        let offset = self.data_offset(next_write_pos, item_size);
        self.write_positional(offset, bytes, sync)?;
        Ok(next_write_pos)
    }

    /// Writes `bytes` at an absolute byte offset, which must land inside the data
    /// region (`>= header_size`).
    pub fn write_positional(&mut self, byte_offset: u64, bytes: &[u8], sync: bool) -> Result<()> {
        if self.mode == StorageMode::ReadOnly {
            return Err(Error::NoWrite);
        }
        if byte_offset < Header::SIZE as u64 {
            return Err(Error::IllegalPos {
                pos: byte_offset,
                capacity: Header::SIZE as u64,
            });
        }
        let end = byte_offset as usize + bytes.len();
        let ptr = self
            .mapping
            .as_mut()
            .expect("MappedFile mapping missing")
            .as_mut_ptr()?;
        let len = self.mapping().len();
        if end > len {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "write would run past the end of the mapping",
            )));
        }
        // SAFETY: `end <= len` was checked above, and `ptr` points at a live
        // mapping of at least `len` bytes for the lifetime of `&mut self`.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.add(byte_offset as usize), bytes.len());
        }
        if sync {
            let page = page_size() as usize;
            let sync_base = byte_offset as usize & !(page - 1);
            let sync_len = end - sync_base;
            self.mapping().flush_range(sync_base, sync_len, true)?;
        }
        trace!(path = %self.path.display(), byte_offset, len = bytes.len(), sync, "wrote bytes");
        Ok(())
    }

    /// Borrows `len` bytes directly out of the mapping starting at `byte_offset`,
    /// with a lifetime tied to `&self`. Used by the slot-store layer's
    /// `find_ptr` for zero-copy reads; the borrow checker prevents holding
    /// this across a call that might remap (those all require `&mut self`).
    pub fn slice(&self, byte_offset: u64, len: usize) -> Result<&[u8]> {
        let end = byte_offset as usize + len;
        if end > self.mapping().len() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "slice would run past the end of the mapping",
            )));
        }
        // SAFETY: bounds checked above; the returned slice borrows `self` so
        // it cannot outlive a subsequent `&mut self` call that remaps.
        let bytes = unsafe {
            std::slice::from_raw_parts(self.mapping().as_ptr().add(byte_offset as usize), len)
        };
        trace!(path = %self.path.display(), byte_offset, len, "sliced bytes");
        Ok(bytes)
    }

    /// Copies `out.len()` bytes out of the mapping starting at `byte_offset`.
    pub fn read(&self, byte_offset: u64, out: &mut [u8]) -> Result<()> {
        let end = byte_offset as usize + out.len();
        if end > self.mapping().len() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "read would run past the end of the mapping",
            )));
        }
        // SAFETY: bounds checked above; source and destination do not overlap
        // since `out` is caller-owned.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.mapping().as_ptr().add(byte_offset as usize),
                out.as_mut_ptr(),
                out.len(),
            );
        }
        trace!(path = %self.path.display(), byte_offset, len = out.len(), "read bytes");
        Ok(())
    }

    /// Asynchronous `msync` of the full mapping.
    pub fn flush(&self) -> Result<()> {
        if self.mode == StorageMode::ReadOnly {
            return Ok(());
        }
        self.mapping().flush().map_err(Error::Io)
    }

    /// Flushes, unmaps, truncates the file by `extend_size` (or `count_hint` if
    /// larger), remaps, and updates the header's capacity bookkeeping.
    ///
    /// The returned base address may change: any pointer obtained from `header`,
    /// `read`, or a slot-store's `find_ptr` before this call must not be used
    /// afterward.
    pub fn extend_and_remap(&mut self, count_hint: Option<u64>) -> Result<()> {
        if self.mode == StorageMode::ReadOnly {
            return Err(Error::NoWrite);
        }
        self.flush()?;

        let growth = count_hint.map_or(self.extend_size, |hint| hint.max(self.extend_size));
        let old_total = self.total_size;
        let item_size = self.header().item_size;
        let old_real_capacity = self.header().real_capacity;

        // Unmap before resizing so the kernel can materialize the new region cleanly.
        self.mapping = None;

        let new_total = old_total + growth;
        if let Err(err) = self.file.set_len(new_total) {
            warn!(path = %self.path.display(), %err, "failed to extend mapped file");
            return Err(Error::Io(err));
        }
        if new_total > 0 {
            self.file.write_at(&[0u8], new_total - 1)?;
        }

        // SAFETY: `file` was just resized to `new_total` bytes above.
        let mapping = unsafe { MmapMut::map_mut(&self.file)? };
        self.mapping = Some(Mapping::ReadWrite(mapping));
        self.total_size = new_total;

        let added_slots = growth / item_size.max(1);
        self.with_header_mut(|h| {
            h.pre_extend_capacity = old_real_capacity;
            h.real_capacity = old_real_capacity + added_slots;
        })?;

        debug!(
            path = %self.path.display(),
            old_real_capacity,
            new_real_capacity = old_real_capacity + added_slots,
            "extended mapped file"
        );
        Ok(())
    }

    /// Flushes and releases the mapping and file descriptor. Equivalent to letting
    /// the value drop, but lets callers observe I/O failures.
    pub fn close(mut self) -> Result<()> {
        let result = self.flush();
        self.mapping = None;
        result
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!(path = %self.path.display(), %err, "failed to flush mapped file on drop");
        }
    }
}
