//! The fixed-size, plain-old-data header that prefixes every mapped file.

/// Current on-disk format version. Bumped only on an incompatible layout change.
pub const HEADER_VERSION: u64 = 100;

/// Header record written at the start of every mapped file.
///
/// `repr(C)` so that its byte layout is stable and can be read/written in place
/// through the mapping with a pointer cast — there is no serialization step.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Bytes occupied by this header, recorded for forward-compat.
    pub header_size: u64,
    /// On-disk format version.
    pub version: u64,
    /// Bytes per data slot.
    pub item_size: u64,
    /// Number of occupied slots. Advisory; maintained by the slot-store layer.
    pub item_count: u64,
    /// Slots actually addressable in the data region.
    pub real_capacity: u64,
    /// Capacity immediately before the last extension (audit field).
    pub pre_extend_capacity: u64,
    /// Slot index where the next sequential write will land.
    pub next_write_pos: u64,
}

impl Header {
    /// Size of the header in bytes, as recorded in `header_size` on a freshly
    /// initialized file.
    pub const SIZE: usize = std::mem::size_of::<Header>();

    /// Builds a fresh header for a newly created file.
    #[must_use]
    pub fn new(item_size: u64, real_capacity: u64) -> Self {
        Self {
            header_size: Self::SIZE as u64,
            version: HEADER_VERSION,
            item_size,
            item_count: 0,
            real_capacity,
            pre_extend_capacity: 0,
            next_write_pos: 0,
        }
    }

    /// Validates the header invariants: recorded header size matches this build's
    /// layout, and the data region the header describes actually fits in `file_size`.
    pub fn validate(&self, file_size: u64) -> Result<(), String> {
        if self.header_size != Self::SIZE as u64 {
            return Err(format!(
                "header_size {} does not match expected {}",
                self.header_size,
                Self::SIZE
            ));
        }
        let data_bytes = self
            .real_capacity
            .checked_mul(self.item_size)
            .ok_or_else(|| "real_capacity * item_size overflows u64".to_string())?;
        let required = data_bytes
            .checked_add(self.header_size)
            .ok_or_else(|| "header_size + data_bytes overflows u64".to_string())?;
        if required > file_size {
            return Err(format!(
                "file is {file_size} bytes but header describes {required} bytes of header+data"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_header_has_zeroed_bookkeeping() {
        let h = Header::new(32, 100);
        assert_eq!(h.header_size, Header::SIZE as u64);
        assert_eq!(h.version, HEADER_VERSION);
        assert_eq!(h.item_count, 0);
        assert_eq!(h.next_write_pos, 0);
        assert_eq!(h.pre_extend_capacity, 0);
    }

    #[test]
    fn validate_rejects_truncated_file() {
        let h = Header::new(32, 100);
        let required = Header::SIZE as u64 + 32 * 100;
        assert!(h.validate(required).is_ok());
        assert!(h.validate(required - 1).is_err());
    }

    #[test]
    fn validate_rejects_wrong_header_size() {
        let mut h = Header::new(32, 100);
        h.header_size += 1;
        assert!(h.validate(u64::MAX).is_err());
    }
}
