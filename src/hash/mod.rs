//! Separate-chaining hash map and hash set, built on three (map) or two
//! (set) [`crate::storage::SlotStore`] instances.

pub mod fun;
pub mod map;
pub mod record;
pub mod set;

pub use fun::{bucket_index, hash_code};
pub use map::HashMap;
pub use record::{Bucket, MapEntry, Posting, SetEntry};
pub use set::HashSet;
