//! MA table model: entry types, the software cache, and bin selection.

pub mod cache;
pub mod insert;
pub mod types;

pub use cache::{decode_entry, encode_entry, CacheCounts, MacTableCache};
pub use insert::{find_best_index, AddSource, BinChoice};
pub use types::{AddressType, EntryState, MacEntryKey, MacTableEntry, TableGeometry};
