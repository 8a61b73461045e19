//! In-memory mirror of the hardware MA table.
//!
//! The cache is a dense array indexed exactly like the hardware table, so
//! every software decision maps one-to-one onto a register address. Each
//! bank hashes the key with its own seed, giving a key one candidate bin
//! per bank.

use crate::error::{MatError, MatResult};
use crate::table::types::{
    AddressType, EntryState, MacEntryKey, MacTableEntry, TableGeometry,
};
use ahash::RandomState;
use fm10k_types::{Fid, MacAddress, PortId, PortMask};
use serde::Serialize;

// Bank seeds mix these with the bank number so banks disagree on bin
// placement, as the hardware hash functions do.
const HASH_K0: u64 = 0x243f_6a88_85a3_08d3;
const HASH_K1: u64 = 0x1319_8a2e_0370_7344;
const HASH_K2: u64 = 0xa409_3822_299f_31d0;
const HASH_K3: u64 = 0x082e_fa98_ec4e_6c89;

/// Live-entry counts by state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheCounts {
    pub young: usize,
    pub old: usize,
    pub locked: usize,
    pub expired: usize,
    pub moved: usize,
}

impl CacheCounts {
    /// Total live entries.
    pub fn valid(&self) -> usize {
        self.young + self.old + self.locked + self.expired + self.moved
    }
}

/// Software copy of one switch's MA table.
pub struct MacTableCache {
    geometry: TableGeometry,
    entries: Vec<MacTableEntry>,
    bank_hashers: Vec<RandomState>,
}

impl MacTableCache {
    /// Creates an empty cache for the given geometry.
    pub fn new(geometry: TableGeometry) -> Self {
        let bank_hashers = (0..geometry.banks)
            .map(|bank| {
                let bank = bank as u64;
                RandomState::with_seeds(HASH_K0, HASH_K1 ^ bank, HASH_K2, HASH_K3 ^ (bank << 17))
            })
            .collect();
        MacTableCache {
            geometry,
            entries: vec![MacTableEntry::empty(); geometry.entries()],
            bank_hashers,
        }
    }

    /// Table geometry.
    pub fn geometry(&self) -> TableGeometry {
        self.geometry
    }

    /// Candidate bin index for a key in one bank.
    pub fn bin_for(&self, bank: usize, key: &MacEntryKey) -> usize {
        let hash = self.bank_hashers[bank].hash_one((key.mac.to_u48(), key.fid.as_u16()));
        self.geometry
            .index(bank, (hash % self.geometry.bins_per_bank as u64) as usize)
    }

    /// Flat indices of the key's candidate bin in every bank, bank order.
    pub fn candidates(&self, key: &MacEntryKey) -> Vec<usize> {
        (0..self.geometry.banks)
            .map(|bank| self.bin_for(bank, key))
            .collect()
    }

    /// Entry at a flat index.
    pub fn entry(&self, index: usize) -> &MacTableEntry {
        &self.entries[index]
    }

    /// Mutable entry at a flat index.
    pub fn entry_mut(&mut self, index: usize) -> &mut MacTableEntry {
        &mut self.entries[index]
    }

    /// Marks a bin free.
    pub fn clear_entry(&mut self, index: usize) {
        self.entries[index] = MacTableEntry::empty();
    }

    /// Finds the live entry for a key, candidate banks in order.
    pub fn lookup(&self, key: &MacEntryKey) -> Option<usize> {
        self.candidates(key)
            .into_iter()
            .find(|&index| self.entries[index].is_valid() && self.entries[index].key == *key)
    }

    /// Iterates live entries with their flat indices.
    pub fn iter_valid(&self) -> impl Iterator<Item = (usize, &MacTableEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_valid())
    }

    /// Number of live entries.
    pub fn valid_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_valid()).count()
    }

    /// Live-entry counts by state.
    pub fn counts(&self) -> CacheCounts {
        let mut counts = CacheCounts::default();
        for entry in &self.entries {
            match entry.state {
                EntryState::Invalid => {}
                EntryState::Young => counts.young += 1,
                EntryState::Old => counts.old += 1,
                EntryState::Locked => counts.locked += 1,
                EntryState::Expired => counts.expired += 1,
                EntryState::Moved => counts.moved += 1,
            }
        }
        counts
    }
}

/// Packs an entry into its register image.
///
/// Word layout: mac low, mac high plus FID, control bits, trigger,
/// destination mask low, destination mask high.
pub fn encode_entry(entry: &MacTableEntry) -> [u32; TableGeometry::WORDS_PER_ENTRY as usize] {
    let mac = entry.key.mac.to_u48();
    let addr_type = match entry.addr_type {
        AddressType::DynamicLearned => 0u32,
        AddressType::Static => 1,
        AddressType::SecureDynamic => 2,
        AddressType::SecureStatic => 3,
    };
    let state = match entry.state {
        EntryState::Invalid => 0u32,
        EntryState::Young => 1,
        EntryState::Old => 2,
        EntryState::Locked => 3,
        EntryState::Expired => 4,
        EntryState::Moved => 5,
    };
    let mut control = u32::from(entry.port.as_u16()) & 0x3f;
    control |= addr_type << 6;
    control |= state << 8;
    if entry.trigger.is_some() {
        control |= 1 << 11;
    }
    let dest = entry.dest_mask.as_raw();
    [
        (mac & 0xffff_ffff) as u32,
        ((mac >> 32) as u32 & 0xffff) | (u32::from(entry.key.fid.as_u16()) << 16),
        control,
        entry.trigger.unwrap_or_default(),
        (dest & 0xffff_ffff) as u32,
        (dest >> 32) as u32,
    ]
}

/// Unpacks a register image back into an entry.
pub fn decode_entry(
    words: &[u32; TableGeometry::WORDS_PER_ENTRY as usize],
) -> MatResult<MacTableEntry> {
    let mac = u64::from(words[0]) | (u64::from(words[1] & 0xffff) << 32);
    let fid_raw = (words[1] >> 16) as u16;
    let fid = Fid::new(fid_raw).map_err(|_| MatError::InvalidFid(fid_raw))?;
    let port_raw = (words[2] & 0x3f) as u16;
    let port = PortId::new(port_raw)
        .map_err(|_| MatError::internal(format!("decoded port {} out of range", port_raw)))?;
    let addr_type = match (words[2] >> 6) & 0x3 {
        0 => AddressType::DynamicLearned,
        1 => AddressType::Static,
        2 => AddressType::SecureDynamic,
        _ => AddressType::SecureStatic,
    };
    let state = match (words[2] >> 8) & 0x7 {
        0 => EntryState::Invalid,
        1 => EntryState::Young,
        2 => EntryState::Old,
        3 => EntryState::Locked,
        4 => EntryState::Expired,
        5 => EntryState::Moved,
        raw => {
            return Err(MatError::internal(format!(
                "decoded entry state {} out of range",
                raw
            )))
        }
    };
    let trigger = if words[2] & (1 << 11) != 0 {
        Some(words[3])
    } else {
        None
    };
    let dest_mask = PortMask::from_raw(u64::from(words[4]) | (u64::from(words[5]) << 32));
    Ok(MacTableEntry {
        key: MacEntryKey::new(MacAddress::from_u48(mac), fid),
        port,
        addr_type,
        state,
        trigger,
        dest_mask,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(byte: u8, fid: u16) -> MacEntryKey {
        MacEntryKey::new(
            MacAddress::new([0x52, 0x54, 0x00, 0x00, 0x00, byte]),
            Fid::new(fid).unwrap(),
        )
    }

    fn small_cache() -> MacTableCache {
        MacTableCache::new(TableGeometry::new(4, 16))
    }

    #[test]
    fn test_candidates_one_per_bank() {
        let cache = small_cache();
        let candidates = cache.candidates(&key(1, 1));
        assert_eq!(candidates.len(), 4);
        for (bank, &index) in candidates.iter().enumerate() {
            assert_eq!(cache.geometry().bank_of(index), bank);
        }
    }

    #[test]
    fn test_candidates_deterministic() {
        let a = small_cache();
        let b = small_cache();
        assert_eq!(a.candidates(&key(7, 30)), b.candidates(&key(7, 30)));
    }

    #[test]
    fn test_banks_hash_independently() {
        // With one shared hash, every key would land in the same bin
        // offset in all banks. The keyed per-bank seeds must break that
        // for at least one of a handful of keys.
        let cache = small_cache();
        let mut differs = false;
        for byte in 0..8 {
            let candidates = cache.candidates(&key(byte, 1));
            let first_bin = cache.geometry().bin_of(candidates[0]);
            if candidates
                .iter()
                .any(|&index| cache.geometry().bin_of(index) != first_bin)
            {
                differs = true;
                break;
            }
        }
        assert!(differs);
    }

    #[test]
    fn test_lookup_and_clear() {
        let mut cache = small_cache();
        let key = key(3, 9);
        assert_eq!(cache.lookup(&key), None);

        let index = cache.candidates(&key)[2];
        *cache.entry_mut(index) =
            MacTableEntry::new(key, PortId::new(4).unwrap(), AddressType::DynamicLearned);
        assert_eq!(cache.lookup(&key), Some(index));
        assert_eq!(cache.valid_count(), 1);

        cache.clear_entry(index);
        assert_eq!(cache.lookup(&key), None);
        assert_eq!(cache.valid_count(), 0);
    }

    #[test]
    fn test_counts_by_state() {
        let mut cache = small_cache();
        let k0 = key(1, 1);
        let k1 = key(2, 1);
        let i0 = cache.candidates(&k0)[0];
        let i1 = cache.candidates(&k1)[1];
        *cache.entry_mut(i0) =
            MacTableEntry::new(k0, PortId::new(1).unwrap(), AddressType::DynamicLearned);
        *cache.entry_mut(i1) =
            MacTableEntry::new(k1, PortId::new(2).unwrap(), AddressType::Static);

        let counts = cache.counts();
        assert_eq!(counts.young, 1);
        assert_eq!(counts.locked, 1);
        assert_eq!(counts.valid(), 2);
    }

    #[test]
    fn test_entry_codec_round_trip() {
        let entry = MacTableEntry::new(
            key(0xaa, 4095),
            PortId::new(63).unwrap(),
            AddressType::SecureDynamic,
        )
        .with_trigger(0xdead_beef)
        .with_dest_mask(PortMask::from_raw(0x8000_0000_0000_0001));
        let decoded = decode_entry(&encode_entry(&entry)).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_decode_empty_bin() {
        let decoded = decode_entry(&encode_entry(&MacTableEntry::empty())).unwrap();
        assert!(!decoded.is_valid());
    }

    #[test]
    fn test_decode_rejects_bad_state() {
        let mut words = encode_entry(&MacTableEntry::empty());
        words[2] |= 7 << 8;
        assert!(decode_entry(&words).is_err());
    }
}
