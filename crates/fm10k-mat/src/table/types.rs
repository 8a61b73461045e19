//! Core MA table data types.

use fm10k_types::{Fid, MacAddress, PortId, PortMask};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lookup key for an MA table entry: MAC address within a filtering domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MacEntryKey {
    pub mac: MacAddress,
    pub fid: Fid,
}

impl MacEntryKey {
    /// Creates a key from its parts.
    pub fn new(mac: MacAddress, fid: Fid) -> Self {
        MacEntryKey { mac, fid }
    }
}

impl fmt::Display for MacEntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.mac, self.fid)
    }
}

/// How an entry got into the table and how it may leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AddressType {
    /// Learned from traffic; ages out.
    DynamicLearned,
    /// Added through the API; never ages.
    Static,
    /// Learned from traffic on a secured port; ages, but hardware
    /// learns may not move it.
    SecureDynamic,
    /// Added through the API on a secured port.
    SecureStatic,
}

impl AddressType {
    /// Static entries never age and survive dynamic flushes.
    pub fn is_static(&self) -> bool {
        matches!(self, AddressType::Static | AddressType::SecureStatic)
    }

    /// Secure entries may not be displaced by hardware-sourced learns.
    pub fn is_secure(&self) -> bool {
        matches!(self, AddressType::SecureDynamic | AddressType::SecureStatic)
    }
}

/// Entry lifecycle state as tracked by the aging sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EntryState {
    /// Bin is free.
    Invalid,
    /// Recently learned or refreshed.
    Young,
    /// Survived one sweep without a refresh.
    Old,
    /// Static entry, exempt from aging.
    Locked,
    /// Aged out; removed (and reported) on the next pass over it.
    Expired,
    /// Relocated by hardware; resolved by the next cache sync.
    Moved,
}

impl EntryState {
    /// Returns true when the bin holds a live entry.
    pub fn is_valid(&self) -> bool {
        *self != EntryState::Invalid
    }

    /// Returns true for states the aging sweep advances or removes.
    pub fn participates_in_aging(&self) -> bool {
        matches!(
            self,
            EntryState::Young | EntryState::Old | EntryState::Expired
        )
    }
}

/// One MA table entry as mirrored in the software cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacTableEntry {
    pub key: MacEntryKey,
    pub port: PortId,
    pub addr_type: AddressType,
    pub state: EntryState,
    /// Optional trigger identifier attached by the frame handler.
    pub trigger: Option<u32>,
    /// Destination port mask for multicast-style entries.
    pub dest_mask: PortMask,
}

impl MacTableEntry {
    /// Creates a live entry. Static types start Locked, dynamic types Young.
    pub fn new(key: MacEntryKey, port: PortId, addr_type: AddressType) -> Self {
        let state = if addr_type.is_static() {
            EntryState::Locked
        } else {
            EntryState::Young
        };
        MacTableEntry {
            key,
            port,
            addr_type,
            state,
            trigger: None,
            dest_mask: PortMask::from(port),
        }
    }

    /// Creates an empty bin.
    pub fn empty() -> Self {
        MacTableEntry {
            key: MacEntryKey::new(MacAddress::ZERO, Fid::new(Fid::MIN).unwrap()),
            port: PortId::CPU,
            addr_type: AddressType::DynamicLearned,
            state: EntryState::Invalid,
            trigger: None,
            dest_mask: PortMask::EMPTY,
        }
    }

    /// Sets the destination mask.
    pub fn with_dest_mask(mut self, dest_mask: PortMask) -> Self {
        self.dest_mask = dest_mask;
        self
    }

    /// Attaches a trigger identifier.
    pub fn with_trigger(mut self, trigger: u32) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Returns true when the bin holds a live entry.
    pub fn is_valid(&self) -> bool {
        self.state.is_valid()
    }

    /// Returns true for live entries that flushes and aging may remove.
    pub fn is_dynamic(&self) -> bool {
        self.is_valid() && !self.addr_type.is_static()
    }
}

/// MA table shape: bins are addressed as `bank * bins_per_bank + bin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableGeometry {
    pub banks: usize,
    pub bins_per_bank: usize,
}

impl Default for TableGeometry {
    fn default() -> Self {
        TableGeometry {
            banks: 4,
            bins_per_bank: 4096,
        }
    }
}

impl TableGeometry {
    /// Register words per MA table entry.
    pub const WORDS_PER_ENTRY: u32 = 6;
    /// Register words reserved for per-port security configuration.
    pub const PORT_CFG_WORDS: u32 = 64;

    /// Creates a geometry with the given shape.
    pub fn new(banks: usize, bins_per_bank: usize) -> Self {
        TableGeometry {
            banks,
            bins_per_bank,
        }
    }

    /// Total entry count.
    pub fn entries(&self) -> usize {
        self.banks * self.bins_per_bank
    }

    /// Flat index of a (bank, bin) pair.
    pub fn index(&self, bank: usize, bin: usize) -> usize {
        bank * self.bins_per_bank + bin
    }

    /// Bank of a flat index.
    pub fn bank_of(&self, index: usize) -> usize {
        index / self.bins_per_bank
    }

    /// Bin-within-bank of a flat index.
    pub fn bin_of(&self, index: usize) -> usize {
        index % self.bins_per_bank
    }

    /// Base register address of an entry.
    pub fn entry_addr(&self, index: usize) -> u32 {
        index as u32 * Self::WORDS_PER_ENTRY
    }

    /// Register address of a port's security configuration word.
    pub fn port_cfg_addr(&self, port: PortId) -> u32 {
        self.entries() as u32 * Self::WORDS_PER_ENTRY + u32::from(port.as_u16())
    }

    /// Register words a switch needs for this geometry.
    pub fn register_words(&self) -> u32 {
        self.entries() as u32 * Self::WORDS_PER_ENTRY + Self::PORT_CFG_WORDS
    }
}
