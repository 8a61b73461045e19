//! Logical port types.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::str::FromStr;

/// Logical port number (0-63).
///
/// Logical ports on this family map one-to-one onto bits of the 64-bit
/// destination masks carried in MA table entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct PortId(u16);

impl PortId {
    /// Maximum valid logical port number.
    pub const MAX: u16 = 63;

    /// The CPU port.
    pub const CPU: PortId = PortId(0);

    /// Creates a new logical port number.
    ///
    /// # Errors
    ///
    /// Returns an error if the port does not fit the 64-port space.
    pub const fn new(port: u16) -> Result<Self, ParseError> {
        if port <= Self::MAX {
            Ok(PortId(port))
        } else {
            Err(ParseError::InvalidPort(port))
        }
    }

    /// Returns the port number as a u16.
    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns the bit index of this port within a [`PortMask`].
    pub const fn mask_bit(&self) -> u64 {
        1u64 << self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PortId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let port: u16 = s.parse().map_err(|_| ParseError::InvalidPort(u16::MAX))?;
        PortId::new(port)
    }
}

impl TryFrom<u16> for PortId {
    type Error = ParseError;

    fn try_from(port: u16) -> Result<Self, Self::Error> {
        PortId::new(port)
    }
}

impl From<PortId> for u16 {
    fn from(port: PortId) -> u16 {
        port.0
    }
}

/// A 64-bit destination port bitmask.
///
/// # Examples
///
/// ```
/// use fm10k_types::{PortId, PortMask};
///
/// let mut mask = PortMask::EMPTY;
/// mask.set(PortId::new(3).unwrap());
/// assert!(mask.contains(PortId::new(3).unwrap()));
/// assert_eq!(mask.count(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortMask(u64);

impl PortMask {
    /// The empty mask.
    pub const EMPTY: PortMask = PortMask(0);

    /// All 64 logical ports.
    pub const ALL: PortMask = PortMask(u64::MAX);

    /// Creates a mask from a raw 64-bit value.
    pub const fn from_raw(raw: u64) -> Self {
        PortMask(raw)
    }

    /// Creates a mask containing exactly the given ports.
    pub fn from_ports<I: IntoIterator<Item = PortId>>(ports: I) -> Self {
        let mut mask = PortMask::EMPTY;
        for port in ports {
            mask.set(port);
        }
        mask
    }

    /// Returns the raw 64-bit value.
    pub const fn as_raw(&self) -> u64 {
        self.0
    }

    /// Adds a port to the mask.
    pub fn set(&mut self, port: PortId) {
        self.0 |= port.mask_bit();
    }

    /// Removes a port from the mask.
    pub fn clear(&mut self, port: PortId) {
        self.0 &= !port.mask_bit();
    }

    /// Returns true if the mask contains the port.
    pub const fn contains(&self, port: PortId) -> bool {
        self.0 & port.mask_bit() != 0
    }

    /// Returns the number of ports in the mask.
    pub const fn count(&self) -> u32 {
        self.0.count_ones()
    }

    /// Returns true if no port is set.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterates the ports present in the mask, lowest first.
    pub fn ports(&self) -> impl Iterator<Item = PortId> + '_ {
        (0..=PortId::MAX).filter_map(move |bit| {
            if self.0 & (1u64 << bit) != 0 {
                // bit is bounded by PortId::MAX
                Some(PortId(bit))
            } else {
                None
            }
        })
    }
}

impl BitOr for PortMask {
    type Output = PortMask;

    fn bitor(self, rhs: PortMask) -> PortMask {
        PortMask(self.0 | rhs.0)
    }
}

impl BitAnd for PortMask {
    type Output = PortMask;

    fn bitand(self, rhs: PortMask) -> PortMask {
        PortMask(self.0 & rhs.0)
    }
}

impl From<PortId> for PortMask {
    fn from(port: PortId) -> PortMask {
        PortMask(port.mask_bit())
    }
}

impl fmt::Display for PortMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}
