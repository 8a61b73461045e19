//! Typed identifiers for the hardware boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a switch within the platform.
///
/// Multi-chip platforms number their switches densely from zero; the
/// maintenance layer iterates this space round-robin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwitchId(u8);

impl SwitchId {
    /// Creates a new switch index.
    pub const fn new(index: u8) -> Self {
        SwitchId(index)
    }

    /// Returns the raw index.
    pub const fn as_u8(&self) -> u8 {
        self.0
    }

    /// Returns the index as a usize, for table addressing.
    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SwitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sw{}", self.0)
    }
}

impl From<u8> for SwitchId {
    fn from(index: u8) -> Self {
        SwitchId(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display() {
        assert_eq!(SwitchId::new(0).to_string(), "sw0");
        assert_eq!(SwitchId::new(7).to_string(), "sw7");
    }

    #[test]
    fn test_ordering() {
        assert!(SwitchId::new(1) < SwitchId::new(2));
    }
}
