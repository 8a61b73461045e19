//! Forwarding identifier type with validation.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Forwarding identifier (0-4095).
///
/// The FID is the learning domain the MA table is keyed on. In shared
/// learning mode it is derived from the VLAN, so the 12-bit range matches
/// the VLAN ID space, but FID 0 and 4095 are usable table keys here.
///
/// # Examples
///
/// ```
/// use fm10k_types::Fid;
///
/// let fid = Fid::new(100).unwrap();
/// assert_eq!(fid.as_u16(), 100);
///
/// assert!(Fid::new(4096).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Fid(u16);

impl Fid {
    /// Minimum valid FID.
    pub const MIN: u16 = 0;

    /// Maximum valid FID.
    pub const MAX: u16 = 4095;

    /// Default FID (shared with the default VLAN).
    pub const DEFAULT: Fid = Fid(1);

    /// Creates a new FID.
    ///
    /// # Errors
    ///
    /// Returns an error if the FID is outside the 12-bit range.
    pub const fn new(id: u16) -> Result<Self, ParseError> {
        if id <= Self::MAX {
            Ok(Fid(id))
        } else {
            Err(ParseError::InvalidFid(id))
        }
    }

    /// Returns the FID as a u16.
    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns true if this is the default FID.
    pub const fn is_default(&self) -> bool {
        self.0 == 1
    }
}

impl fmt::Display for Fid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Fid {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u16 = s.parse().map_err(|_| ParseError::InvalidFid(u16::MAX))?;
        Fid::new(id)
    }
}

impl TryFrom<u16> for Fid {
    type Error = ParseError;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        Fid::new(id)
    }
}

impl From<Fid> for u16 {
    fn from(fid: Fid) -> u16 {
        fid.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_valid_fids() {
        assert!(Fid::new(0).is_ok());
        assert!(Fid::new(1).is_ok());
        assert!(Fid::new(4095).is_ok());
    }

    #[test]
    fn test_invalid_fids() {
        assert!(Fid::new(4096).is_err());
        assert!(Fid::new(65535).is_err());
    }

    #[test]
    fn test_parse_numeric() {
        let fid: Fid = "100".parse().unwrap();
        assert_eq!(fid.as_u16(), 100);
    }

    #[test]
    fn test_parse_invalid() {
        assert!("nope".parse::<Fid>().is_err());
        assert!("4096".parse::<Fid>().is_err());
    }

    #[test]
    fn test_default_fid() {
        assert!(Fid::DEFAULT.is_default());
        assert!(!Fid::new(100).unwrap().is_default());
    }

    #[test]
    fn test_display() {
        let fid = Fid::new(100).unwrap();
        assert_eq!(fid.to_string(), "100");
    }

    #[test]
    fn test_ordering() {
        let f1 = Fid::new(10).unwrap();
        let f2 = Fid::new(20).unwrap();
        assert!(f1 < f2);
    }
}
