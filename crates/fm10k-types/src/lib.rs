//! Common primitive types for the FM10000 switch control plane.
//!
//! This crate provides type-safe representations of the primitives shared
//! across the table-maintenance crates:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`Fid`]: forwarding identifiers (the VLAN-derived learning domain)
//! - [`PortId`]: logical port numbers
//! - [`PortMask`]: 64-bit destination port bitmasks

mod fid;
mod mac;
mod port;

pub use fid::Fid;
pub use mac::MacAddress;
pub use port::{PortId, PortMask};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid FID: {0} (must be 0-4095)")]
    InvalidFid(u16),

    #[error("invalid logical port: {0} (must be 0-63)")]
    InvalidPort(u16),
}
