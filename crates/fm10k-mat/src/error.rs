//! Error types for MAC table maintenance.

use crate::table::MacEntryKey;
use fm10k_fsm::FsmError;
use fm10k_hal::{HalError, SwitchId, SwitchStatus};
use fm10k_types::PortId;
use thiserror::Error;

/// Errors raised by the MAC table layer.
#[derive(Debug, Error)]
pub enum MatError {
    /// The logical port is outside the switch's configured port range.
    #[error("invalid logical port {port} (switch has {limit} ports)")]
    InvalidPort { port: PortId, limit: u16 },

    /// A FID failed validation against the switch configuration.
    #[error("invalid FID {0}")]
    InvalidFid(u16),

    /// Every candidate bin for the key is occupied and none may be displaced.
    #[error("no usable bin for {key} in any bank")]
    BankFull { key: MacEntryKey },

    /// The key already exists as an address this caller may not displace.
    #[error("{key} exists as a non-displaceable address")]
    StaticAddrExists { key: MacEntryKey },

    /// The MA table has no free entries at all.
    #[error("MA table full")]
    TableFull,

    /// The key is not present in the table.
    #[error("address {key} not found")]
    AddrNotFound { key: MacEntryKey },

    /// The switch family does not implement this operation.
    #[error("operation not supported on this switch family")]
    NotSupported,

    /// A purge completion handler is already waiting.
    #[error("purge completion handler already registered")]
    HandlerAlreadyRegistered,

    /// The update event channel has no receiver.
    #[error("update event channel closed")]
    EventChannelClosed,

    /// The switch is detached or administratively down.
    #[error("switch {0} is not attached")]
    SwitchDown(SwitchId),

    /// A caller-supplied argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Register access failed.
    #[error(transparent)]
    Hal(#[from] HalError),

    /// The purge state machine rejected an event.
    #[error("state machine error: {0}")]
    Fsm(#[from] FsmError),

    /// Invariant violation inside the maintenance layer.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MatError {
    /// Creates an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        MatError::InvalidArgument(message.into())
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        MatError::Internal(message.into())
    }

    /// Projects this error onto the raw status contract.
    pub fn status(&self) -> SwitchStatus {
        match self {
            MatError::InvalidPort { .. } => SwitchStatus::InvalidPort,
            MatError::InvalidFid(_) => SwitchStatus::InvalidFid,
            MatError::BankFull { .. } => SwitchStatus::AddrBankFull,
            MatError::StaticAddrExists { .. } => SwitchStatus::StaticAddrExists,
            MatError::TableFull => SwitchStatus::TableFull,
            MatError::AddrNotFound { .. } => SwitchStatus::AddrNotFound,
            MatError::NotSupported => SwitchStatus::Unsupported,
            MatError::HandlerAlreadyRegistered => SwitchStatus::AlreadyRegistered,
            MatError::EventChannelClosed => SwitchStatus::EventQueueFull,
            MatError::SwitchDown(_) => SwitchStatus::Uninitialized,
            MatError::InvalidArgument(_) => SwitchStatus::InvalidArgument,
            MatError::Config(_) => SwitchStatus::InvalidArgument,
            MatError::Hal(e) => e.status(),
            MatError::Fsm(e) => e.status(),
            MatError::Internal(_) => SwitchStatus::Failure,
        }
    }
}

/// Result type for MAC table operations.
pub type MatResult<T> = Result<T, MatError>;

#[cfg(test)]
mod tests {
    use super::*;
    use fm10k_types::{Fid, MacAddress};

    fn key() -> MacEntryKey {
        MacEntryKey::new(
            MacAddress::new([0x52, 0x54, 0x00, 0x01, 0x02, 0x03]),
            Fid::DEFAULT,
        )
    }

    #[test]
    fn test_status_projection() {
        assert_eq!(
            MatError::BankFull { key: key() }.status(),
            SwitchStatus::AddrBankFull
        );
        assert_eq!(
            MatError::StaticAddrExists { key: key() }.status(),
            SwitchStatus::StaticAddrExists
        );
        assert_eq!(MatError::NotSupported.status(), SwitchStatus::Unsupported);
        assert_eq!(
            MatError::HandlerAlreadyRegistered.status(),
            SwitchStatus::AlreadyRegistered
        );
    }

    #[test]
    fn test_hal_error_passthrough() {
        let err = MatError::from(HalError::Status {
            status: SwitchStatus::LockBusy,
        });
        assert_eq!(err.status(), SwitchStatus::LockBusy);
    }

    #[test]
    fn test_display_names_key() {
        let msg = MatError::AddrNotFound { key: key() }.to_string();
        assert!(msg.contains("52:54:00:01:02:03"));
    }
}
