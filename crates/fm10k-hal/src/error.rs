//! Status codes and error types for the hardware boundary.
//!
//! This module converts the platform driver's raw status codes into
//! Rust's Result type and back, so callers that still speak the numeric
//! contract get stable values.

use crate::types::SwitchId;
use std::fmt;
use thiserror::Error;

/// Platform status codes matching the driver API contract.
///
/// Negative values are errors; `Ok` is zero. Domain layers project their
/// typed errors onto these codes at the API boundary.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchStatus {
    Ok = 0,
    Failure = -1,
    InvalidArgument = -2,
    NoMemory = -3,
    Unsupported = -4,
    Uninitialized = -5,
    InvalidPort = -6,
    InvalidFid = -7,
    AddrBankFull = -8,
    StaticAddrExists = -9,
    TableFull = -10,
    AlreadyRegistered = -11,
    TypeInUse = -12,
    UnknownType = -13,
    BoundStateMachine = -14,
    InvalidHandle = -15,
    InvalidState = -16,
    LockBusy = -17,
    EventQueueFull = -18,
    AddrNotFound = -19,
}

impl SwitchStatus {
    /// Creates a SwitchStatus from a raw i32 value.
    pub fn from_raw(status: i32) -> Self {
        match status {
            0 => SwitchStatus::Ok,
            -1 => SwitchStatus::Failure,
            -2 => SwitchStatus::InvalidArgument,
            -3 => SwitchStatus::NoMemory,
            -4 => SwitchStatus::Unsupported,
            -5 => SwitchStatus::Uninitialized,
            -6 => SwitchStatus::InvalidPort,
            -7 => SwitchStatus::InvalidFid,
            -8 => SwitchStatus::AddrBankFull,
            -9 => SwitchStatus::StaticAddrExists,
            -10 => SwitchStatus::TableFull,
            -11 => SwitchStatus::AlreadyRegistered,
            -12 => SwitchStatus::TypeInUse,
            -13 => SwitchStatus::UnknownType,
            -14 => SwitchStatus::BoundStateMachine,
            -15 => SwitchStatus::InvalidHandle,
            -16 => SwitchStatus::InvalidState,
            -17 => SwitchStatus::LockBusy,
            -18 => SwitchStatus::EventQueueFull,
            -19 => SwitchStatus::AddrNotFound,
            _ => SwitchStatus::Failure,
        }
    }

    /// Returns true if the status indicates success.
    pub fn is_success(&self) -> bool {
        *self == SwitchStatus::Ok
    }

    /// Returns true if the status indicates an error.
    pub fn is_error(&self) -> bool {
        *self != SwitchStatus::Ok
    }

    /// Converts to a Result, returning Ok(()) for success.
    pub fn into_result(self) -> HalResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(HalError::Status { status: self })
        }
    }
}

impl fmt::Display for SwitchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwitchStatus::Ok => "FM_OK",
            SwitchStatus::Failure => "FM_FAIL",
            SwitchStatus::InvalidArgument => "FM_ERR_INVALID_ARGUMENT",
            SwitchStatus::NoMemory => "FM_ERR_NO_MEM",
            SwitchStatus::Unsupported => "FM_ERR_UNSUPPORTED",
            SwitchStatus::Uninitialized => "FM_ERR_UNINITIALIZED",
            SwitchStatus::InvalidPort => "FM_ERR_INVALID_PORT",
            SwitchStatus::InvalidFid => "FM_ERR_INVALID_FID",
            SwitchStatus::AddrBankFull => "FM_ERR_ADDR_BANK_FULL",
            SwitchStatus::StaticAddrExists => "FM_ERR_STATIC_ADDR_EXISTS",
            SwitchStatus::TableFull => "FM_ERR_TABLE_FULL",
            SwitchStatus::AlreadyRegistered => "FM_ERR_ALREADY_REGISTERED",
            SwitchStatus::TypeInUse => "FM_ERR_TYPE_IN_USE",
            SwitchStatus::UnknownType => "FM_ERR_UNKNOWN_TYPE",
            SwitchStatus::BoundStateMachine => "FM_ERR_BOUND_STATE_MACHINE",
            SwitchStatus::InvalidHandle => "FM_ERR_INVALID_HANDLE",
            SwitchStatus::InvalidState => "FM_ERR_INVALID_STATE",
            SwitchStatus::LockBusy => "FM_ERR_LOCK_BUSY",
            SwitchStatus::EventQueueFull => "FM_ERR_EVENT_QUEUE_FULL",
            SwitchStatus::AddrNotFound => "FM_ERR_ADDR_NOT_FOUND",
        };
        write!(f, "{}", s)
    }
}

/// Error type for register-level hardware access.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// The device reported an error status.
    #[error("hardware operation failed: {status}")]
    Status { status: SwitchStatus },

    /// A register address fell outside the mapped window.
    #[error("register address 0x{addr:08x} out of range (limit 0x{limit:08x})")]
    AddressOutOfRange { addr: u32, limit: u32 },

    /// The addressed switch is not present.
    #[error("switch {switch} not present")]
    DeviceGone { switch: SwitchId },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl HalError {
    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        HalError::Internal {
            message: message.into(),
        }
    }

    /// Projects this error onto the raw status contract.
    pub fn status(&self) -> SwitchStatus {
        match self {
            HalError::Status { status } => *status,
            HalError::AddressOutOfRange { .. } => SwitchStatus::InvalidArgument,
            HalError::DeviceGone { .. } => SwitchStatus::Uninitialized,
            HalError::Internal { .. } => SwitchStatus::Failure,
        }
    }
}

/// Result type for hardware access.
pub type HalResult<T> = Result<T, HalError>;

/// Extension trait for converting raw status codes.
pub trait SwitchStatusExt {
    /// Converts a raw status code to a Result.
    fn to_result(self) -> HalResult<()>;
}

impl SwitchStatusExt for i32 {
    fn to_result(self) -> HalResult<()> {
        SwitchStatus::from_raw(self).into_result()
    }
}
