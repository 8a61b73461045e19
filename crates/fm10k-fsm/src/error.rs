//! Engine error types.

use crate::types::SmTypeId;
use fm10k_hal::SwitchStatus;
use thiserror::Error;

/// Error type for state machine engine operations.
#[derive(Debug, Clone, Error)]
pub enum FsmError {
    /// An argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The state machine type is not registered.
    #[error("state machine type {0} is not registered")]
    UnknownType(SmTypeId),

    /// The state machine type is already registered.
    #[error("state machine type {0} is already registered")]
    AlreadyRegistered(SmTypeId),

    /// The state machine type still has bound instances.
    #[error("state machine type {0} has bound instances")]
    TypeInUse(SmTypeId),

    /// The instance is already bound to a type.
    #[error("instance is already bound to state machine type {0}")]
    BoundStateMachine(SmTypeId),

    /// The instance has never been started.
    #[error("instance is not started")]
    NotStarted,

    /// The handle is stale or was never issued.
    #[error("stale or invalid instance handle")]
    InvalidHandle,

    /// A guard callback selected a state outside the table.
    #[error("callback selected out-of-range next state {next} (limit {limit})")]
    InvalidNextState { next: usize, limit: usize },

    /// The instance was created without a history buffer.
    #[error("transition history is disabled for this instance")]
    HistoryDisabled,

    /// A transition action reported a failure.
    #[error("transition action failed: {0}")]
    ActionFailed(String),
}

impl FsmError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        FsmError::InvalidArgument(message.into())
    }

    /// Creates an action failure.
    pub fn action_failed(message: impl Into<String>) -> Self {
        FsmError::ActionFailed(message.into())
    }

    /// Projects this error onto the raw status contract.
    pub fn status(&self) -> SwitchStatus {
        match self {
            FsmError::InvalidArgument(_) => SwitchStatus::InvalidArgument,
            FsmError::UnknownType(_) => SwitchStatus::UnknownType,
            FsmError::AlreadyRegistered(_) => SwitchStatus::AlreadyRegistered,
            FsmError::TypeInUse(_) => SwitchStatus::TypeInUse,
            FsmError::BoundStateMachine(_) => SwitchStatus::BoundStateMachine,
            FsmError::NotStarted => SwitchStatus::InvalidState,
            FsmError::InvalidHandle => SwitchStatus::InvalidHandle,
            FsmError::InvalidNextState { .. } => SwitchStatus::InvalidState,
            FsmError::HistoryDisabled => SwitchStatus::Unsupported,
            FsmError::ActionFailed(_) => SwitchStatus::Failure,
        }
    }
}

/// Result type for engine operations.
pub type FsmResult<T> = Result<T, FsmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_projection() {
        assert_eq!(
            FsmError::UnknownType(SmTypeId::new(4)).status(),
            SwitchStatus::UnknownType
        );
        assert_eq!(FsmError::InvalidHandle.status(), SwitchStatus::InvalidHandle);
        assert_eq!(
            FsmError::invalid_argument("x").status(),
            SwitchStatus::InvalidArgument
        );
    }

    #[test]
    fn test_display() {
        let err = FsmError::TypeInUse(SmTypeId::new(7));
        assert_eq!(err.to_string(), "state machine type 7 has bound instances");
    }
}
