//! Generic state machine engine.
//!
//! State machine behavior is described once per *type* as a dense
//! transition table over integer state and event indices; any number of
//! *instances* then bind to a registered type and share its table. The
//! engine serializes transitions per process, keeps a bounded per-instance
//! transition history, and runs user callbacks with its own lock released
//! so callbacks may re-enter the engine freely.
//!
//! Instances are addressed through [`SmHandle`], a generation-tagged slot
//! handle: once an instance is deleted every outstanding handle to it goes
//! stale and fails with [`FsmError::InvalidHandle`] instead of touching a
//! recycled slot.

mod engine;
mod error;
mod history;
mod table;
mod types;

pub use engine::Engine;
pub use error::{FsmError, FsmResult};
pub use history::TransitionRecord;
pub use table::{Transition, TransitionTable, TransitionTableBuilder};
pub use types::{
    Disposition, EventInfo, LockPrecedence, SmHandle, SmTypeId, TransitionCallback,
    TransitionContext, TransitionLogCallback, TransitionOutcome,
};
