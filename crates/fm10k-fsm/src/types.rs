//! Handle, event, and context types shared across the engine.

use crate::error::FsmResult;
use crate::history::TransitionRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Registry key for a state machine type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SmTypeId(u32);

impl SmTypeId {
    /// Creates a new type id.
    pub const fn new(id: u32) -> Self {
        SmTypeId(id)
    }

    /// Returns the raw id.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SmTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a state machine instance.
///
/// Handles carry the generation of the slot they were issued against.
/// Deleting an instance bumps the slot generation, so every handle issued
/// before the delete stops resolving rather than aliasing whatever gets
/// created in the recycled slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SmHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for SmHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sm{}.{}", self.index, self.generation)
    }
}

/// Lock precedence declared by an event notifier.
///
/// Callers declare the highest lock precedence they hold when raising an
/// event. A caller already at the maximal precedence cannot take the
/// engine lock without inverting the global lock order, so the engine
/// refuses such notifications outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct LockPrecedence(u8);

impl LockPrecedence {
    /// The lowest precedence (no locks held).
    pub const NONE: LockPrecedence = LockPrecedence(0);

    /// The maximal precedence; notifications at this level are rejected.
    pub const MAX: LockPrecedence = LockPrecedence(u8::MAX);

    /// Creates a precedence level.
    pub const fn new(level: u8) -> Self {
        LockPrecedence(level)
    }

    /// Returns the raw level.
    pub const fn as_u8(&self) -> u8 {
        self.0
    }
}

/// An event delivered to a state machine instance.
#[derive(Debug, Clone, Copy)]
pub struct EventInfo {
    event: usize,
    precedence: LockPrecedence,
}

impl EventInfo {
    /// Creates an event descriptor with no locks declared.
    pub const fn new(event: usize) -> Self {
        EventInfo {
            event,
            precedence: LockPrecedence::NONE,
        }
    }

    /// Declares the highest lock precedence held by the notifier.
    pub const fn with_precedence(mut self, precedence: LockPrecedence) -> Self {
        self.precedence = precedence;
        self
    }

    /// Returns the event index.
    pub const fn event(&self) -> usize {
        self.event
    }

    /// Returns the declared lock precedence.
    pub const fn precedence(&self) -> LockPrecedence {
        self.precedence
    }
}

/// Whether a recorded transition completed or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionOutcome {
    Completed,
    Failed,
}

impl TransitionOutcome {
    /// Returns true for failed transitions.
    pub const fn is_failed(&self) -> bool {
        matches!(self, TransitionOutcome::Failed)
    }
}

/// How a delivered event was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The transition committed; `to` may equal `from` for a self-loop.
    Committed { from: usize, to: usize },

    /// The (state, event) cell is unset; the event was ignored in place.
    Ignored { state: usize },

    /// The instance was deleted, rebound, or advanced by a nested call
    /// while the callback ran; the event was dropped as already handled.
    Superseded,
}

impl Disposition {
    /// Returns true if the transition committed.
    pub const fn is_committed(&self) -> bool {
        matches!(self, Disposition::Committed { .. })
    }
}

/// Mutable view handed to guard and action callbacks.
///
/// The context is built after the engine lock is released, so callbacks
/// may call back into the engine through it without deadlocking.
pub struct TransitionContext<'a> {
    event: EventInfo,
    payload: &'a [u8],
    current_state: usize,
    next_state: usize,
    suppress_record: bool,
}

impl<'a> TransitionContext<'a> {
    pub(crate) fn new(event: EventInfo, payload: &'a [u8], current_state: usize, next_state: usize) -> Self {
        TransitionContext {
            event,
            payload,
            current_state,
            next_state,
            suppress_record: false,
        }
    }

    /// Returns the event being delivered.
    pub const fn event(&self) -> EventInfo {
        self.event
    }

    /// Returns the caller payload attached to the event.
    pub const fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Returns the state the instance occupied when the event fired.
    pub const fn current_state(&self) -> usize {
        self.current_state
    }

    /// Returns the next state as currently selected.
    ///
    /// For guard cells this starts at the current state, so a guard that
    /// never calls [`set_next_state`](Self::set_next_state) self-loops.
    pub const fn next_state(&self) -> usize {
        self.next_state
    }

    /// Selects the next state. Only meaningful in guard callbacks; action
    /// cells carry their target in the table.
    pub fn set_next_state(&mut self, state: usize) {
        self.next_state = state;
    }

    /// Suppresses the history record for this event. The flag resets on
    /// every delivery.
    pub fn skip_history_record(&mut self) {
        self.suppress_record = true;
    }

    pub(crate) const fn record_suppressed(&self) -> bool {
        self.suppress_record
    }
}

/// Guard or action callback attached to a transition cell.
pub type TransitionCallback =
    Arc<dyn Fn(&mut TransitionContext<'_>) -> FsmResult<()> + Send + Sync>;

/// Per-type observer invoked after each recorded transition (including
/// failed attempts), outside the engine lock.
pub type TransitionLogCallback = Arc<dyn Fn(&TransitionRecord) + Send + Sync>;
