//! Transition tables and their builder.

use crate::error::{FsmError, FsmResult};
use crate::types::{TransitionCallback, TransitionLogCallback};

/// One cell of a transition table.
#[derive(Clone)]
pub struct Transition {
    pub(crate) kind: TransitionKind,
}

#[derive(Clone)]
pub(crate) enum TransitionKind {
    /// Fixed next state, optional action.
    Action {
        next_state: usize,
        action: Option<TransitionCallback>,
    },
    /// The guard callback selects the next state through the context.
    Guard { guard: TransitionCallback },
    /// Unset cell: the event is ignored in place.
    Ignore,
}

impl Transition {
    /// An unconditional transition to `next_state`.
    pub fn to(next_state: usize) -> Self {
        Transition {
            kind: TransitionKind::Action {
                next_state,
                action: None,
            },
        }
    }

    /// A transition to `next_state` running `action` first. If the action
    /// fails the instance stays put and the record is marked failed.
    pub fn to_with(next_state: usize, action: TransitionCallback) -> Self {
        Transition {
            kind: TransitionKind::Action {
                next_state,
                action: Some(action),
            },
        }
    }

    /// A guarded transition: `guard` picks the next state via
    /// [`TransitionContext::set_next_state`](crate::TransitionContext::set_next_state).
    pub fn guarded(guard: TransitionCallback) -> Self {
        Transition {
            kind: TransitionKind::Guard { guard },
        }
    }

    fn is_set(&self) -> bool {
        !matches!(self.kind, TransitionKind::Ignore)
    }
}

/// Builder for [`TransitionTable`].
///
/// Cells left unset become ignore cells at build time: delivering such an
/// event leaves the instance in place with no side effect.
pub struct TransitionTableBuilder {
    n_states: usize,
    n_events: usize,
    entries: Vec<(usize, usize, Transition)>,
    log: Option<TransitionLogCallback>,
    state_names: Option<Vec<String>>,
    event_names: Option<Vec<String>>,
}

impl TransitionTableBuilder {
    /// Starts a table over `n_states` states and `n_events` events.
    pub fn new(n_states: usize, n_events: usize) -> Self {
        TransitionTableBuilder {
            n_states,
            n_events,
            entries: Vec::new(),
            log: None,
            state_names: None,
            event_names: None,
        }
    }

    /// Sets the cell for `(state, event)`.
    pub fn on(mut self, state: usize, event: usize, transition: Transition) -> Self {
        self.entries.push((state, event, transition));
        self
    }

    /// Installs a per-type observer called after each recorded transition,
    /// failed attempts included.
    pub fn with_transition_log(mut self, log: TransitionLogCallback) -> Self {
        self.log = Some(log);
        self
    }

    /// Names the states, for logs and dumps.
    pub fn with_state_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.state_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Names the events, for logs and dumps.
    pub fn with_event_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.event_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Densifies and validates the table.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty dimension, an out-of-range
    /// cell index or action target, a cell set twice, or a name list whose
    /// length does not match its dimension.
    pub fn build(self) -> FsmResult<TransitionTable> {
        if self.n_states == 0 || self.n_events == 0 {
            return Err(FsmError::invalid_argument(
                "transition table dimensions must be non-zero",
            ));
        }
        if let Some(names) = &self.state_names {
            if names.len() != self.n_states {
                return Err(FsmError::invalid_argument(format!(
                    "{} state names for {} states",
                    names.len(),
                    self.n_states
                )));
            }
        }
        if let Some(names) = &self.event_names {
            if names.len() != self.n_events {
                return Err(FsmError::invalid_argument(format!(
                    "{} event names for {} events",
                    names.len(),
                    self.n_events
                )));
            }
        }

        let mut cells = vec![
            Transition {
                kind: TransitionKind::Ignore,
            };
            self.n_states * self.n_events
        ];
        for (state, event, transition) in self.entries {
            if state >= self.n_states || event >= self.n_events {
                return Err(FsmError::invalid_argument(format!(
                    "cell ({state}, {event}) outside {}x{} table",
                    self.n_states, self.n_events
                )));
            }
            if let TransitionKind::Action { next_state, .. } = &transition.kind {
                if *next_state >= self.n_states {
                    return Err(FsmError::invalid_argument(format!(
                        "cell ({state}, {event}) targets out-of-range state {next_state}"
                    )));
                }
            }
            let cell = &mut cells[state * self.n_events + event];
            if cell.is_set() {
                return Err(FsmError::invalid_argument(format!(
                    "cell ({state}, {event}) set twice"
                )));
            }
            *cell = transition;
        }

        Ok(TransitionTable {
            n_states: self.n_states,
            n_events: self.n_events,
            cells,
            log: self.log,
            state_names: self.state_names,
            event_names: self.event_names,
        })
    }
}

/// A dense transition table shared by all instances of one type.
///
/// Lookup is a single index: `state * n_events + event`.
#[derive(Clone)]
pub struct TransitionTable {
    n_states: usize,
    n_events: usize,
    cells: Vec<Transition>,
    log: Option<TransitionLogCallback>,
    state_names: Option<Vec<String>>,
    event_names: Option<Vec<String>>,
}

impl TransitionTable {
    /// Returns the number of states.
    pub fn n_states(&self) -> usize {
        self.n_states
    }

    /// Returns the number of events.
    pub fn n_events(&self) -> usize {
        self.n_events
    }

    pub(crate) fn cell(&self, state: usize, event: usize) -> &Transition {
        &self.cells[state * self.n_events + event]
    }

    pub(crate) fn log(&self) -> Option<&TransitionLogCallback> {
        self.log.as_ref()
    }

    /// Returns the display name of a state.
    pub fn state_name(&self, state: usize) -> String {
        match &self.state_names {
            Some(names) if state < names.len() => names[state].clone(),
            _ => format!("state{state}"),
        }
    }

    /// Returns the display name of an event.
    pub fn event_name(&self, event: usize) -> String {
        match &self.event_names {
            Some(names) if event < names.len() => names[event].clone(),
            _ => format!("event{event}"),
        }
    }
}
