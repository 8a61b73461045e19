//! The engine: type registry, instance arena, and event delivery.

use crate::error::{FsmError, FsmResult};
use crate::history::{HistoryRing, TransitionRecord};
use crate::table::{TransitionKind, TransitionTable};
use crate::types::{
    Disposition, EventInfo, LockPrecedence, SmHandle, SmTypeId, TransitionContext,
    TransitionOutcome,
};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

struct Binding {
    type_id: SmTypeId,
    table: Arc<TransitionTable>,
}

struct Instance {
    binding: Option<Binding>,
    /// Retained across `stop` for post-mortem reads; `None` until the
    /// first `start`.
    current_state: Option<usize>,
    history: HistoryRing,
    /// Bumped on start, stop, and every recorded delivery. An in-flight
    /// delivery whose snapshot epoch no longer matches lost the race and
    /// is dropped.
    epoch: u64,
}

struct Slot {
    generation: u32,
    instance: Option<Instance>,
}

#[derive(Default)]
struct EngineInner {
    types: HashMap<SmTypeId, Arc<TransitionTable>>,
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl EngineInner {
    fn instance(&self, handle: SmHandle) -> FsmResult<&Instance> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.instance.as_ref())
            .ok_or(FsmError::InvalidHandle)
    }

    fn instance_mut(&mut self, handle: SmHandle) -> FsmResult<&mut Instance> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.instance.as_mut())
            .ok_or(FsmError::InvalidHandle)
    }
}

/// The state machine engine.
///
/// All operations take `&self`; the engine serializes internally with one
/// mutex that is never held across a user callback. Share it as
/// `Arc<Engine>`, including from inside callbacks.
pub struct Engine {
    inner: Mutex<EngineInner>,
}

impl Engine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Engine {
            inner: Mutex::new(EngineInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a transition table under `id`.
    ///
    /// With `ok_if_registered`, registering an id that already exists is a
    /// no-op keeping the existing table.
    pub fn register_type(
        &self,
        id: SmTypeId,
        table: TransitionTable,
        ok_if_registered: bool,
    ) -> FsmResult<()> {
        let mut inner = self.lock();
        if inner.types.contains_key(&id) {
            if ok_if_registered {
                debug!("sm type {id}: already registered, keeping existing table");
                return Ok(());
            }
            return Err(FsmError::AlreadyRegistered(id));
        }
        debug!(
            "sm type {id}: registered ({} states, {} events)",
            table.n_states(),
            table.n_events()
        );
        inner.types.insert(id, Arc::new(table));
        Ok(())
    }

    /// Unregisters a type.
    ///
    /// A type with bound instances fails with `TypeInUse` unless
    /// `skip_if_in_use`, which turns that case into a no-op.
    pub fn unregister_type(&self, id: SmTypeId, skip_if_in_use: bool) -> FsmResult<()> {
        let mut inner = self.lock();
        if !inner.types.contains_key(&id) {
            return Err(FsmError::UnknownType(id));
        }
        let in_use = inner.slots.iter().any(|slot| {
            slot.instance
                .as_ref()
                .and_then(|instance| instance.binding.as_ref())
                .is_some_and(|binding| binding.type_id == id)
        });
        if in_use {
            if skip_if_in_use {
                debug!("sm type {id}: still in use, keeping registration");
                return Ok(());
            }
            return Err(FsmError::TypeInUse(id));
        }
        inner.types.remove(&id);
        debug!("sm type {id}: unregistered");
        Ok(())
    }

    /// Creates an unbound instance.
    ///
    /// `history_capacity` 0 disables the transition history;
    /// `record_payload_size` fixes the payload bytes kept per record.
    pub fn create(&self, history_capacity: usize, record_payload_size: usize) -> SmHandle {
        let mut inner = self.lock();
        let instance = Instance {
            binding: None,
            current_state: None,
            history: HistoryRing::new(history_capacity, record_payload_size),
            epoch: 0,
        };
        let handle = match inner.free.pop() {
            Some(index) => {
                let slot = &mut inner.slots[index as usize];
                slot.instance = Some(instance);
                SmHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = inner.slots.len() as u32;
                inner.slots.push(Slot {
                    generation: 0,
                    instance: Some(instance),
                });
                SmHandle {
                    index,
                    generation: 0,
                }
            }
        };
        debug!("{handle}: created (history {history_capacity})");
        handle
    }

    /// Binds an instance to a registered type and enters `initial_state`.
    ///
    /// Appends the synthetic start record (no event, no prior state).
    pub fn start(&self, handle: SmHandle, type_id: SmTypeId, initial_state: usize) -> FsmResult<()> {
        let record = {
            let mut inner = self.lock();
            let table = match inner.instance(handle)?.binding.as_ref() {
                Some(binding) => return Err(FsmError::BoundStateMachine(binding.type_id)),
                None => inner
                    .types
                    .get(&type_id)
                    .cloned()
                    .ok_or(FsmError::UnknownType(type_id))?,
            };
            if initial_state >= table.n_states() {
                return Err(FsmError::invalid_argument(format!(
                    "initial state {initial_state} outside table with {} states",
                    table.n_states()
                )));
            }
            let instance = inner.instance_mut(handle)?;
            instance.binding = Some(Binding {
                type_id,
                table: table.clone(),
            });
            instance.current_state = Some(initial_state);
            instance.epoch += 1;
            let record =
                instance
                    .history
                    .push(None, None, initial_state, TransitionOutcome::Completed, &[]);
            debug!(
                "{handle}: started as type {type_id} in {}",
                table.state_name(initial_state)
            );
            table.log().cloned().map(|log| (log, record))
        };
        if let Some((log, record)) = record {
            log(&record);
        }
        Ok(())
    }

    /// Unbinds an instance. State and history stay readable; further
    /// events fail with `NotStarted`.
    pub fn stop(&self, handle: SmHandle) -> FsmResult<()> {
        let mut inner = self.lock();
        let instance = inner.instance_mut(handle)?;
        if instance.binding.is_none() {
            return Err(FsmError::NotStarted);
        }
        instance.binding = None;
        instance.epoch += 1;
        debug!("{handle}: stopped");
        Ok(())
    }

    /// Deletes an instance, recycling its slot. Outstanding handles go
    /// stale immediately.
    pub fn delete(&self, handle: SmHandle) -> FsmResult<()> {
        let mut inner = self.lock();
        let slot = inner
            .slots
            .get_mut(handle.index as usize)
            .ok_or(FsmError::InvalidHandle)?;
        if slot.generation != handle.generation || slot.instance.is_none() {
            return Err(FsmError::InvalidHandle);
        }
        slot.instance = None;
        slot.generation = slot.generation.wrapping_add(1);
        inner.free.push(handle.index);
        debug!("{handle}: deleted");
        Ok(())
    }

    /// Delivers an event to an instance.
    ///
    /// The cell callback runs with the engine lock released, so callbacks
    /// may call any engine operation, including on their own instance. If
    /// the instance is deleted, rebound, or advanced while the callback
    /// runs, the delivery is dropped as [`Disposition::Superseded`] and
    /// any callback error is discarded with it.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a maximal lock precedence or an out-of-range
    /// event; `InvalidNextState` when a guard selects a state outside the
    /// table (nothing commits); the callback's own error when an action or
    /// guard fails against a still-current instance (the failed attempt is
    /// recorded, the state does not advance).
    pub fn notify(
        &self,
        handle: SmHandle,
        info: &EventInfo,
        payload: &[u8],
    ) -> FsmResult<Disposition> {
        if info.precedence() == LockPrecedence::MAX {
            return Err(FsmError::invalid_argument(
                "cannot deliver events at maximal lock precedence",
            ));
        }

        // Phase 1: snapshot under the lock.
        let (table, type_id, from_state, epoch) = {
            let inner = self.lock();
            let instance = inner.instance(handle)?;
            let binding = instance.binding.as_ref().ok_or(FsmError::NotStarted)?;
            let table = Arc::clone(&binding.table);
            let type_id = binding.type_id;
            if info.event() >= table.n_events() {
                return Err(FsmError::invalid_argument(format!(
                    "event {} outside table with {} events",
                    info.event(),
                    table.n_events()
                )));
            }
            let from_state = instance.current_state.ok_or(FsmError::NotStarted)?;
            let epoch = instance.epoch;

            if matches!(table.cell(from_state, info.event()).kind, TransitionKind::Ignore) {
                drop(inner);
                trace!(
                    "{handle}: {} ignored in {}",
                    table.event_name(info.event()),
                    table.state_name(from_state)
                );
                return Ok(Disposition::Ignored { state: from_state });
            }
            (table, type_id, from_state, epoch)
        };

        // Phase 2: run the cell callback unlocked.
        let cell = table.cell(from_state, info.event());
        let (seed_state, callback, is_guard) = match &cell.kind {
            TransitionKind::Action { next_state, action } => (*next_state, action.clone(), false),
            TransitionKind::Guard { guard } => (from_state, Some(Arc::clone(guard)), true),
            TransitionKind::Ignore => return Ok(Disposition::Ignored { state: from_state }),
        };

        let mut ctx = TransitionContext::new(*info, payload, from_state, seed_state);
        let callback_result = match &callback {
            Some(callback) => callback(&mut ctx),
            None => Ok(()),
        };
        let chosen_state = ctx.next_state();
        let suppress_record = ctx.record_suppressed();

        // Phase 3: re-validate and commit under the lock.
        let mut inner = self.lock();
        let still_current = match inner.instance(handle) {
            Ok(instance) => {
                matches!(&instance.binding, Some(binding) if binding.type_id == type_id)
                    && instance.epoch == epoch
            }
            Err(_) => false,
        };
        if !still_current {
            drop(inner);
            debug!(
                "{handle}: {} superseded mid-delivery",
                table.event_name(info.event())
            );
            return Ok(Disposition::Superseded);
        }
        if is_guard && callback_result.is_ok() && chosen_state >= table.n_states() {
            return Err(FsmError::InvalidNextState {
                next: chosen_state,
                limit: table.n_states(),
            });
        }

        let instance = inner.instance_mut(handle)?;
        let outcome = if callback_result.is_ok() {
            instance.current_state = Some(chosen_state);
            TransitionOutcome::Completed
        } else {
            TransitionOutcome::Failed
        };
        instance.epoch += 1;
        let record = if suppress_record {
            None
        } else {
            Some(instance.history.push(
                Some(info.event()),
                Some(from_state),
                chosen_state,
                outcome,
                payload,
            ))
        };
        drop(inner);

        if let Some(record) = &record {
            if let Some(log) = table.log() {
                log(record);
            }
        }

        match callback_result {
            Ok(()) => {
                debug!(
                    "{handle}: {} -> {} on {}",
                    table.state_name(from_state),
                    table.state_name(chosen_state),
                    table.event_name(info.event())
                );
                Ok(Disposition::Committed {
                    from: from_state,
                    to: chosen_state,
                })
            }
            Err(err) => {
                warn!(
                    "{handle}: {} failed in {}: {err}",
                    table.event_name(info.event()),
                    table.state_name(from_state)
                );
                Err(err)
            }
        }
    }

    /// Returns the current (or last, after `stop`) state index.
    pub fn current_state(&self, handle: SmHandle) -> FsmResult<usize> {
        let inner = self.lock();
        inner.instance(handle)?.current_state.ok_or(FsmError::NotStarted)
    }

    /// Returns the retained transition records, oldest first.
    pub fn history(&self, handle: SmHandle) -> FsmResult<Vec<TransitionRecord>> {
        let inner = self.lock();
        let instance = inner.instance(handle)?;
        if !instance.history.enabled() {
            return Err(FsmError::HistoryDisabled);
        }
        Ok(instance.history.records())
    }

    /// Drops all retained records.
    pub fn clear_history(&self, handle: SmHandle) -> FsmResult<()> {
        let mut inner = self.lock();
        let instance = inner.instance_mut(handle)?;
        if !instance.history.enabled() {
            return Err(FsmError::HistoryDisabled);
        }
        instance.history.clear();
        Ok(())
    }

    /// Changes the history capacity, keeping the newest records that fit.
    /// Capacity 0 disables the history from here on.
    pub fn resize_history(&self, handle: SmHandle, new_capacity: usize) -> FsmResult<()> {
        let mut inner = self.lock();
        inner.instance_mut(handle)?.history.resize(new_capacity);
        Ok(())
    }

    /// Registered type ids, ascending.
    pub fn registered_types(&self) -> Vec<SmTypeId> {
        let inner = self.lock();
        let mut types: Vec<SmTypeId> = inner.types.keys().copied().collect();
        types.sort();
        types
    }

    /// Number of live instances.
    pub fn active_instances(&self) -> usize {
        let inner = self.lock();
        inner
            .slots
            .iter()
            .filter(|slot| slot.instance.is_some())
            .count()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
