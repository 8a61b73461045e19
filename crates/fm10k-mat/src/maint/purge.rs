//! Purge request queue and lifecycle.
//!
//! A purge is a hardware bulk removal of dynamic entries. Requests queue
//! up while one runs; the lifecycle is tracked by a state machine so the
//! worker, the API, and diagnostics all see the same picture:
//!
//! ```text
//! IDLE --request--> PENDING --start--> EXECUTING --complete--> IDLE
//!                      ^                    |
//!                      +----(more queued)---+
//! ```

use crate::error::{MatError, MatResult};
use fm10k_fsm::{
    Engine, EventInfo, SmHandle, SmTypeId, Transition, TransitionCallback, TransitionRecord,
    TransitionTableBuilder,
};
use fm10k_hal::SwitchId;
use fm10k_types::Fid;
use log::debug;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// State machine type shared by every switch's purge instance.
pub const PURGE_SM_TYPE: SmTypeId = SmTypeId::new(1);

pub const STATE_IDLE: usize = 0;
pub const STATE_PENDING: usize = 1;
pub const STATE_EXECUTING: usize = 2;

pub const EVENT_REQUEST: usize = 0;
pub const EVENT_START: usize = 1;
pub const EVENT_COMPLETE: usize = 2;

const HISTORY_CAPACITY: usize = 8;
/// Record payload: more-work flag plus the purge sequence number.
const PAYLOAD_SIZE: usize = 9;
const MAX_QUEUED: usize = 64;

/// Which entries a purge removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeScope {
    /// Every dynamic entry.
    All,
    /// Dynamic entries in one FID.
    Fid(Fid),
}

impl PurgeScope {
    /// Returns true when an entry's FID falls inside this scope.
    pub fn covers(&self, fid: Fid) -> bool {
        match self {
            PurgeScope::All => true,
            PurgeScope::Fid(scope_fid) => *scope_fid == fid,
        }
    }
}

/// Invoked once when the purge it was registered with completes.
pub type PurgeHandler = Box<dyn FnOnce(u64) + Send>;

struct PurgeRequest {
    seq: u64,
    scope: PurgeScope,
    handler: Option<PurgeHandler>,
}

#[derive(Default)]
struct PurgeQueue {
    requests: VecDeque<PurgeRequest>,
    active: Option<PurgeRequest>,
    next_seq: u64,
}

impl PurgeQueue {
    fn has_handler(&self) -> bool {
        self.requests.iter().any(|r| r.handler.is_some())
            || self.active.as_ref().map_or(false, |r| r.handler.is_some())
    }
}

/// Per-switch purge state: the queue plus its state machine instance.
pub struct PurgeControl {
    switch: SwitchId,
    engine: Arc<Engine>,
    handle: SmHandle,
    queue: Mutex<PurgeQueue>,
}

impl PurgeControl {
    /// Creates the purge machine for a switch, registering the shared
    /// transition table on first use.
    pub fn new(engine: Arc<Engine>, switch: SwitchId) -> MatResult<Self> {
        engine.register_type(PURGE_SM_TYPE, purge_table()?, true)?;
        let handle = engine.create(HISTORY_CAPACITY, PAYLOAD_SIZE);
        engine.start(handle, PURGE_SM_TYPE, STATE_IDLE)?;
        Ok(PurgeControl {
            switch,
            engine,
            handle,
            queue: Mutex::new(PurgeQueue::default()),
        })
    }

    /// Queues a purge request, optionally with a completion handler.
    ///
    /// At most one handler may be waiting across the queue and the
    /// running purge.
    pub fn request(&self, scope: PurgeScope, handler: Option<PurgeHandler>) -> MatResult<u64> {
        let seq = {
            let mut queue = self.lock_queue();
            if queue.requests.len() >= MAX_QUEUED {
                return Err(MatError::internal(format!(
                    "{}: purge queue overflow",
                    self.switch
                )));
            }
            if handler.is_some() && queue.has_handler() {
                return Err(MatError::HandlerAlreadyRegistered);
            }
            let seq = queue.next_seq;
            queue.next_seq += 1;
            queue.requests.push_back(PurgeRequest {
                seq,
                scope,
                handler,
            });
            seq
        };
        self.engine
            .notify(self.handle, &EventInfo::new(EVENT_REQUEST), &[])?;
        debug!("{}: purge {} queued, scope {:?}", self.switch, seq, scope);
        Ok(seq)
    }

    /// Starts the next queued purge if none is running.
    ///
    /// Returns what to hand to the hardware, or `None` when there is
    /// nothing to start.
    pub fn begin_next(&self) -> MatResult<Option<(u64, PurgeScope)>> {
        if self.state()? != STATE_PENDING {
            return Ok(None);
        }
        let started = {
            let mut queue = self.lock_queue();
            if queue.active.is_some() {
                return Ok(None);
            }
            match queue.requests.pop_front() {
                Some(request) => {
                    let started = (request.seq, request.scope);
                    queue.active = Some(request);
                    started
                }
                None => return Ok(None),
            }
        };
        self.engine
            .notify(self.handle, &EventInfo::new(EVENT_START), &[])?;
        Ok(Some(started))
    }

    /// Finishes the running purge.
    ///
    /// Returns its sequence, scope, and any completion handler; the
    /// caller invokes the handler once its own cleanup is done.
    pub fn finish(&self) -> MatResult<Option<(u64, PurgeScope, Option<PurgeHandler>)>> {
        let (request, has_more) = {
            let mut queue = self.lock_queue();
            let request = match queue.active.take() {
                Some(request) => request,
                None => return Ok(None),
            };
            let has_more = !queue.requests.is_empty();
            (request, has_more)
        };
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload[0] = has_more as u8;
        payload[1..].copy_from_slice(&request.seq.to_le_bytes());
        self.engine
            .notify(self.handle, &EventInfo::new(EVENT_COMPLETE), &payload)?;

        // A request that raced in after the has_more snapshot would leave
        // the machine idle with work queued. Re-arm it.
        if self.state()? == STATE_IDLE && !self.lock_queue().requests.is_empty() {
            self.engine
                .notify(self.handle, &EventInfo::new(EVENT_REQUEST), &[])?;
        }
        debug!("{}: purge {} complete", self.switch, request.seq);
        Ok(Some((request.seq, request.scope, request.handler)))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MatResult<usize> {
        Ok(self.engine.current_state(self.handle)?)
    }

    /// Queued requests not yet started.
    pub fn queued(&self) -> usize {
        self.lock_queue().requests.len()
    }

    /// Recent lifecycle records, oldest first.
    pub fn history(&self) -> MatResult<Vec<TransitionRecord>> {
        Ok(self.engine.history(self.handle)?)
    }

    /// Human-readable lifecycle lines for diagnostics.
    pub fn dump(&self) -> MatResult<Vec<String>> {
        let mut lines = vec![format!(
            "purge state: {} ({} queued)",
            state_label(self.state()?),
            self.queued()
        )];
        for record in self.history()? {
            let event = match record.event {
                Some(event) => event_label(event).to_string(),
                None => "start".to_string(),
            };
            let from = record
                .from_state
                .map_or("-".to_string(), |s| state_label(s).to_string());
            lines.push(format!(
                "  #{} {}: {} -> {}{}",
                record.seq,
                event,
                from,
                state_label(record.to_state),
                if record.outcome.is_failed() {
                    " (failed)"
                } else {
                    ""
                },
            ));
        }
        Ok(lines)
    }

    /// Releases the state machine instance.
    pub fn shutdown(&self) {
        if let Err(e) = self.engine.delete(self.handle) {
            debug!("{}: purge machine already gone: {}", self.switch, e);
        }
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, PurgeQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn purge_table() -> MatResult<fm10k_fsm::TransitionTable> {
    // COMPLETE consults the payload: byte 0 says whether requests are
    // still queued, picking PENDING over IDLE.
    let complete_guard: TransitionCallback = Arc::new(|ctx| {
        let has_more = ctx.payload().first().copied().unwrap_or(0) == 1;
        ctx.set_next_state(if has_more { STATE_PENDING } else { STATE_IDLE });
        Ok(())
    });
    let table = TransitionTableBuilder::new(3, 3)
        .on(STATE_IDLE, EVENT_REQUEST, Transition::to(STATE_PENDING))
        .on(STATE_PENDING, EVENT_REQUEST, Transition::to(STATE_PENDING))
        .on(STATE_EXECUTING, EVENT_REQUEST, Transition::to(STATE_EXECUTING))
        .on(STATE_PENDING, EVENT_START, Transition::to(STATE_EXECUTING))
        .on(STATE_EXECUTING, EVENT_COMPLETE, Transition::guarded(complete_guard))
        .with_state_names(["IDLE", "PENDING", "EXECUTING"])
        .with_event_names(["REQUEST", "START", "COMPLETE"])
        .build()?;
    Ok(table)
}

fn state_label(state: usize) -> &'static str {
    match state {
        STATE_IDLE => "IDLE",
        STATE_PENDING => "PENDING",
        STATE_EXECUTING => "EXECUTING",
        _ => "?",
    }
}

fn event_label(event: usize) -> &'static str {
    match event {
        EVENT_REQUEST => "REQUEST",
        EVENT_START => "START",
        EVENT_COMPLETE => "COMPLETE",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn control() -> PurgeControl {
        PurgeControl::new(Arc::new(Engine::new()), SwitchId::new(0)).unwrap()
    }

    #[test]
    fn test_request_moves_idle_to_pending() {
        let control = control();
        assert_eq!(control.state().unwrap(), STATE_IDLE);
        control.request(PurgeScope::All, None).unwrap();
        assert_eq!(control.state().unwrap(), STATE_PENDING);
        assert_eq!(control.queued(), 1);
    }

    #[test]
    fn test_full_cycle_returns_to_idle() {
        let control = control();
        control.request(PurgeScope::All, None).unwrap();

        let (seq, scope) = control.begin_next().unwrap().unwrap();
        assert_eq!(seq, 0);
        assert_eq!(scope, PurgeScope::All);
        assert_eq!(control.state().unwrap(), STATE_EXECUTING);

        let (seq, _, handler) = control.finish().unwrap().unwrap();
        assert_eq!(seq, 0);
        assert!(handler.is_none());
        assert_eq!(control.state().unwrap(), STATE_IDLE);
    }

    #[test]
    fn test_queued_request_keeps_machine_pending() {
        let control = control();
        control.request(PurgeScope::All, None).unwrap();
        control.begin_next().unwrap().unwrap();
        // Second request arrives while the first is executing.
        control
            .request(PurgeScope::Fid(Fid::new(7).unwrap()), None)
            .unwrap();
        assert_eq!(control.state().unwrap(), STATE_EXECUTING);

        control.finish().unwrap().unwrap();
        assert_eq!(control.state().unwrap(), STATE_PENDING);

        let (seq, scope) = control.begin_next().unwrap().unwrap();
        assert_eq!(seq, 1);
        assert_eq!(scope, PurgeScope::Fid(Fid::new(7).unwrap()));
    }

    #[test]
    fn test_begin_without_request_is_noop() {
        let control = control();
        assert!(control.begin_next().unwrap().is_none());
        assert!(control.finish().unwrap().is_none());
    }

    #[test]
    fn test_handler_returned_on_completion() {
        let control = control();
        let seen = Arc::new(AtomicU64::new(u64::MAX));
        let seen_clone = seen.clone();
        control
            .request(
                PurgeScope::All,
                Some(Box::new(move |seq| {
                    seen_clone.store(seq, Ordering::SeqCst);
                })),
            )
            .unwrap();
        control.begin_next().unwrap().unwrap();
        let (seq, _, handler) = control.finish().unwrap().unwrap();
        handler.unwrap()(seq);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_second_handler_refused_while_one_waits() {
        let control = control();
        control
            .request(PurgeScope::All, Some(Box::new(|_| {})))
            .unwrap();
        let err = control
            .request(PurgeScope::All, Some(Box::new(|_| {})))
            .unwrap_err();
        assert!(matches!(err, MatError::HandlerAlreadyRegistered));
        // A handler-less request is still fine.
        control.request(PurgeScope::All, None).unwrap();
    }

    #[test]
    fn test_handler_sticks_to_its_request() {
        let control = control();
        control.request(PurgeScope::All, None).unwrap();
        control
            .request(PurgeScope::All, Some(Box::new(|_| {})))
            .unwrap();

        control.begin_next().unwrap().unwrap();
        let (seq, _, handler) = control.finish().unwrap().unwrap();
        assert_eq!(seq, 0);
        assert!(handler.is_none());

        control.begin_next().unwrap().unwrap();
        let (seq, _, handler) = control.finish().unwrap().unwrap();
        assert_eq!(seq, 1);
        assert!(handler.is_some());
    }

    #[test]
    fn test_history_records_lifecycle() {
        let control = control();
        control.request(PurgeScope::All, None).unwrap();
        control.begin_next().unwrap().unwrap();
        control.finish().unwrap().unwrap();

        let history = control.history().unwrap();
        // Synthetic start plus REQUEST, START, COMPLETE.
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].event, None);
        assert_eq!(history[1].event, Some(EVENT_REQUEST));
        assert_eq!(history[3].event, Some(EVENT_COMPLETE));
        assert_eq!(history[3].to_state, STATE_IDLE);
        // COMPLETE carried the sequence number in its payload.
        assert_eq!(history[3].payload[0], 0);
        assert_eq!(&history[3].payload[1..9], &0u64.to_le_bytes());

        let dump = control.dump().unwrap();
        assert!(dump[0].contains("IDLE"));
        assert!(dump.iter().any(|line| line.contains("COMPLETE")));
    }

    #[test]
    fn test_scope_covers() {
        let fid = Fid::new(9).unwrap();
        assert!(PurgeScope::All.covers(fid));
        assert!(PurgeScope::Fid(fid).covers(fid));
        assert!(!PurgeScope::Fid(Fid::new(8).unwrap()).covers(fid));
    }
}
