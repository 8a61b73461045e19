//! Bounded delivery of MA table updates.
//!
//! Updates are batched into fixed-size event buffers drawn from a
//! semaphore-bounded pool, so a slow consumer throttles the producer
//! instead of growing an unbounded queue. Dropping an event returns its
//! buffer to the pool.

use crate::error::{MatError, MatResult};
use crate::table::MacTableEntry;
use fm10k_hal::SwitchId;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// What happened to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateKind {
    /// Entry was written.
    Learned,
    /// Entry was removed by aging, eviction, or deletion.
    Aged,
    /// Entry was removed by a purge.
    Purged,
}

/// Which path produced the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateReason {
    ApiAdd,
    ApiDelete,
    HwLearn,
    AgeSweep,
    Evicted,
    FlushAll,
    FlushPort,
    FlushFid,
    FlushFidPort,
    Purge,
    CacheSync,
}

/// One MA table update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacUpdateRecord {
    pub kind: UpdateKind,
    pub reason: UpdateReason,
    /// Flat table index the update applies to.
    pub index: usize,
    /// Entry contents at the time of the update.
    pub entry: MacTableEntry,
}

/// A batch of updates plus the pool permit backing it.
///
/// The permit rides inside the event, so the pool slot stays taken until
/// the consumer drops the event.
#[derive(Debug)]
pub struct MacUpdateEvent {
    switch: SwitchId,
    records: Vec<MacUpdateRecord>,
    capacity: usize,
    _permit: OwnedSemaphorePermit,
}

impl MacUpdateEvent {
    /// Switch the updates belong to.
    pub fn switch(&self) -> SwitchId {
        self.switch
    }

    /// Batched updates, oldest first.
    pub fn records(&self) -> &[MacUpdateRecord] {
        &self.records
    }

    /// Number of batched updates.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true when the batch holds no updates.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn push(&mut self, record: MacUpdateRecord) {
        self.records.push(record);
    }

    pub(crate) fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }
}

/// Bounded source of update event buffers for one switch.
#[derive(Clone)]
pub struct EventPool {
    switch: SwitchId,
    semaphore: Arc<Semaphore>,
    tx: mpsc::Sender<MacUpdateEvent>,
    burst: usize,
}

impl EventPool {
    /// Creates a pool of `pool_size` buffers of `burst` records each,
    /// returning the consumer half of the delivery channel.
    pub fn new(
        switch: SwitchId,
        pool_size: usize,
        burst: usize,
    ) -> (EventPool, mpsc::Receiver<MacUpdateEvent>) {
        let (tx, rx) = mpsc::channel(pool_size);
        let pool = EventPool {
            switch,
            semaphore: Arc::new(Semaphore::new(pool_size)),
            tx,
            burst,
        };
        (pool, rx)
    }

    /// Takes a buffer, waiting for a free pool slot.
    pub async fn allocate(&self) -> MatResult<MacUpdateEvent> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| MatError::EventChannelClosed)?;
        Ok(self.event(permit))
    }

    /// Takes a buffer only if a pool slot is free right now.
    pub fn try_allocate(&self) -> Option<MacUpdateEvent> {
        let permit = self.semaphore.clone().try_acquire_owned().ok()?;
        Some(self.event(permit))
    }

    /// Hands a batch to the consumer.
    ///
    /// The channel holds as many events as the pool has permits, so this
    /// only waits when the event was allocated from another pool.
    pub async fn deliver(&self, event: MacUpdateEvent) -> MatResult<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| MatError::EventChannelClosed)
    }

    fn event(&self, permit: OwnedSemaphorePermit) -> MacUpdateEvent {
        MacUpdateEvent {
            switch: self.switch,
            records: Vec::with_capacity(self.burst),
            capacity: self.burst.max(1),
            _permit: permit,
        }
    }
}

/// Accumulates update records into pool buffers.
///
/// The first record of a round takes a buffer from the pool, waiting if
/// none is free. A buffer that fills is delivered immediately and
/// replaced without waiting; when no replacement is available the
/// batcher runs empty-handed and drops further records, counting them,
/// until a slot frees or the round ends.
pub struct UpdateBatcher {
    pool: EventPool,
    current: Option<MacUpdateEvent>,
    empty_handed: bool,
    delivered: u64,
    dropped: u64,
}

impl UpdateBatcher {
    /// Creates a batcher over a pool.
    pub fn new(pool: EventPool) -> Self {
        UpdateBatcher {
            pool,
            current: None,
            empty_handed: false,
            delivered: 0,
            dropped: 0,
        }
    }

    /// Appends one record, delivering the batch when it fills.
    pub async fn append(&mut self, record: MacUpdateRecord) -> MatResult<()> {
        if self.current.is_none() {
            if self.empty_handed {
                match self.pool.try_allocate() {
                    Some(event) => {
                        self.empty_handed = false;
                        self.current = Some(event);
                    }
                    None => {
                        self.dropped += 1;
                        return Ok(());
                    }
                }
            } else {
                self.current = Some(self.pool.allocate().await?);
            }
        }
        if let Some(event) = self.current.as_mut() {
            event.push(record);
        }
        let full = self.current.as_ref().map_or(false, |e| e.is_full());
        if full {
            if let Some(event) = self.current.take() {
                self.pool.deliver(event).await?;
                self.delivered += 1;
            }
            match self.pool.try_allocate() {
                Some(next) => self.current = Some(next),
                None => self.empty_handed = true,
            }
        }
        Ok(())
    }

    /// Delivers any partial batch and ends the round.
    pub async fn flush(&mut self) -> MatResult<()> {
        self.empty_handed = false;
        if let Some(event) = self.current.take() {
            if !event.is_empty() {
                self.pool.deliver(event).await?;
                self.delivered += 1;
            }
        }
        Ok(())
    }

    /// Batches delivered so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Records dropped while empty-handed.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
