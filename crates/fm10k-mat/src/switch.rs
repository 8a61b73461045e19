//! Per-switch MA table state and the maintenance service pass.
//!
//! Lock order is maintenance lock, then table lock, then event batcher,
//! and no step holds two at once except the swap at the top of a pass.

use crate::config::MatConfig;
use crate::error::{MatError, MatResult};
use crate::events::{EventPool, MacUpdateEvent, MacUpdateRecord, UpdateBatcher, UpdateKind, UpdateReason};
use crate::maint::ops::{LearnEventKind, MaintOps};
use crate::maint::purge::{PurgeControl, PurgeHandler, PurgeScope, STATE_EXECUTING, STATE_PENDING};
use crate::maint::scan::{age_sweep, flush_matching, purge_matching, sync_cache};
use crate::stats::MaintStats;
use crate::table::{
    encode_entry, find_best_index, AddSource, AddressType, MacEntryKey, MacTableCache,
    MacTableEntry, CacheCounts,
};
use crate::worklist::{MaintFlags, MaintRequest, WorkList, WorkSet};
use fm10k_fsm::Engine;
use fm10k_hal::{Clock, RegisterIo, SwitchId};
use fm10k_types::{PortId, PortMask};
use log::{debug, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, Notify};

/// One attached switch: its table cache, work list, and event plumbing.
pub struct SwitchContext {
    id: SwitchId,
    config: MatConfig,
    up: AtomicBool,
    l2: Mutex<MacTableCache>,
    maint: Mutex<WorkSet>,
    work_notify: Arc<Notify>,
    stats: MaintStats,
    ops: Arc<dyn MaintOps>,
    regs: Arc<dyn RegisterIo>,
    clock: Arc<dyn Clock>,
    batcher: Mutex<UpdateBatcher>,
    purge: PurgeControl,
    last_sweep: StdMutex<Instant>,
}

impl fmt::Debug for SwitchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchContext")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl SwitchContext {
    /// Builds the context and the consumer half of its update channel.
    pub(crate) fn new(
        id: SwitchId,
        config: MatConfig,
        engine: Arc<Engine>,
        ops: Arc<dyn MaintOps>,
        regs: Arc<dyn RegisterIo>,
        clock: Arc<dyn Clock>,
        work_notify: Arc<Notify>,
    ) -> MatResult<(Arc<SwitchContext>, mpsc::Receiver<MacUpdateEvent>)> {
        config.validate()?;
        let (pool, rx) = EventPool::new(id, config.event_pool_size, config.burst_size);
        let purge = PurgeControl::new(engine, id)?;
        let ctx = Arc::new(SwitchContext {
            id,
            up: AtomicBool::new(true),
            l2: Mutex::new(MacTableCache::new(config.geometry)),
            maint: Mutex::new(WorkSet::new()),
            work_notify,
            stats: MaintStats::new(),
            ops,
            regs,
            batcher: Mutex::new(UpdateBatcher::new(pool)),
            purge,
            last_sweep: StdMutex::new(clock.now()),
            clock,
            config,
        });
        Ok((ctx, rx))
    }

    /// Switch identifier.
    pub fn id(&self) -> SwitchId {
        self.id
    }

    /// Effective configuration.
    pub fn config(&self) -> &MatConfig {
        &self.config
    }

    /// Returns true while the switch accepts requests.
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    pub(crate) fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::Release);
    }

    /// Maintenance counters.
    pub fn stats(&self) -> &MaintStats {
        &self.stats
    }

    /// Purge lifecycle control.
    pub fn purge(&self) -> &PurgeControl {
        &self.purge
    }

    /// Live-entry counts by state.
    pub async fn counts(&self) -> CacheCounts {
        self.l2.lock().await.counts()
    }

    /// Looks a key up in the cached table.
    pub async fn lookup(&self, key: &MacEntryKey) -> Option<MacTableEntry> {
        let cache = self.l2.lock().await;
        cache.lookup(key).map(|index| cache.entry(index).clone())
    }

    // ===== table API =====

    /// Adds or refreshes an address.
    pub async fn add_address(
        &self,
        key: MacEntryKey,
        port: PortId,
        addr_type: AddressType,
        dest_mask: Option<PortMask>,
    ) -> MatResult<()> {
        self.check_up()?;
        self.insert_entry(key, port, addr_type, dest_mask, AddSource::Api)
            .await
    }

    /// Removes an address of any type.
    pub async fn remove_address(&self, key: MacEntryKey) -> MatResult<()> {
        self.check_up()?;
        let (index, entry) = {
            let mut cache = self.l2.lock().await;
            let index = cache
                .lookup(&key)
                .ok_or(MatError::AddrNotFound { key })?;
            let entry = cache.entry(index).clone();
            self.write_invalid(index)?;
            cache.clear_entry(index);
            (index, entry)
        };
        self.stats.entries_aged.fetch_add(1, Ordering::Relaxed);
        if self.notify_gate(entry.addr_type) {
            let mut batcher = self.batcher.lock().await;
            batcher
                .append(MacUpdateRecord {
                    kind: UpdateKind::Aged,
                    reason: UpdateReason::ApiDelete,
                    index,
                    entry,
                })
                .await?;
            batcher.flush().await?;
        }
        Ok(())
    }

    /// Queues a flush request.
    pub async fn flush(&self, request: MaintRequest) -> MatResult<()> {
        match request {
            MaintRequest::FlushAllDynamic
            | MaintRequest::FlushPort(_)
            | MaintRequest::FlushFid(_)
            | MaintRequest::FlushFidPort(_, _) => self.issue_maint_request(request).await,
            _ => Err(MatError::invalid_argument(format!(
                "{:?} is not a flush request",
                request
            ))),
        }
    }

    /// Queues a full cache reconciliation.
    pub async fn update_table(&self) -> MatResult<()> {
        self.issue_maint_request(MaintRequest::SyncCache).await
    }

    /// Queues a hardware purge, returning its sequence number.
    pub async fn trigger_purge(
        &self,
        scope: PurgeScope,
        handler: Option<PurgeHandler>,
    ) -> MatResult<u64> {
        self.check_up()?;
        let seq = self.purge.request(scope, handler)?;
        self.issue_maint_request(MaintRequest::HandlePurge).await?;
        Ok(seq)
    }

    /// Folds a request into the pending work list and wakes the worker.
    pub async fn issue_maint_request(&self, request: MaintRequest) -> MatResult<()> {
        self.check_up()?;
        self.validate_request(&request)?;
        self.submit_request(request).await;
        Ok(())
    }

    // ===== service pass =====

    /// Runs one maintenance pass.
    ///
    /// Returns without doing anything when another pass holds the
    /// maintenance lock; the pending list survives for the next pass.
    pub(crate) async fn service(&self) -> MatResult<()> {
        let mut work = match self.maint.try_lock() {
            Ok(mut set) => set.swap_and_reset(),
            Err(_) => {
                self.stats.lock_busy_skips.fetch_add(1, Ordering::Relaxed);
                debug!("{}: maintenance lock busy, deferring pass", self.id);
                return Ok(());
            }
        };
        self.stats.passes.fetch_add(1, Ordering::Relaxed);

        if self.config.polling_required {
            work.flags.set(MaintFlags::SYNC_CACHE);
        }
        let aging_due = self.aging_due();
        let purge_active = self.purge.state()? == STATE_EXECUTING;
        self.stats.count_dispatch(work.flags);
        if work.flags.is_empty() && !aging_due && !purge_active {
            return Ok(());
        }
        debug!("{}: servicing [{}], aging_due={}", self.id, work.flags, aging_due);

        let mut fifo_serviced = false;
        if work.flags.contains(MaintFlags::SERVICE_FIFO) {
            match self.service_fifo().await {
                Ok(()) => fifo_serviced = true,
                Err(e) => warn!("{}: learn FIFO service failed: {}", self.id, e),
            }
        }

        if work.flags.contains(MaintFlags::HANDLE_PURGE) {
            if let Err(e) = self.begin_purge().await {
                warn!("{}: purge start failed: {}", self.id, e);
            }
        }
        if self.purge.state()? == STATE_EXECUTING {
            match self.ops.poll_purge_complete(self.id).await {
                Ok(true) => work.flags.set(MaintFlags::PURGE_COMPLETE),
                Ok(false) => {}
                Err(e) => warn!("{}: purge poll failed: {}", self.id, e),
            }
        }
        if work.flags.contains(MaintFlags::PURGE_COMPLETE) {
            if let Err(e) = self.complete_purge().await {
                warn!("{}: purge completion failed: {}", self.id, e);
            }
        }

        let scan_flags = MaintFlags::FLUSH_DYN_ADDR
            | MaintFlags::FLUSH_PORT
            | MaintFlags::FLUSH_FID
            | MaintFlags::FLUSH_FID_PORT
            | MaintFlags::SYNC_CACHE;
        if work.flags.contains(scan_flags) || aging_due {
            if let Err(e) = self.run_scan(&work, aging_due).await {
                warn!("{}: table scan failed: {}", self.id, e);
            }
        }

        if work.flags.contains(MaintFlags::PORT_ACL_UPDATE) {
            if let Err(e) = self.update_port_acls(&work).await {
                warn!("{}: port ACL update failed: {}", self.id, e);
            }
        }

        if fifo_serviced {
            match self.ops.re_enable_fifo_interrupt(self.id).await {
                Ok(()) | Err(MatError::NotSupported) => {}
                Err(e) => warn!("{}: FIFO interrupt re-arm failed: {}", self.id, e),
            }
        }

        self.batcher.lock().await.flush().await?;
        Ok(())
    }

    // ===== internals =====

    pub(crate) async fn insert_entry(
        &self,
        key: MacEntryKey,
        port: PortId,
        addr_type: AddressType,
        dest_mask: Option<PortMask>,
        source: AddSource,
    ) -> MatResult<()> {
        if port.as_u16() >= self.config.num_ports {
            return Err(MatError::InvalidPort {
                port,
                limit: self.config.num_ports,
            });
        }
        let (choice, written) = {
            let mut cache = self.l2.lock().await;
            let choice = match find_best_index(&cache, &key, port, addr_type, source) {
                Err(MatError::BankFull { key })
                    if cache.valid_count() >= cache.geometry().entries() =>
                {
                    debug!("{}: add of {} found table full", self.id, key);
                    return Err(MatError::TableFull);
                }
                other => other?,
            };
            let mut entry = MacTableEntry::new(key, port, addr_type);
            if let Some(mask) = dest_mask {
                entry.dest_mask = mask;
            }
            self.write_entry(choice.index, &entry)?;
            let written = entry.clone();
            *cache.entry_mut(choice.index) = entry;
            for &dup in &choice.duplicates {
                self.write_invalid(dup)?;
                cache.clear_entry(dup);
            }
            (choice, written)
        };
        if !choice.duplicates.is_empty() {
            self.stats
                .duplicates_invalidated
                .fetch_add(choice.duplicates.len() as u64, Ordering::Relaxed);
        }
        if choice.dual_match {
            warn!(
                "{}: {} present as both static and dynamic, kept the static entry",
                self.id, key
            );
            self.stats.dual_match_anomalies.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.entries_learned.fetch_add(1, Ordering::Relaxed);

        let mut batcher = self.batcher.lock().await;
        if let Some(victim) = choice.evict {
            self.stats.entries_aged.fetch_add(1, Ordering::Relaxed);
            if self.notify_gate(victim.addr_type) {
                batcher
                    .append(MacUpdateRecord {
                        kind: UpdateKind::Aged,
                        reason: UpdateReason::Evicted,
                        index: choice.index,
                        entry: victim,
                    })
                    .await?;
            }
        }
        if self.notify_gate(addr_type) {
            let reason = match source {
                AddSource::Api => UpdateReason::ApiAdd,
                AddSource::LearnFifo => UpdateReason::HwLearn,
            };
            batcher
                .append(MacUpdateRecord {
                    kind: UpdateKind::Learned,
                    reason,
                    index: choice.index,
                    entry: written,
                })
                .await?;
        }
        if source == AddSource::Api {
            // API callers expect their update promptly; learns ride the
            // round's batch.
            batcher.flush().await?;
        }
        Ok(())
    }

    async fn service_fifo(&self) -> MatResult<()> {
        self.stats.fifo_services.fetch_add(1, Ordering::Relaxed);
        let limit = self.config.fifo_batch_limit;
        let events = self.ops.service_learn_fifo(self.id, limit).await?;
        let drained = events.len();
        for event in events {
            match event.kind {
                LearnEventKind::Learn => {
                    self.stats.fifo_learns.fetch_add(1, Ordering::Relaxed);
                    match self
                        .insert_entry(
                            event.key,
                            event.port,
                            AddressType::DynamicLearned,
                            None,
                            AddSource::LearnFifo,
                        )
                        .await
                    {
                        Ok(()) => {}
                        Err(MatError::StaticAddrExists { key }) => {
                            debug!("{}: learn for protected {} dropped", self.id, key);
                        }
                        Err(MatError::BankFull { key }) => {
                            debug!("{}: no bin for learned {}", self.id, key);
                        }
                        Err(e) => return Err(e),
                    }
                }
                LearnEventKind::Age => {
                    self.stats.fifo_ages.fetch_add(1, Ordering::Relaxed);
                    self.remove_hw_aged(event.key).await?;
                }
            }
        }
        if drained == limit && limit > 0 {
            // FIFO may still hold events; finish draining next pass.
            self.submit_request(MaintRequest::ServiceFifo).await;
        }
        Ok(())
    }

    async fn remove_hw_aged(&self, key: MacEntryKey) -> MatResult<()> {
        let removed = {
            let mut cache = self.l2.lock().await;
            match cache.lookup(&key) {
                Some(index) if cache.entry(index).is_dynamic() => {
                    let entry = cache.entry(index).clone();
                    self.write_invalid(index)?;
                    cache.clear_entry(index);
                    Some((index, entry))
                }
                Some(_) => {
                    debug!("{}: hardware aged non-dynamic {}, ignored", self.id, key);
                    None
                }
                None => None,
            }
        };
        if let Some((index, entry)) = removed {
            self.stats.entries_aged.fetch_add(1, Ordering::Relaxed);
            if self.notify_gate(entry.addr_type) {
                self.batcher
                    .lock()
                    .await
                    .append(MacUpdateRecord {
                        kind: UpdateKind::Aged,
                        reason: UpdateReason::AgeSweep,
                        index,
                        entry,
                    })
                    .await?;
            }
        }
        Ok(())
    }

    async fn begin_purge(&self) -> MatResult<()> {
        let (seq, scope) = match self.purge.begin_next()? {
            Some(next) => next,
            None => return Ok(()),
        };
        if let Err(e) = self.ops.begin_purge(self.id, scope).await {
            // Unwind so the machine does not sit in EXECUTING forever.
            warn!("{}: hardware refused purge {}: {}", self.id, seq, e);
            if let Some((seq, _, handler)) = self.purge.finish()? {
                if let Some(handler) = handler {
                    handler(seq);
                }
            }
            if self.purge.state()? == STATE_PENDING {
                self.submit_request(MaintRequest::HandlePurge).await;
            }
            return Err(e);
        }
        self.stats.purges_started.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn complete_purge(&self) -> MatResult<()> {
        let (seq, scope, handler) = match self.purge.finish()? {
            Some(done) => done,
            None => return Ok(()),
        };
        self.stats.purges_completed.fetch_add(1, Ordering::Relaxed);
        let removed = {
            let mut cache = self.l2.lock().await;
            let removed = purge_matching(&mut cache, scope);
            for record in &removed {
                self.write_invalid(record.index)?;
            }
            removed
        };
        self.stats
            .entries_purged
            .fetch_add(removed.len() as u64, Ordering::Relaxed);
        {
            let mut batcher = self.batcher.lock().await;
            for record in removed {
                if self.notify_gate(record.entry.addr_type) {
                    batcher.append(record).await?;
                }
            }
        }
        if let Some(handler) = handler {
            handler(seq);
        }
        if self.purge.state()? == STATE_PENDING {
            self.submit_request(MaintRequest::HandlePurge).await;
        }
        Ok(())
    }

    async fn run_scan(&self, work: &WorkList, aging_due: bool) -> MatResult<()> {
        let flush_flags = MaintFlags::FLUSH_DYN_ADDR
            | MaintFlags::FLUSH_PORT
            | MaintFlags::FLUSH_FID
            | MaintFlags::FLUSH_FID_PORT;
        let mut records = Vec::new();
        {
            let mut cache = self.l2.lock().await;
            if work.flags.contains(flush_flags) {
                let removed = flush_matching(&mut cache, work);
                self.stats
                    .entries_flushed
                    .fetch_add(removed.len() as u64, Ordering::Relaxed);
                for record in &removed {
                    self.write_invalid(record.index)?;
                }
                records.extend(removed);
            }
            if work.flags.contains(MaintFlags::SYNC_CACHE) {
                self.stats.cache_syncs.fetch_add(1, Ordering::Relaxed);
                let outcome = sync_cache(self.id, self.ops.as_ref(), &mut cache).await?;
                self.stats
                    .entries_reconciled
                    .fetch_add(outcome.reconciled, Ordering::Relaxed);
                for &index in &outcome.rewrite {
                    let entry = cache.entry(index).clone();
                    self.write_entry(index, &entry)?;
                }
                records.extend(outcome.records);
            }
            if aging_due {
                let outcome = age_sweep(&mut cache);
                self.stats
                    .entries_aged
                    .fetch_add(outcome.removed.len() as u64, Ordering::Relaxed);
                for record in &outcome.removed {
                    self.write_invalid(record.index)?;
                }
                records.extend(outcome.removed);
            }
        }
        let mut batcher = self.batcher.lock().await;
        for record in records {
            if self.notify_gate(record.entry.addr_type) {
                batcher.append(record).await?;
            }
        }
        Ok(())
    }

    async fn update_port_acls(&self, work: &WorkList) -> MatResult<()> {
        let counts: Vec<(PortId, u32)> = {
            let cache = self.l2.lock().await;
            work.acl_ports
                .ports()
                .map(|port| {
                    let secure = cache
                        .iter_valid()
                        .filter(|(_, e)| e.port == port && e.addr_type.is_secure())
                        .count() as u32;
                    (port, secure)
                })
                .collect()
        };
        for (port, secure) in counts {
            self.regs
                .write_u32(self.id, self.config.geometry.port_cfg_addr(port), secure)?;
            self.stats.acl_updates.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn submit_request(&self, request: MaintRequest) {
        {
            let mut work = self.maint.lock().await;
            work.submit(&request);
        }
        self.work_notify.notify_one();
    }

    fn validate_request(&self, request: &MaintRequest) -> MatResult<()> {
        let port = match request {
            MaintRequest::FlushPort(port)
            | MaintRequest::FlushFidPort(_, port)
            | MaintRequest::UpdatePortAcl(port) => Some(*port),
            _ => None,
        };
        if let Some(port) = port {
            if port.as_u16() >= self.config.num_ports {
                return Err(MatError::InvalidPort {
                    port,
                    limit: self.config.num_ports,
                });
            }
        }
        Ok(())
    }

    fn aging_due(&self) -> bool {
        if self.config.aging_time_ms == 0 {
            return false;
        }
        let interval = self.config.sweep_interval();
        if interval.is_zero() {
            return false;
        }
        let now = self.clock.now();
        let mut last = self.last_sweep.lock().unwrap_or_else(|e| e.into_inner());
        if now.saturating_duration_since(*last) >= interval {
            *last = now;
            true
        } else {
            false
        }
    }

    fn notify_gate(&self, addr_type: AddressType) -> bool {
        if addr_type.is_static() {
            self.config.notify_on_static_learn
        } else {
            self.config.notify_on_dynamic_learn
        }
    }

    fn check_up(&self) -> MatResult<()> {
        if self.is_up() {
            Ok(())
        } else {
            Err(MatError::SwitchDown(self.id))
        }
    }

    fn write_entry(&self, index: usize, entry: &MacTableEntry) -> MatResult<()> {
        self.regs.write_u32_mult(
            self.id,
            self.config.geometry.entry_addr(index),
            &encode_entry(entry),
        )?;
        Ok(())
    }

    fn write_invalid(&self, index: usize) -> MatResult<()> {
        self.write_entry(index, &MacTableEntry::empty())
    }

    /// Pending work flags, for diagnostics.
    pub async fn pending_flags(&self) -> MaintFlags {
        self.maint.lock().await.pending_flags()
    }

    /// Human-readable state dump.
    pub async fn dump(&self) -> Vec<String> {
        let counts = self.counts().await;
        let mut lines = vec![format!(
            "{}: {} ({} entries: young {} old {} locked {} expired {} moved {})",
            self.id,
            if self.is_up() { "up" } else { "down" },
            counts.valid(),
            counts.young,
            counts.old,
            counts.locked,
            counts.expired,
            counts.moved,
        )];
        lines.push(format!("  pending work: {}", self.pending_flags().await));
        {
            let batcher = self.batcher.lock().await;
            lines.push(format!(
                "  events: {} delivered, {} dropped",
                batcher.delivered(),
                batcher.dropped()
            ));
        }
        match self.purge.dump() {
            Ok(purge_lines) => lines.extend(purge_lines.into_iter().map(|l| format!("  {}", l))),
            Err(e) => lines.push(format!("  purge state unavailable: {}", e)),
        }
        for (name, value) in self.stats.snapshot() {
            if value != 0 {
                lines.push(format!("  {}: {}", name, value));
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maint::ops::{LearnEvent, SimMaintOps};
    use crate::maint::purge::STATE_IDLE;
    use crate::table::TableGeometry;
    use fm10k_hal::{ManualClock, SimRegisterFile};
    use fm10k_types::{Fid, MacAddress};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    struct Harness {
        ctx: Arc<SwitchContext>,
        rx: mpsc::Receiver<MacUpdateEvent>,
        ops: Arc<SimMaintOps>,
        clock: Arc<ManualClock>,
    }

    fn harness(config: MatConfig) -> Harness {
        let regs = Arc::new(SimRegisterFile::new(1, config.geometry.register_words()));
        let ops = Arc::new(SimMaintOps::new(regs.clone(), config.geometry));
        let clock = Arc::new(ManualClock::new());
        let (ctx, rx) = SwitchContext::new(
            SwitchId::new(0),
            config,
            Arc::new(Engine::new()),
            ops.clone(),
            regs,
            clock.clone(),
            Arc::new(Notify::new()),
        )
        .unwrap();
        Harness { ctx, rx, ops, clock }
    }

    // Tests add at most three distinct keys, so four banks always
    // leave a candidate bin free.
    fn small_config() -> MatConfig {
        let mut config = MatConfig {
            geometry: TableGeometry::new(4, 16),
            num_ports: 8,
            ..MatConfig::default()
        };
        config.worker_throttle_ms = 0;
        config
    }

    fn key(byte: u8) -> MacEntryKey {
        MacEntryKey::new(
            MacAddress::new([0x02, 0, 0, 0, 0, byte]),
            Fid::DEFAULT,
        )
    }

    fn port(p: u16) -> PortId {
        PortId::new(p).unwrap()
    }

    // ===== table API =====

    #[tokio::test]
    async fn test_add_updates_cache_and_reports_promptly() {
        let mut h = harness(small_config());
        h.ctx
            .add_address(key(1), port(3), AddressType::DynamicLearned, None)
            .await
            .unwrap();

        let cached = h.ctx.lookup(&key(1)).await.unwrap();
        assert_eq!(cached.port, port(3));

        let event = h.rx.try_recv().expect("update expected");
        assert_eq!(event.records().len(), 1);
        assert_eq!(event.records()[0].kind, UpdateKind::Learned);
        assert_eq!(event.records()[0].reason, UpdateReason::ApiAdd);
    }

    #[tokio::test]
    async fn test_add_rejects_out_of_range_port() {
        let h = harness(small_config());
        let err = h
            .ctx
            .add_address(key(1), port(9), AddressType::DynamicLearned, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MatError::InvalidPort { limit: 8, .. }));
    }

    #[tokio::test]
    async fn test_static_add_is_silent_by_default() {
        let mut h = harness(small_config());
        h.ctx
            .add_address(key(1), port(2), AddressType::Static, None)
            .await
            .unwrap();
        assert!(h.rx.try_recv().is_err());
        assert!(h.ctx.lookup(&key(1)).await.is_some());
    }

    #[tokio::test]
    async fn test_remove_missing_is_addr_not_found() {
        let h = harness(small_config());
        let err = h.ctx.remove_address(key(9)).await.unwrap_err();
        assert!(matches!(err, MatError::AddrNotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove_reports_api_delete() {
        let mut h = harness(small_config());
        h.ctx
            .add_address(key(1), port(1), AddressType::DynamicLearned, None)
            .await
            .unwrap();
        let _ = h.rx.try_recv().unwrap();

        h.ctx.remove_address(key(1)).await.unwrap();
        assert!(h.ctx.lookup(&key(1)).await.is_none());

        let event = h.rx.try_recv().unwrap();
        assert_eq!(event.records()[0].kind, UpdateKind::Aged);
        assert_eq!(event.records()[0].reason, UpdateReason::ApiDelete);
    }

    #[tokio::test]
    async fn test_down_switch_refuses_requests() {
        let h = harness(small_config());
        h.ctx.set_up(false);
        let err = h
            .ctx
            .add_address(key(1), port(1), AddressType::DynamicLearned, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MatError::SwitchDown(_)));
    }

    #[tokio::test]
    async fn test_flush_only_accepts_flush_requests() {
        let h = harness(small_config());
        let err = h.ctx.flush(MaintRequest::ServiceFifo).await.unwrap_err();
        assert!(matches!(err, MatError::InvalidArgument(_)));
        h.ctx.flush(MaintRequest::FlushPort(port(2))).await.unwrap();
        assert!(h
            .ctx
            .pending_flags()
            .await
            .contains(MaintFlags::FLUSH_PORT));
    }

    // ===== service pass =====

    #[tokio::test]
    async fn test_fifo_learns_land_in_one_batch() {
        let mut h = harness(small_config());
        for i in 0..3u8 {
            h.ops.inject_learn(
                h.ctx.id(),
                LearnEvent {
                    kind: LearnEventKind::Learn,
                    key: key(i),
                    port: port(u16::from(i) % 4),
                },
            );
        }
        h.ctx
            .issue_maint_request(MaintRequest::ServiceFifo)
            .await
            .unwrap();
        h.ctx.service().await.unwrap();

        assert_eq!(h.ctx.counts().await.young, 3);
        let event = h.rx.try_recv().unwrap();
        assert_eq!(event.records().len(), 3);
        assert!(event
            .records()
            .iter()
            .all(|r| r.reason == UpdateReason::HwLearn));
        assert_eq!(h.ops.rearm_count(), 1);
        assert_eq!(h.ctx.stats().fifo_learns.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_partial_fifo_drain_resubmits_itself() {
        let mut config = small_config();
        config.fifo_batch_limit = 2;
        let h = harness(config);
        for i in 0..3u8 {
            h.ops.inject_learn(
                h.ctx.id(),
                LearnEvent {
                    kind: LearnEventKind::Learn,
                    key: key(i),
                    port: port(0),
                },
            );
        }
        h.ctx
            .issue_maint_request(MaintRequest::ServiceFifo)
            .await
            .unwrap();
        h.ctx.service().await.unwrap();

        assert_eq!(h.ops.fifo_depth(h.ctx.id()), 1);
        assert!(h
            .ctx
            .pending_flags()
            .await
            .contains(MaintFlags::SERVICE_FIFO));

        h.ctx.service().await.unwrap();
        assert_eq!(h.ops.fifo_depth(h.ctx.id()), 0);
        assert_eq!(h.ctx.counts().await.young, 3);
    }

    #[tokio::test]
    async fn test_hardware_age_removes_dynamic_entries_only() {
        let mut h = harness(small_config());
        h.ctx
            .add_address(key(1), port(1), AddressType::DynamicLearned, None)
            .await
            .unwrap();
        h.ctx
            .add_address(key(2), port(1), AddressType::Static, None)
            .await
            .unwrap();
        let _ = h.rx.try_recv();

        for k in [key(1), key(2)] {
            h.ops.inject_learn(
                h.ctx.id(),
                LearnEvent {
                    kind: LearnEventKind::Age,
                    key: k,
                    port: port(1),
                },
            );
        }
        h.ctx
            .issue_maint_request(MaintRequest::ServiceFifo)
            .await
            .unwrap();
        h.ctx.service().await.unwrap();

        assert!(h.ctx.lookup(&key(1)).await.is_none());
        assert!(h.ctx.lookup(&key(2)).await.is_some());
    }

    #[tokio::test]
    async fn test_flush_port_removes_dynamic_entries() {
        let mut h = harness(small_config());
        h.ctx
            .add_address(key(1), port(2), AddressType::DynamicLearned, None)
            .await
            .unwrap();
        h.ctx
            .add_address(key(2), port(3), AddressType::DynamicLearned, None)
            .await
            .unwrap();
        while h.rx.try_recv().is_ok() {}

        h.ctx.flush(MaintRequest::FlushPort(port(2))).await.unwrap();
        h.ctx.service().await.unwrap();

        assert!(h.ctx.lookup(&key(1)).await.is_none());
        assert!(h.ctx.lookup(&key(2)).await.is_some());
        let event = h.rx.try_recv().unwrap();
        assert_eq!(event.records()[0].reason, UpdateReason::FlushPort);
        assert_eq!(h.ctx.stats().entries_flushed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_aging_walks_young_old_expired_then_removes() {
        let mut config = small_config();
        config.aging_time_ms = 1_000;
        let mut h = harness(config);
        h.ctx
            .add_address(key(1), port(1), AddressType::DynamicLearned, None)
            .await
            .unwrap();
        let _ = h.rx.try_recv();

        for _ in 0..3 {
            h.clock.advance(Duration::from_millis(500));
            h.ctx.service().await.unwrap();
        }

        assert!(h.ctx.lookup(&key(1)).await.is_none());
        let event = h.rx.try_recv().unwrap();
        assert_eq!(event.records().len(), 1);
        assert_eq!(event.records()[0].kind, UpdateKind::Aged);
        assert_eq!(event.records()[0].reason, UpdateReason::AgeSweep);
        assert!(h.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_service_without_elapsed_interval_leaves_entries_alone() {
        let mut config = small_config();
        config.aging_time_ms = 1_000;
        let h = harness(config);
        h.ctx
            .add_address(key(1), port(1), AddressType::DynamicLearned, None)
            .await
            .unwrap();

        h.clock.advance(Duration::from_millis(100));
        h.ctx
            .issue_maint_request(MaintRequest::ServiceFifo)
            .await
            .unwrap();
        h.ctx.service().await.unwrap();

        assert_eq!(h.ctx.counts().await.young, 1);
    }

    #[tokio::test]
    async fn test_purge_runs_to_completion_in_one_pass() {
        let mut h = harness(small_config());
        h.ctx
            .add_address(key(1), port(1), AddressType::DynamicLearned, None)
            .await
            .unwrap();
        h.ctx
            .add_address(key(2), port(1), AddressType::Static, None)
            .await
            .unwrap();
        while h.rx.try_recv().is_ok() {}

        let seen = Arc::new(AtomicU64::new(0));
        let seen_in_handler = seen.clone();
        let seq = h
            .ctx
            .trigger_purge(
                PurgeScope::All,
                Some(Box::new(move |s| {
                    seen_in_handler.store(s, Ordering::SeqCst);
                })),
            )
            .await
            .unwrap();
        h.ctx.service().await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), seq);
        assert!(h.ctx.lookup(&key(1)).await.is_none());
        assert!(h.ctx.lookup(&key(2)).await.is_some());
        assert_eq!(h.ctx.purge().state().unwrap(), STATE_IDLE);
        assert_eq!(h.ctx.stats().purges_completed.load(Ordering::Relaxed), 1);

        let event = h.rx.try_recv().unwrap();
        assert_eq!(event.records()[0].kind, UpdateKind::Purged);
    }

    #[tokio::test]
    async fn test_slow_purge_finishes_on_a_later_pass() {
        let config = small_config();
        let regs = Arc::new(SimRegisterFile::new(1, config.geometry.register_words()));
        let ops =
            Arc::new(SimMaintOps::new(regs.clone(), config.geometry).with_purge_latency(2));
        let clock = Arc::new(ManualClock::new());
        let (ctx, _rx) = SwitchContext::new(
            SwitchId::new(0),
            config,
            Arc::new(Engine::new()),
            ops,
            regs,
            clock,
            Arc::new(Notify::new()),
        )
        .unwrap();

        ctx.trigger_purge(PurgeScope::Fid(Fid::DEFAULT), None)
            .await
            .unwrap();
        ctx.service().await.unwrap();
        assert_eq!(ctx.purge().state().unwrap(), STATE_EXECUTING);

        // No new work arrives, the executing purge alone keeps the pass
        // polling until the hardware reports done.
        ctx.service().await.unwrap();
        assert_eq!(ctx.purge().state().unwrap(), STATE_IDLE);
    }

    #[tokio::test]
    async fn test_busy_maintenance_lock_defers_the_pass() {
        let h = harness(small_config());
        h.ctx
            .issue_maint_request(MaintRequest::ServiceFifo)
            .await
            .unwrap();

        let guard = h.ctx.maint.lock().await;
        h.ctx.service().await.unwrap();
        drop(guard);

        assert_eq!(h.ctx.stats().lock_busy_skips.load(Ordering::Relaxed), 1);
        assert!(h
            .ctx
            .pending_flags()
            .await
            .contains(MaintFlags::SERVICE_FIFO));
    }

    #[tokio::test]
    async fn test_polling_mode_reconciles_from_hardware() {
        let mut config = small_config();
        config.polling_required = true;
        let mut h = harness(config);

        // Hardware learned behind our back.
        let hw_entry = MacTableEntry::new(key(7), port(2), AddressType::DynamicLearned);
        let index = {
            let cache = h.ctx.l2.lock().await;
            cache.candidates(&key(7))[0]
        };
        h.ctx.write_entry(index, &hw_entry).unwrap();

        h.ctx
            .issue_maint_request(MaintRequest::ServiceFifo)
            .await
            .unwrap();
        h.ctx.service().await.unwrap();

        assert!(h.ctx.lookup(&key(7)).await.is_some());
        let event = h.rx.try_recv().unwrap();
        assert_eq!(event.records()[0].reason, UpdateReason::CacheSync);
        assert_eq!(h.ctx.stats().cache_syncs.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_acl_update_writes_secure_port_summary() {
        let mut h = harness(small_config());
        h.ctx
            .add_address(key(1), port(2), AddressType::SecureStatic, None)
            .await
            .unwrap();
        h.ctx
            .add_address(key(2), port(2), AddressType::SecureDynamic, None)
            .await
            .unwrap();
        while h.rx.try_recv().is_ok() {}

        h.ctx
            .issue_maint_request(MaintRequest::UpdatePortAcl(port(2)))
            .await
            .unwrap();
        h.ctx.service().await.unwrap();

        let addr = h.ctx.config.geometry.port_cfg_addr(port(2));
        assert_eq!(h.ctx.regs.read_u32(h.ctx.id(), addr).unwrap(), 2);
        assert_eq!(h.ctx.stats().acl_updates.load(Ordering::Relaxed), 1);
    }
}
