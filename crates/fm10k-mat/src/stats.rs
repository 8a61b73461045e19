//! Maintenance counters.

use crate::worklist::MaintFlags;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free per-switch maintenance counters.
///
/// Counters only ever increase. Readers see a consistent-enough snapshot
/// for diagnostics; no counter participates in control decisions.
#[derive(Debug, Default)]
pub struct MaintStats {
    /// Service passes that acquired the maintenance lock.
    pub passes: AtomicU64,
    /// Service passes skipped because the lock was busy.
    pub lock_busy_skips: AtomicU64,
    /// Passes that drained the learn FIFO.
    pub fifo_services: AtomicU64,
    /// Learn events consumed from the FIFO.
    pub fifo_learns: AtomicU64,
    /// Age events consumed from the FIFO.
    pub fifo_ages: AtomicU64,
    /// Purges started on the hardware.
    pub purges_started: AtomicU64,
    /// Purges the hardware finished.
    pub purges_completed: AtomicU64,
    /// Entries written by adds and learns.
    pub entries_learned: AtomicU64,
    /// Entries removed one at a time: aging, eviction, API delete.
    pub entries_aged: AtomicU64,
    /// Entries removed by flush requests.
    pub entries_flushed: AtomicU64,
    /// Entries removed by purges.
    pub entries_purged: AtomicU64,
    /// Cache reconciliation sweeps.
    pub cache_syncs: AtomicU64,
    /// Entries corrected during reconciliation.
    pub entries_reconciled: AtomicU64,
    /// Duplicate bins invalidated during inserts.
    pub duplicates_invalidated: AtomicU64,
    /// Keys found as both a static and a dynamic entry.
    pub dual_match_anomalies: AtomicU64,
    /// Port security configuration refreshes.
    pub acl_updates: AtomicU64,
    /// Dispatches per task class.
    pub dispatch_fifo: AtomicU64,
    pub dispatch_purge: AtomicU64,
    pub dispatch_purge_complete: AtomicU64,
    pub dispatch_scan: AtomicU64,
    pub dispatch_acl: AtomicU64,
}

impl MaintStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts the task classes present in a serviced work list.
    pub fn count_dispatch(&self, flags: MaintFlags) {
        if flags.contains(MaintFlags::SERVICE_FIFO) {
            self.dispatch_fifo.fetch_add(1, Ordering::Relaxed);
        }
        if flags.contains(MaintFlags::HANDLE_PURGE) {
            self.dispatch_purge.fetch_add(1, Ordering::Relaxed);
        }
        if flags.contains(MaintFlags::PURGE_COMPLETE) {
            self.dispatch_purge_complete.fetch_add(1, Ordering::Relaxed);
        }
        if flags.contains(
            MaintFlags::FLUSH_DYN_ADDR
                | MaintFlags::FLUSH_PORT
                | MaintFlags::FLUSH_FID
                | MaintFlags::FLUSH_FID_PORT
                | MaintFlags::SYNC_CACHE,
        ) {
            self.dispatch_scan.fetch_add(1, Ordering::Relaxed);
        }
        if flags.contains(MaintFlags::PORT_ACL_UPDATE) {
            self.dispatch_acl.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot of all counters, name and value pairs.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        let read = |c: &AtomicU64| c.load(Ordering::Relaxed);
        vec![
            ("passes", read(&self.passes)),
            ("lock_busy_skips", read(&self.lock_busy_skips)),
            ("fifo_services", read(&self.fifo_services)),
            ("fifo_learns", read(&self.fifo_learns)),
            ("fifo_ages", read(&self.fifo_ages)),
            ("purges_started", read(&self.purges_started)),
            ("purges_completed", read(&self.purges_completed)),
            ("entries_learned", read(&self.entries_learned)),
            ("entries_aged", read(&self.entries_aged)),
            ("entries_flushed", read(&self.entries_flushed)),
            ("entries_purged", read(&self.entries_purged)),
            ("cache_syncs", read(&self.cache_syncs)),
            ("entries_reconciled", read(&self.entries_reconciled)),
            ("duplicates_invalidated", read(&self.duplicates_invalidated)),
            ("dual_match_anomalies", read(&self.dual_match_anomalies)),
            ("acl_updates", read(&self.acl_updates)),
            ("dispatch_fifo", read(&self.dispatch_fifo)),
            ("dispatch_purge", read(&self.dispatch_purge)),
            ("dispatch_purge_complete", read(&self.dispatch_purge_complete)),
            ("dispatch_scan", read(&self.dispatch_scan)),
            ("dispatch_acl", read(&self.dispatch_acl)),
        ]
    }
}
