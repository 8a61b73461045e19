//! Table sweeps: flush, aging, purge cleanup, and cache reconciliation.
//!
//! Sweeps mutate only the software cache and report what they removed;
//! the worker owns the matching hardware writes and event delivery.

use crate::error::MatResult;
use crate::events::{MacUpdateRecord, UpdateKind, UpdateReason};
use crate::maint::ops::MaintOps;
use crate::maint::purge::PurgeScope;
use crate::table::{EntryState, MacTableCache};
use crate::worklist::{MaintFlags, WorkList};
use fm10k_hal::SwitchId;

/// Removes dynamic entries matching the work list's flush criteria.
///
/// Static entries always survive. Criteria are checked broadest first,
/// so an entry caught by several reports the broadest reason.
pub fn flush_matching(cache: &mut MacTableCache, work: &WorkList) -> Vec<MacUpdateRecord> {
    let mut removed = Vec::new();
    for index in 0..cache.geometry().entries() {
        let entry = cache.entry(index);
        if !entry.is_dynamic() {
            continue;
        }
        let reason = if work.flags.contains(MaintFlags::FLUSH_DYN_ADDR) {
            Some(UpdateReason::FlushAll)
        } else if work.flags.contains(MaintFlags::FLUSH_PORT)
            && work.flush_ports.contains(entry.port)
        {
            Some(UpdateReason::FlushPort)
        } else if work.flags.contains(MaintFlags::FLUSH_FID)
            && work.flush_fids.contains(&entry.key.fid)
        {
            Some(UpdateReason::FlushFid)
        } else if work.flags.contains(MaintFlags::FLUSH_FID_PORT)
            && work
                .flush_fid_ports
                .get(&entry.key.fid)
                .map_or(false, |mask| mask.contains(entry.port))
        {
            Some(UpdateReason::FlushFidPort)
        } else {
            None
        };
        if let Some(reason) = reason {
            removed.push(MacUpdateRecord {
                kind: UpdateKind::Aged,
                reason,
                index,
                entry: entry.clone(),
            });
            cache.clear_entry(index);
        }
    }
    removed
}

/// Result of one aging sweep.
#[derive(Debug, Default)]
pub struct AgeSweepOutcome {
    /// Entries that moved from young to old.
    pub advanced_young: u64,
    /// Entries that moved from old to expired.
    pub advanced_old: u64,
    /// Expired entries physically removed this sweep.
    pub removed: Vec<MacUpdateRecord>,
}

/// Advances dynamic entries one aging step.
///
/// An entry is reported exactly once, when its bin is actually freed;
/// expiry alone produces no report because an insert may still take the
/// bin (and report the eviction) first.
pub fn age_sweep(cache: &mut MacTableCache) -> AgeSweepOutcome {
    let mut outcome = AgeSweepOutcome::default();
    for index in 0..cache.geometry().entries() {
        let state = cache.entry(index).state;
        if !state.participates_in_aging() {
            continue;
        }
        match state {
            EntryState::Young => {
                cache.entry_mut(index).state = EntryState::Old;
                outcome.advanced_young += 1;
            }
            EntryState::Old => {
                cache.entry_mut(index).state = EntryState::Expired;
                outcome.advanced_old += 1;
            }
            EntryState::Expired => {
                outcome.removed.push(MacUpdateRecord {
                    kind: UpdateKind::Aged,
                    reason: UpdateReason::AgeSweep,
                    index,
                    entry: cache.entry(index).clone(),
                });
                cache.clear_entry(index);
            }
            _ => {}
        }
    }
    outcome
}

/// Removes the dynamic entries a completed purge covered.
pub fn purge_matching(cache: &mut MacTableCache, scope: PurgeScope) -> Vec<MacUpdateRecord> {
    let mut removed = Vec::new();
    for index in 0..cache.geometry().entries() {
        let entry = cache.entry(index);
        if !entry.is_dynamic() || !scope.covers(entry.key.fid) {
            continue;
        }
        removed.push(MacUpdateRecord {
            kind: UpdateKind::Purged,
            reason: UpdateReason::Purge,
            index,
            entry: entry.clone(),
        });
        cache.clear_entry(index);
    }
    removed
}

/// Result of reconciling the cache against the hardware table.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Learns and removals discovered on the hardware side.
    pub records: Vec<MacUpdateRecord>,
    /// Indices whose entries must be written back to the hardware.
    pub rewrite: Vec<usize>,
    /// Entries silently corrected in the cache.
    pub reconciled: u64,
}

/// Reads the full table back and reconciles the cache with it.
///
/// The hardware wins for dynamic entries (scan-based families learn and
/// age without telling us); the cache wins for static entries, which the
/// caller rewrites.
pub async fn sync_cache(
    switch: SwitchId,
    ops: &dyn MaintOps,
    cache: &mut MacTableCache,
) -> MatResult<SyncOutcome> {
    let mut outcome = SyncOutcome::default();
    for index in 0..cache.geometry().entries() {
        let hw = ops.sync_cache_entry(switch, index).await?;
        let cached = cache.entry(index);
        match hw {
            Some(hw_entry) => {
                if !cached.is_valid() {
                    outcome.records.push(MacUpdateRecord {
                        kind: UpdateKind::Learned,
                        reason: UpdateReason::CacheSync,
                        index,
                        entry: hw_entry.clone(),
                    });
                    *cache.entry_mut(index) = hw_entry;
                } else if *cached != hw_entry {
                    if cached.addr_type.is_static() {
                        outcome.rewrite.push(index);
                    } else {
                        *cache.entry_mut(index) = hw_entry;
                    }
                    outcome.reconciled += 1;
                }
            }
            None => {
                if cached.addr_type.is_static() && cached.is_valid() {
                    outcome.rewrite.push(index);
                    outcome.reconciled += 1;
                } else if cached.is_valid() {
                    outcome.records.push(MacUpdateRecord {
                        kind: UpdateKind::Aged,
                        reason: UpdateReason::CacheSync,
                        index,
                        entry: cached.clone(),
                    });
                    cache.clear_entry(index);
                }
            }
        }
    }
    Ok(outcome)
}
