//! Switch-family maintenance capabilities.
//!
//! Families differ in how they learn and purge. The worker talks to a
//! `MaintOps` implementation and treats `NotSupported` as "this family
//! does not do that", falling back to scan-based behavior where one
//! exists.

use crate::error::{MatError, MatResult};
use crate::maint::purge::PurgeScope;
use crate::table::{decode_entry, MacEntryKey, MacTableEntry, TableGeometry};
use async_trait::async_trait;
use fm10k_hal::{RegisterIo, SwitchId};
use fm10k_types::PortId;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// What the hardware observed about a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnEventKind {
    /// Station seen; learn or refresh the entry.
    Learn,
    /// Hardware aged the entry out on its own.
    Age,
}

/// One record drained from the hardware learn FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LearnEvent {
    pub kind: LearnEventKind,
    pub key: MacEntryKey,
    pub port: PortId,
}

/// Family-specific maintenance operations.
///
/// Every method defaults to `NotSupported` so a family implements only
/// what its silicon has.
#[async_trait]
pub trait MaintOps: Send + Sync {
    /// Drains up to `limit` events from the learn FIFO.
    async fn service_learn_fifo(
        &self,
        switch: SwitchId,
        limit: usize,
    ) -> MatResult<Vec<LearnEvent>> {
        let _ = (switch, limit);
        Err(MatError::NotSupported)
    }

    /// Starts a bulk purge on the hardware.
    async fn begin_purge(&self, switch: SwitchId, scope: PurgeScope) -> MatResult<()> {
        let _ = (switch, scope);
        Err(MatError::NotSupported)
    }

    /// Returns true once the running purge has finished.
    async fn poll_purge_complete(&self, switch: SwitchId) -> MatResult<bool> {
        let _ = switch;
        Err(MatError::NotSupported)
    }

    /// Reads one table entry back from the hardware.
    ///
    /// `None` means the bin is free on the hardware side.
    async fn sync_cache_entry(
        &self,
        switch: SwitchId,
        index: usize,
    ) -> MatResult<Option<MacTableEntry>> {
        let _ = (switch, index);
        Err(MatError::NotSupported)
    }

    /// Re-arms the learn FIFO overflow interrupt after a service pass.
    async fn re_enable_fifo_interrupt(&self, switch: SwitchId) -> MatResult<()> {
        let _ = switch;
        Err(MatError::NotSupported)
    }
}

/// Simulated maintenance backend over an in-memory register file.
///
/// Tests and `matmaintd`'s sim mode inject learns and drive purges
/// through this.
pub struct SimMaintOps {
    regs: Arc<dyn RegisterIo>,
    geometry: TableGeometry,
    fifos: Mutex<HashMap<SwitchId, VecDeque<LearnEvent>>>,
    purges: Mutex<HashMap<SwitchId, u32>>,
    /// Polls a purge takes before reporting complete.
    purge_latency: u32,
    rearms: AtomicU64,
}

impl SimMaintOps {
    /// Creates a sim backend reading entries from `regs`.
    pub fn new(regs: Arc<dyn RegisterIo>, geometry: TableGeometry) -> Self {
        SimMaintOps {
            regs,
            geometry,
            fifos: Mutex::new(HashMap::new()),
            purges: Mutex::new(HashMap::new()),
            purge_latency: 1,
            rearms: AtomicU64::new(0),
        }
    }

    /// Sets how many polls a purge takes to complete.
    pub fn with_purge_latency(mut self, polls: u32) -> Self {
        self.purge_latency = polls;
        self
    }

    /// Queues a learn event as if the hardware pushed it.
    pub fn inject_learn(&self, switch: SwitchId, event: LearnEvent) {
        let mut fifos = self.fifos.lock().unwrap_or_else(|e| e.into_inner());
        fifos.entry(switch).or_default().push_back(event);
    }

    /// Learn events still queued for a switch.
    pub fn fifo_depth(&self, switch: SwitchId) -> usize {
        let fifos = self.fifos.lock().unwrap_or_else(|e| e.into_inner());
        fifos.get(&switch).map_or(0, |q| q.len())
    }

    /// Times the overflow interrupt was re-armed.
    pub fn rearm_count(&self) -> u64 {
        self.rearms.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MaintOps for SimMaintOps {
    async fn service_learn_fifo(
        &self,
        switch: SwitchId,
        limit: usize,
    ) -> MatResult<Vec<LearnEvent>> {
        let mut fifos = self.fifos.lock().unwrap_or_else(|e| e.into_inner());
        let queue = match fifos.get_mut(&switch) {
            Some(queue) => queue,
            None => return Ok(Vec::new()),
        };
        let take = queue.len().min(limit);
        Ok(queue.drain(..take).collect())
    }

    async fn begin_purge(&self, switch: SwitchId, scope: PurgeScope) -> MatResult<()> {
        let mut purges = self.purges.lock().unwrap_or_else(|e| e.into_inner());
        if purges.contains_key(&switch) {
            return Err(MatError::internal(format!(
                "purge already running on {}",
                switch
            )));
        }
        log::debug!("{}: sim purge started, scope {:?}", switch, scope);
        purges.insert(switch, self.purge_latency);
        Ok(())
    }

    async fn poll_purge_complete(&self, switch: SwitchId) -> MatResult<bool> {
        let mut purges = self.purges.lock().unwrap_or_else(|e| e.into_inner());
        let remaining = match purges.get_mut(&switch) {
            Some(remaining) => remaining,
            None => return Err(MatError::internal(format!("no purge running on {}", switch))),
        };
        if *remaining > 0 {
            *remaining -= 1;
        }
        if *remaining == 0 {
            purges.remove(&switch);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn sync_cache_entry(
        &self,
        switch: SwitchId,
        index: usize,
    ) -> MatResult<Option<MacTableEntry>> {
        let base = self.geometry.entry_addr(index);
        let mut words = [0u32; TableGeometry::WORDS_PER_ENTRY as usize];
        for (offset, word) in words.iter_mut().enumerate() {
            *word = self.regs.read_u32(switch, base + offset as u32)?;
        }
        let entry = decode_entry(&words)?;
        Ok(entry.is_valid().then_some(entry))
    }

    async fn re_enable_fifo_interrupt(&self, switch: SwitchId) -> MatResult<()> {
        let _ = switch;
        self.rearms.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{encode_entry, AddressType};
    use fm10k_hal::SimRegisterFile;
    use fm10k_types::{Fid, MacAddress};
    use pretty_assertions::assert_eq;

    fn learn(byte: u8, port: u16) -> LearnEvent {
        LearnEvent {
            kind: LearnEventKind::Learn,
            key: MacEntryKey::new(
                MacAddress::new([0x52, 0x54, 0x00, 0x00, 0x00, byte]),
                Fid::DEFAULT,
            ),
            port: PortId::new(port).unwrap(),
        }
    }

    fn sim() -> SimMaintOps {
        let geometry = TableGeometry::new(2, 8);
        let regs = Arc::new(SimRegisterFile::new(1, geometry.register_words()));
        SimMaintOps::new(regs, geometry)
    }

    struct Bare;
    impl MaintOps for Bare {}

    #[tokio::test]
    async fn test_default_methods_report_unsupported() {
        let ops = Bare;
        let err = ops.service_learn_fifo(SwitchId::new(0), 8).await.unwrap_err();
        assert!(matches!(err, MatError::NotSupported));
        let err = ops.poll_purge_complete(SwitchId::new(0)).await.unwrap_err();
        assert!(matches!(err, MatError::NotSupported));
    }

    #[tokio::test]
    async fn test_fifo_drain_respects_limit() {
        let ops = sim();
        let sw = SwitchId::new(0);
        for byte in 0..5 {
            ops.inject_learn(sw, learn(byte, 1));
        }
        let drained = ops.service_learn_fifo(sw, 3).await.unwrap();
        assert_eq!(drained.len(), 3);
        assert_eq!(ops.fifo_depth(sw), 2);
        let drained = ops.service_learn_fifo(sw, 10).await.unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(ops.fifo_depth(sw), 0);
    }

    #[tokio::test]
    async fn test_purge_takes_configured_polls() {
        let ops = sim().with_purge_latency(2);
        let sw = SwitchId::new(0);
        ops.begin_purge(sw, PurgeScope::All).await.unwrap();
        assert!(!ops.poll_purge_complete(sw).await.unwrap());
        assert!(ops.poll_purge_complete(sw).await.unwrap());
        // Finished purges are forgotten.
        assert!(ops.poll_purge_complete(sw).await.is_err());
    }

    #[tokio::test]
    async fn test_double_purge_rejected() {
        let ops = sim();
        let sw = SwitchId::new(0);
        ops.begin_purge(sw, PurgeScope::All).await.unwrap();
        assert!(ops.begin_purge(sw, PurgeScope::All).await.is_err());
    }

    #[tokio::test]
    async fn test_sync_cache_entry_reads_registers() {
        let geometry = TableGeometry::new(2, 8);
        let regs = Arc::new(SimRegisterFile::new(1, geometry.register_words()));
        let ops = SimMaintOps::new(regs.clone(), geometry);
        let sw = SwitchId::new(0);

        assert_eq!(ops.sync_cache_entry(sw, 3).await.unwrap(), None);

        let entry = MacTableEntry::new(
            MacEntryKey::new(MacAddress::BROADCAST, Fid::DEFAULT),
            PortId::new(2).unwrap(),
            AddressType::DynamicLearned,
        );
        regs.write_u32_mult(sw, geometry.entry_addr(3), &encode_entry(&entry))
            .unwrap();
        assert_eq!(ops.sync_cache_entry(sw, 3).await.unwrap(), Some(entry));
    }
}
