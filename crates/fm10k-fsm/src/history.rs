//! Bounded per-instance transition history.

use crate::types::TransitionOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionRecord {
    /// Monotonic per-instance sequence number, never reused after eviction.
    pub seq: u64,
    /// The event that fired; `None` for the synthetic start record.
    pub event: Option<usize>,
    /// The state before the transition; `None` for the start record.
    pub from_state: Option<usize>,
    /// The state after the transition.
    pub to_state: usize,
    /// Whether the transition completed or its callback failed.
    pub outcome: TransitionOutcome,
    /// Wall-clock capture time.
    pub timestamp: DateTime<Utc>,
    /// Caller payload, truncated or zero-padded to the instance's record
    /// payload size.
    pub payload: Box<[u8]>,
}

/// Fixed-capacity ring of transition records, oldest evicted first.
pub(crate) struct HistoryRing {
    records: VecDeque<TransitionRecord>,
    capacity: usize,
    payload_size: usize,
    next_seq: u64,
}

impl HistoryRing {
    pub(crate) fn new(capacity: usize, payload_size: usize) -> Self {
        HistoryRing {
            records: VecDeque::with_capacity(capacity),
            capacity,
            payload_size,
            next_seq: 0,
        }
    }

    pub(crate) fn enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Appends a record, evicting the oldest at capacity. A disabled ring
    /// still advances the sequence counter so records keep their firing
    /// order across a later resize.
    pub(crate) fn push(
        &mut self,
        event: Option<usize>,
        from_state: Option<usize>,
        to_state: usize,
        outcome: TransitionOutcome,
        payload: &[u8],
    ) -> TransitionRecord {
        let record = TransitionRecord {
            seq: self.next_seq,
            event,
            from_state,
            to_state,
            outcome,
            timestamp: Utc::now(),
            payload: self.normalize_payload(payload),
        };
        self.next_seq += 1;

        if self.capacity > 0 {
            if self.records.len() == self.capacity {
                self.records.pop_front();
            }
            self.records.push_back(record.clone());
        }
        record
    }

    pub(crate) fn records(&self) -> Vec<TransitionRecord> {
        self.records.iter().cloned().collect()
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }

    /// Changes the capacity, keeping the newest records that fit.
    pub(crate) fn resize(&mut self, new_capacity: usize) {
        while self.records.len() > new_capacity {
            self.records.pop_front();
        }
        self.capacity = new_capacity;
    }

    fn normalize_payload(&self, payload: &[u8]) -> Box<[u8]> {
        let mut normalized = vec![0u8; self.payload_size];
        let n = payload.len().min(self.payload_size);
        normalized[..n].copy_from_slice(&payload[..n]);
        normalized.into_boxed_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn push_n(ring: &mut HistoryRing, n: usize) {
        for i in 0..n {
            ring.push(Some(i), Some(0), 1, TransitionOutcome::Completed, &[]);
        }
    }

    #[test]
    fn test_keeps_newest_at_capacity() {
        let mut ring = HistoryRing::new(3, 0);
        push_n(&mut ring, 5);

        let records = ring.records();
        assert_eq!(records.len(), 3);
        let seqs: Vec<u64> = records.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
    }

    #[test]
    fn test_under_capacity() {
        let mut ring = HistoryRing::new(8, 0);
        push_n(&mut ring, 2);
        assert_eq!(ring.records().len(), 2);
    }

    #[test]
    fn test_disabled_ring_counts_sequence() {
        let mut ring = HistoryRing::new(0, 0);
        assert!(!ring.enabled());
        push_n(&mut ring, 3);
        assert!(ring.records().is_empty());

        ring.resize(4);
        let record = ring.push(Some(9), Some(0), 1, TransitionOutcome::Completed, &[]);
        assert_eq!(record.seq, 3);
    }

    #[test]
    fn test_resize_keeps_newest() {
        let mut ring = HistoryRing::new(5, 0);
        push_n(&mut ring, 5);

        ring.resize(2);
        let seqs: Vec<u64> = ring.records().iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![3, 4]);

        // Growing back does not resurrect evicted records
        ring.resize(5);
        assert_eq!(ring.records().len(), 2);
    }

    #[test]
    fn test_payload_normalization() {
        let mut ring = HistoryRing::new(2, 4);
        let r1 = ring.push(Some(0), Some(0), 1, TransitionOutcome::Completed, &[1, 2]);
        assert_eq!(&*r1.payload, &[1, 2, 0, 0]);

        let r2 = ring.push(
            Some(0),
            Some(0),
            1,
            TransitionOutcome::Completed,
            &[9, 9, 9, 9, 9, 9],
        );
        assert_eq!(&*r2.payload, &[9, 9, 9, 9]);
    }
}
