//! Maintenance machinery: hardware ops, purge lifecycle, table scans.

pub mod ops;
pub mod purge;
pub mod scan;

pub use ops::{LearnEvent, LearnEventKind, MaintOps, SimMaintOps};
pub use purge::{PurgeControl, PurgeHandler, PurgeScope};
pub use scan::{age_sweep, flush_matching, purge_matching, sync_cache, AgeSweepOutcome, SyncOutcome};
