//! FM10000 MAC address table maintenance daemon.
//!
//! The switch learns and ages MAC addresses in hardware; this crate owns
//! the software side of that table: a cache of every entry, the insertion
//! policy, and a worker that services learn FIFOs, flushes, purges, and
//! the aging sweep, reporting every table change on a bounded update
//! channel.
//!
//! # Architecture
//!
//! ```text
//! [API calls] ──┐
//!               ├──> [work list] ──> [worker pass] ──> [RegisterIo] ──> ASIC
//! [learn FIFO] ─┘         │               │
//!                         │               └──> [MacTableCache]
//!                         ↓
//!                  [update events] ──> consumers
//! ```
//!
//! # Key Components
//!
//! - [`daemon::MaintDaemon`]: switch slots plus the worker loop
//! - [`switch::SwitchContext`]: per-switch table API and service pass
//! - [`table`]: cached MA table, bin selection, entry codec
//! - [`maint`]: hardware ops trait, purge lifecycle, scan passes
//! - [`events`]: pooled, batched table change reporting

pub mod config;
pub mod daemon;
pub mod error;
pub mod events;
pub mod maint;
pub mod stats;
pub mod switch;
pub mod table;
pub mod worklist;

pub use config::{DaemonConfig, MatConfig};
pub use daemon::MaintDaemon;
pub use error::{MatError, MatResult};
pub use events::{MacUpdateEvent, MacUpdateRecord, UpdateKind, UpdateReason};
pub use maint::{LearnEvent, LearnEventKind, MaintOps, PurgeScope, SimMaintOps};
pub use stats::MaintStats;
pub use switch::SwitchContext;
pub use table::{AddressType, EntryState, MacEntryKey, MacTableEntry, TableGeometry};
pub use worklist::{MaintFlags, MaintRequest};
