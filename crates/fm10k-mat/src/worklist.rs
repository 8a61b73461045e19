//! Deferred maintenance work tracking.
//!
//! Requests against a switch are folded into a pending work list under the
//! maintenance lock and executed later by the worker. Folding is bit and
//! set union, so submitting the same request twice costs nothing.

use fm10k_types::{Fid, PortId, PortMask};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Pending maintenance task bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaintFlags(u32);

impl MaintFlags {
    pub const EMPTY: MaintFlags = MaintFlags(0);
    /// Remove every dynamic entry.
    pub const FLUSH_DYN_ADDR: MaintFlags = MaintFlags(1 << 0);
    /// Remove dynamic entries on the ports in `flush_ports`.
    pub const FLUSH_PORT: MaintFlags = MaintFlags(1 << 1);
    /// Remove dynamic entries in the FIDs in `flush_fids`.
    pub const FLUSH_FID: MaintFlags = MaintFlags(1 << 2);
    /// Remove dynamic entries matching the FID/port pairs in `flush_fid_ports`.
    pub const FLUSH_FID_PORT: MaintFlags = MaintFlags(1 << 3);
    /// Refresh per-port security configuration for `acl_ports`.
    pub const PORT_ACL_UPDATE: MaintFlags = MaintFlags(1 << 4);
    /// Drain the hardware learn FIFO.
    pub const SERVICE_FIFO: MaintFlags = MaintFlags(1 << 5);
    /// Start the next queued purge.
    pub const HANDLE_PURGE: MaintFlags = MaintFlags(1 << 6);
    /// Finish a purge the hardware reported complete.
    pub const PURGE_COMPLETE: MaintFlags = MaintFlags(1 << 7);
    /// Reconcile the software cache against the hardware table.
    pub const SYNC_CACHE: MaintFlags = MaintFlags(1 << 8);

    /// Returns true when any of `other`'s bits are set.
    pub fn contains(&self, other: MaintFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// Sets bits.
    pub fn set(&mut self, other: MaintFlags) {
        self.0 |= other.0;
    }

    /// Clears bits.
    pub fn clear(&mut self, other: MaintFlags) {
        self.0 &= !other.0;
    }

    /// Returns true when no bits are set.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Raw bit image.
    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for MaintFlags {
    type Output = MaintFlags;

    fn bitor(self, rhs: MaintFlags) -> MaintFlags {
        MaintFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for MaintFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        const NAMES: [(MaintFlags, &str); 9] = [
            (MaintFlags::FLUSH_DYN_ADDR, "FLUSH_DYN_ADDR"),
            (MaintFlags::FLUSH_PORT, "FLUSH_PORT"),
            (MaintFlags::FLUSH_FID, "FLUSH_FID"),
            (MaintFlags::FLUSH_FID_PORT, "FLUSH_FID_PORT"),
            (MaintFlags::PORT_ACL_UPDATE, "PORT_ACL_UPDATE"),
            (MaintFlags::SERVICE_FIFO, "SERVICE_FIFO"),
            (MaintFlags::HANDLE_PURGE, "HANDLE_PURGE"),
            (MaintFlags::PURGE_COMPLETE, "PURGE_COMPLETE"),
            (MaintFlags::SYNC_CACHE, "SYNC_CACHE"),
        ];
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// One maintenance request against a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintRequest {
    /// Remove every dynamic entry.
    FlushAllDynamic,
    /// Remove dynamic entries learned on a port.
    FlushPort(PortId),
    /// Remove dynamic entries in a FID.
    FlushFid(Fid),
    /// Remove dynamic entries matching both a FID and a port.
    FlushFidPort(Fid, PortId),
    /// Refresh a port's security configuration.
    UpdatePortAcl(PortId),
    /// Drain the hardware learn FIFO.
    ServiceFifo,
    /// Start the next queued purge.
    HandlePurge,
    /// Finish a purge the hardware reported complete.
    PurgeComplete,
    /// Reconcile the software cache against the hardware table.
    SyncCache,
}

/// Accumulated work for one service pass.
#[derive(Debug, Default)]
pub struct WorkList {
    pub flags: MaintFlags,
    pub flush_ports: PortMask,
    pub acl_ports: PortMask,
    pub flush_fids: BTreeSet<Fid>,
    pub flush_fid_ports: BTreeMap<Fid, PortMask>,
}

impl WorkList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a request into the list.
    pub fn merge(&mut self, request: &MaintRequest) {
        match *request {
            MaintRequest::FlushAllDynamic => self.flags.set(MaintFlags::FLUSH_DYN_ADDR),
            MaintRequest::FlushPort(port) => {
                self.flags.set(MaintFlags::FLUSH_PORT);
                self.flush_ports.set(port);
            }
            MaintRequest::FlushFid(fid) => {
                self.flags.set(MaintFlags::FLUSH_FID);
                self.flush_fids.insert(fid);
            }
            MaintRequest::FlushFidPort(fid, port) => {
                self.flags.set(MaintFlags::FLUSH_FID_PORT);
                self.flush_fid_ports.entry(fid).or_default().set(port);
            }
            MaintRequest::UpdatePortAcl(port) => {
                self.flags.set(MaintFlags::PORT_ACL_UPDATE);
                self.acl_ports.set(port);
            }
            MaintRequest::ServiceFifo => self.flags.set(MaintFlags::SERVICE_FIFO),
            MaintRequest::HandlePurge => self.flags.set(MaintFlags::HANDLE_PURGE),
            MaintRequest::PurgeComplete => self.flags.set(MaintFlags::PURGE_COMPLETE),
            MaintRequest::SyncCache => self.flags.set(MaintFlags::SYNC_CACHE),
        }
    }

    /// Returns true when the list carries no work.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

/// Double-buffered work list.
///
/// Exactly one list accepts submissions at a time. The worker exchanges
/// it for an empty one under the maintenance lock and services the taken
/// list with the lock released, so submissions are never lost to a swap
/// and never serviced twice.
#[derive(Debug, Default)]
pub struct WorkSet {
    pending: WorkList,
}

impl WorkSet {
    /// Creates an empty work set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a request into the pending list.
    pub fn submit(&mut self, request: &MaintRequest) {
        self.pending.merge(request);
    }

    /// Takes the pending list for service, leaving an empty one behind.
    pub fn swap_and_reset(&mut self) -> WorkList {
        std::mem::take(&mut self.pending)
    }

    /// Flags currently pending, for diagnostics.
    pub fn pending_flags(&self) -> MaintFlags {
        self.pending.flags
    }
}
