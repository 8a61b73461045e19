//! Bin selection for MA table inserts.
//!
//! An add must land in one of the key's candidate bins, one per bank.
//! Selection is pure: callers apply the returned choice to the cache and
//! hardware themselves, so the decision can sit inside any locking
//! discipline.

use crate::error::{MatError, MatResult};
use crate::table::cache::MacTableCache;
use crate::table::types::{AddressType, EntryState, MacEntryKey, MacTableEntry};
use fm10k_types::PortId;

/// Where an add request came from.
///
/// Hardware-sourced adds are always dynamic and obey stricter
/// displacement rules than API adds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddSource {
    /// Explicit add through the management API.
    Api,
    /// Learn drained from the hardware FIFO.
    LearnFifo,
}

/// Outcome of bin selection.
#[derive(Debug)]
pub struct BinChoice {
    /// Flat index the entry should be written to.
    pub index: usize,
    /// Live dynamic entry this write removes, for AGE reporting.
    pub evict: Option<MacTableEntry>,
    /// Other bins holding the same key; the caller invalidates them.
    pub duplicates: Vec<usize>,
    /// The key matched both a static and a dynamic entry.
    pub dual_match: bool,
}

/// Picks the bin an add should use.
///
/// Precedence for static adds: matching bin, unused bin, expired bin,
/// then forcible eviction of a live dynamic bin. Dynamic adds stop after
/// the expired step and report the banks as full. A static match refuses
/// dynamic adds outright, and hardware-sourced adds never displace or
/// move secure entries.
pub fn find_best_index(
    cache: &MacTableCache,
    key: &MacEntryKey,
    port: PortId,
    addr_type: AddressType,
    source: AddSource,
) -> MatResult<BinChoice> {
    let mut matches: Vec<usize> = Vec::new();
    let mut first_unused = None;
    let mut first_expired = None;
    let mut first_victim = None;

    for index in cache.candidates(key) {
        let entry = cache.entry(index);
        if !entry.is_valid() {
            if first_unused.is_none() {
                first_unused = Some(index);
            }
            continue;
        }
        if entry.key == *key {
            matches.push(index);
            continue;
        }
        let displaceable = !entry.addr_type.is_static()
            && (source == AddSource::Api || !entry.addr_type.is_secure());
        if !displaceable {
            continue;
        }
        if entry.state == EntryState::Expired {
            if first_expired.is_none() {
                first_expired = Some(index);
            }
        } else if first_victim.is_none() {
            first_victim = Some(index);
        }
    }

    let dual_match = matches.iter().any(|&i| cache.entry(i).addr_type.is_static())
        && matches.iter().any(|&i| !cache.entry(i).addr_type.is_static());

    let chosen = if !matches.is_empty() {
        select_match(cache, &matches, port, addr_type, source, key)?
    } else if let Some(index) = first_unused {
        index
    } else if let Some(index) = first_expired {
        index
    } else if addr_type.is_static() {
        first_victim.ok_or(MatError::BankFull { key: *key })?
    } else {
        return Err(MatError::BankFull { key: *key });
    };

    let old = cache.entry(chosen);
    let evict = if old.is_valid()
        && !old.addr_type.is_static()
        && (old.state == EntryState::Expired || old.key != *key)
    {
        Some(old.clone())
    } else {
        None
    };
    let duplicates = matches.into_iter().filter(|&i| i != chosen).collect();

    Ok(BinChoice {
        index: chosen,
        evict,
        duplicates,
        dual_match,
    })
}

fn select_match(
    cache: &MacTableCache,
    matches: &[usize],
    port: PortId,
    addr_type: AddressType,
    source: AddSource,
    key: &MacEntryKey,
) -> MatResult<usize> {
    if addr_type.is_static() {
        // A lingering dynamic duplicate must not shadow the static entry.
        return Ok(matches
            .iter()
            .copied()
            .find(|&i| cache.entry(i).addr_type.is_static())
            .unwrap_or(matches[0]));
    }
    for &index in matches {
        let entry = cache.entry(index);
        if entry.addr_type.is_static() {
            return Err(MatError::StaticAddrExists { key: *key });
        }
        if source == AddSource::LearnFifo && entry.addr_type.is_secure() && entry.port != port {
            // A learn on another port would move a secure station.
            return Err(MatError::StaticAddrExists { key: *key });
        }
    }
    Ok(matches[0])
}
