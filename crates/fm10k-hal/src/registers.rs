//! Word-level register access.

use crate::error::{HalError, HalResult};
use crate::types::SwitchId;
use log::trace;
use std::sync::RwLock;

/// Register access as the maintenance layer consumes it.
///
/// Implementations sit in front of the real bus (PCIe BAR, EBI, or a
/// simulation). Calls are synchronous and fallible; multi-word writes
/// land as one burst so paired words (MAC low/high) stay coherent.
pub trait RegisterIo: Send + Sync {
    /// Reads one 32-bit register word.
    fn read_u32(&self, switch: SwitchId, addr: u32) -> HalResult<u32>;

    /// Writes one 32-bit register word.
    fn write_u32(&self, switch: SwitchId, addr: u32, value: u32) -> HalResult<()>;

    /// Writes a run of consecutive 32-bit words starting at `addr`.
    fn write_u32_mult(&self, switch: SwitchId, addr: u32, values: &[u32]) -> HalResult<()>;
}

/// In-memory register file for tests and the simulation daemon.
///
/// One flat word array per switch, bounds checked against the window
/// size it was created with.
pub struct SimRegisterFile {
    words: RwLock<Vec<Vec<u32>>>,
    words_per_switch: u32,
}

impl SimRegisterFile {
    /// Creates a register file for `switches` switches of `words_per_switch`
    /// 32-bit words each, all zeroed.
    pub fn new(switches: u8, words_per_switch: u32) -> Self {
        let words = (0..switches)
            .map(|_| vec![0u32; words_per_switch as usize])
            .collect();
        SimRegisterFile {
            words: RwLock::new(words),
            words_per_switch,
        }
    }

    fn check_range(&self, addr: u32, len: u32) -> HalResult<()> {
        if addr.checked_add(len).is_none() || addr + len > self.words_per_switch {
            return Err(HalError::AddressOutOfRange {
                addr,
                limit: self.words_per_switch,
            });
        }
        Ok(())
    }
}

impl RegisterIo for SimRegisterFile {
    fn read_u32(&self, switch: SwitchId, addr: u32) -> HalResult<u32> {
        self.check_range(addr, 1)?;
        let words = self
            .words
            .read()
            .map_err(|_| HalError::internal("register file lock poisoned"))?;
        let bank = words
            .get(switch.as_usize())
            .ok_or(HalError::DeviceGone { switch })?;
        Ok(bank[addr as usize])
    }

    fn write_u32(&self, switch: SwitchId, addr: u32, value: u32) -> HalResult<()> {
        self.write_u32_mult(switch, addr, std::slice::from_ref(&value))
    }

    fn write_u32_mult(&self, switch: SwitchId, addr: u32, values: &[u32]) -> HalResult<()> {
        self.check_range(addr, values.len() as u32)?;
        let mut words = self
            .words
            .write()
            .map_err(|_| HalError::internal("register file lock poisoned"))?;
        let bank = words
            .get_mut(switch.as_usize())
            .ok_or(HalError::DeviceGone { switch })?;
        bank[addr as usize..addr as usize + values.len()].copy_from_slice(values);
        trace!("{}: wrote {} word(s) at 0x{:08x}", switch, values.len(), addr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_read_write_round_trip() {
        let regs = SimRegisterFile::new(2, 64);
        let sw = SwitchId::new(1);

        regs.write_u32(sw, 10, 0xdead_beef).unwrap();
        assert_eq!(regs.read_u32(sw, 10).unwrap(), 0xdead_beef);
        // Other switch unaffected
        assert_eq!(regs.read_u32(SwitchId::new(0), 10).unwrap(), 0);
    }

    #[test]
    fn test_multi_word_write() {
        let regs = SimRegisterFile::new(1, 64);
        let sw = SwitchId::new(0);

        regs.write_u32_mult(sw, 4, &[1, 2, 3]).unwrap();
        assert_eq!(regs.read_u32(sw, 4).unwrap(), 1);
        assert_eq!(regs.read_u32(sw, 5).unwrap(), 2);
        assert_eq!(regs.read_u32(sw, 6).unwrap(), 3);
    }

    #[test]
    fn test_out_of_range() {
        let regs = SimRegisterFile::new(1, 8);
        let sw = SwitchId::new(0);

        assert!(matches!(
            regs.read_u32(sw, 8),
            Err(HalError::AddressOutOfRange { .. })
        ));
        assert!(matches!(
            regs.write_u32_mult(sw, 6, &[0, 0, 0]),
            Err(HalError::AddressOutOfRange { .. })
        ));
    }

    #[test]
    fn test_missing_switch() {
        let regs = SimRegisterFile::new(1, 8);
        assert!(matches!(
            regs.read_u32(SwitchId::new(3), 0),
            Err(HalError::DeviceGone { .. })
        ));
    }
}
