//! Integrated Woz Machine register stub.
//!
//! `spec.md` §9 resolves the IWM as a register-level stub rather than a real
//! floppy controller: disc access goes through the patched `.Sony` driver
//! and the `mac::disc` service instead (`spec.md` §4.6), so the IWM only
//! needs to answer the handful of register reads the ROM's disk-probe code
//! performs before it gives up and falls back to RAM disk / no disk.
//! Grounded on `original_source/src/main.c`'s `iwm_read`/`iwm_write`, which
//! special-case register 8 (returns 0xFF, "no drive present") and register
//! 14 (returns 0x1F) and otherwise echo back the last latched write.

use crate::bus::{Address, BusMember};

pub struct Iwm {
    latch: u8,
}

impl Iwm {
    pub fn new() -> Self {
        Self { latch: 0 }
    }

    pub fn reset(&mut self) {
        self.latch = 0;
    }

    fn register(addr: Address) -> u8 {
        ((addr >> 9) & 0xF) as u8
    }
}

impl Default for Iwm {
    fn default() -> Self {
        Self::new()
    }
}

impl BusMember<Address> for Iwm {
    fn read(&mut self, addr: Address) -> Option<u8> {
        Some(match Self::register(addr) {
            8 => 0xFF,
            14 => 0x1F,
            _ => self.latch,
        })
    }

    fn write(&mut self, _addr: Address, val: u8) -> Option<()> {
        self.latch = val;
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_8_reports_no_drive() {
        let mut iwm = Iwm::new();
        assert_eq!(iwm.read(8 << 9).unwrap(), 0xFF);
    }

    #[test]
    fn register_14_reports_fixed_status() {
        let mut iwm = Iwm::new();
        assert_eq!(iwm.read(14 << 9).unwrap(), 0x1F);
    }

    #[test]
    fn other_registers_echo_last_write() {
        let mut iwm = Iwm::new();
        iwm.write(3 << 9, 0x5A).unwrap();
        assert_eq!(iwm.read(3 << 9).unwrap(), 0x5A);
    }
}
