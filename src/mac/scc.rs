//! Zilog 8530 SCC stub.
//!
//! `spec.md` §4.3 scopes real serial I/O out: the OS driver only needs to
//! see a chip that answers register reads/writes and never raises an
//! interrupt, so boot and polling code paths don't stall waiting on a port
//! nothing is plugged into. Trimmed from `core/src/mac/scc.rs`'s full
//! two-channel implementation (tx/rx queues, `WrReg`/`RdReg` bitfields) down
//! to the register pointer/data latch dance the ROM's `.AOut`/`.BOut`
//! drivers perform during their reset handshake.

use crate::bus::{Address, BusMember};

/// Write-register 9, the master interrupt/reset control register. Its
/// "force hardware reset" bits are the only ones the ROM checks after
/// writing them.
const WR9_HARDWARE_RESET: u8 = 0xC0;

/// RR0 bit 2 ("Tx Buffer Empty") fabricated permanently set, bit 0 ("Rx
/// Character Available") permanently clear (`spec.md` §4.3: "a fabricated
/// RR0 indicating transmit buffer empty, no receive characters").
const RR0_FABRICATED: u8 = 0x04;

/// WR0's top three bits select a command; `0b101` is "Reset Highest IUS",
/// the interrupt-acknowledge the OS's SCC interrupt handler issues
/// (`spec.md` §4.3: "Writes to WR register index 0 that carry interrupt-clear
/// commands clear the SCC interrupt line").
const WR0_CMD_RESET_HIGHEST_IUS: u8 = 0b101 << 3;

#[derive(Default)]
pub struct Scc {
    /// Last value latched into the register pointer (`WR0`) for each
    /// channel; determines which register the next data access targets.
    ptr: [u8; 2],
    /// Shadow registers, indexed by channel then register number. Good
    /// enough for the ROM's read-after-write self tests. Index 0 is unused
    /// for reads (RR0/RR3 are fabricated, not shadowed) but still tracks
    /// whatever WR0 command byte was last written.
    regs: [[u8; 16]; 2],
    /// Per-channel received-data latch, separate from the WR0/RR0 shadow
    /// slot so a data byte round-trip can never be misread back as status.
    data: [u8; 2],
    irq_pending: bool,
}

impl Scc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// `spec.md` §4.3: "The SCC's sole required behaviour is to not loop the
    /// OS in interrupt service" -- this stub never raises the line on its
    /// own, but tracks the OS having cleared it so `mac::bus` can assert and
    /// then immediately see it cleared, matching a real ack cycle.
    pub fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    fn channel(addr: Address) -> usize {
        // Channel B control/data sit at the low pair of addresses, channel A
        // at the high pair (`original_source/src/main.c`'s `0x9FFFF8..=0xBFFFFF`
        // dispatch).
        usize::from(addr & 0x2 != 0)
    }
}

impl BusMember<Address> for Scc {
    fn read(&mut self, addr: Address) -> Option<u8> {
        let ch = Self::channel(addr);
        let is_data = addr & 0x1 != 0;
        if is_data {
            Some(self.data[ch])
        } else {
            let reg = self.ptr[ch] as usize & 0xF;
            self.ptr[ch] = 0;
            Some(match reg {
                0 => RR0_FABRICATED,
                3 => 0,
                _ => self.regs[ch][reg],
            })
        }
    }

    fn write(&mut self, addr: Address, val: u8) -> Option<()> {
        let ch = Self::channel(addr);
        let is_data = addr & 0x1 != 0;
        if is_data {
            self.data[ch] = val;
        } else if self.ptr[ch] == 0 {
            let reg = val as usize & 0x7;
            if val & WR0_CMD_RESET_HIGHEST_IUS == WR0_CMD_RESET_HIGHEST_IUS {
                self.irq_pending = false;
            }
            if reg != 0 {
                self.ptr[ch] = val;
            }
        } else {
            let reg = self.ptr[ch] as usize & 0xF;
            self.regs[ch][reg] = val;
            if reg == 9 && val & WR9_HARDWARE_RESET == WR9_HARDWARE_RESET {
                self.regs[ch] = [0; 16];
                self.irq_pending = false;
            }
            self.ptr[ch] = 0;
        }
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_raises_irq_on_its_own() {
        let scc = Scc::new();
        assert!(!scc.irq_pending());
    }

    // Channel A control port: bit1=0 selects the channel, bit0=0 selects
    // control over data.
    const CTRL_A: Address = 0xBFFFF8;
    const DATA_A: Address = 0xBFFFF9;

    #[test]
    fn control_read_after_pointer_reset_is_fabricated_rr0() {
        let mut scc = Scc::new();
        scc.write(CTRL_A, 4).unwrap(); // select WR4 on channel A
        scc.write(CTRL_A, 0x44).unwrap(); // write value into WR4, pointer resets
        // Pointer is back at 0, so the next control read sees fabricated
        // RR0, never the just-written WR4 shadow value.
        assert_eq!(scc.read(CTRL_A - 0x200000).unwrap(), 0x04);
        scc.write(CTRL_A, 4).unwrap();
        assert_eq!(scc.regs[0][4], 0x44);
    }

    #[test]
    fn rr3_reads_as_zero() {
        let mut scc = Scc::new();
        scc.write(CTRL_A, 3).unwrap(); // select RR3 on channel A
        assert_eq!(scc.read(CTRL_A - 0x200000).unwrap(), 0);
    }

    #[test]
    fn reset_highest_ius_clears_pending_interrupt() {
        let mut scc = Scc::new();
        scc.irq_pending = true;
        scc.write(CTRL_A, 0b101 << 3).unwrap();
        assert!(!scc.irq_pending());
    }

    #[test]
    fn data_register_round_trips_independent_of_rr0() {
        let mut scc = Scc::new();
        scc.write(DATA_A, 0x5A).unwrap();
        assert_eq!(scc.read(DATA_A - 0x200000).unwrap(), 0x5A);
    }
}
