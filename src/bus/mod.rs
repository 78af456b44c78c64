pub mod testbus;

/// Main CPU address type. The 68000 only drives 24 address lines.
pub type Address = u32;

/// Mask for the 68000's 24-bit address bus.
pub const ADDRESS_MASK: Address = 0x00FF_FFFF;

/// A single memory-mapped device, addressed in byte granularity.
///
/// Returns `None` for addresses the device does not claim, so a caller can
/// probe several devices in sequence (`spec.md` §4.1: "a single polymorphic
/// path that probes RAM, then ROM, then devices in that order").
pub trait BusMember<T> {
    fn read(&mut self, addr: T) -> Option<u8>;
    fn write(&mut self, addr: T, val: u8) -> Option<()>;
}

/// Outcome of a word/long access to an address the bus does not back with
/// real storage. `spec.md` §4.1: "Unhandled word/long reads from non-RAM
/// non-ROM space are treated as fatal".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault {
    pub addr: Address,
}
