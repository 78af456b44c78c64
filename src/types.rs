use proc_bitfield::bitfield;

pub type Byte = u8;
pub type Word = u16;
pub type Long = u32;

bitfield! {
    /// General purpose 16-bit field, addressable as two bytes.
    ///
    /// Used for the VIA's `TxC-L`/`TxC-H` and `TxL-L`/`TxL-H` register pairs,
    /// which the hardware (and the OS driver) addresses byte-at-a-time but
    /// which behave as a single 16-bit counter or latch.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Field16(pub u16): Debug, FromRaw, IntoRaw, DerefRaw {
        pub msb: u8 @ 8..16,
        pub lsb: u8 @ 0..8,
    }
}
