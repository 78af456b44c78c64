//! Disc service backing the patched `.Sony` driver.
//!
//! `spec.md` §4.6: the ROM patcher (`romtool::patch`) rewrites the `.Sony`
//! driver so it packages its parameter block pointer and writes it to
//! `PV_SONY_ADDR` (`mac::PV_SONY_ADDR`); `mac::bus`'s write hook there reads
//! the parameter block out of RAM and hands a decoded [`DiscCommand`] to
//! this service, which reads/writes the host-owned disc image directly
//! (`spec.md` §3: disc buffers are host-owned, on loan for the emulator's
//! lifetime). Grounded on `original_source/src/main.c`'s `disc_pv_hook`
//! dispatch (`open`/`prime-read`/`prime-write`/`control`/`status`/`close`
//! command tags operating on byte ranges, not fixed sectors).

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Driver command tags, per `spec.md` §4.6. Decoded with `num_traits`'
/// `FromPrimitive`, matching the teacher's own register/command enums
/// (`core/src/mac/scc.rs`, `core/src/mac/iwm.rs`) rather than a hand-rolled
/// match on the raw byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum DiscCmd {
    Open = 0,
    PrimeRead = 1,
    PrimeWrite = 2,
    Control = 3,
    Status = 4,
    Close = 5,
}

/// Control sub-request: the driver stub sets this bit in the flags byte of
/// a `Control` command to ask the core to report the drive as ejected. The
/// original protocol's exact control sub-code table was not distilled into
/// `spec.md`; this is a deliberate simplification recorded in `DESIGN.md`.
pub const CONTROL_EJECT: u8 = 0x01;

/// Parameter block as the patched driver lays it out in RAM: `cmd` (1
/// byte), `drive` (1 byte), `flags` (1 byte), one pad byte, `buffer` (4
/// bytes, big-endian guest address), `count` (4 bytes, big-endian byte
/// count), `position` (4 bytes, big-endian byte offset into the image).
#[derive(Debug, Clone, Copy)]
pub struct DiscCommand {
    pub cmd: u8,
    pub drive: u8,
    pub flags: u8,
    pub buffer: u32,
    pub count: u32,
    pub position: u32,
}

impl DiscCommand {
    pub const WIRE_SIZE: usize = 16;

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::WIRE_SIZE {
            return None;
        }
        Some(Self {
            cmd: bytes[0],
            drive: bytes[1],
            flags: bytes[2],
            buffer: u32::from_be_bytes(bytes[4..8].try_into().ok()?),
            count: u32::from_be_bytes(bytes[8..12].try_into().ok()?),
            position: u32::from_be_bytes(bytes[12..16].try_into().ok()?),
        })
    }
}

/// Status word written back to the parameter block (`spec.md` §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscStatus {
    Ok,
    NoDrive,
    WriteProtected,
    OutOfRange,
    UnknownCommand,
}

impl DiscStatus {
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 0,
            Self::NoDrive => 1,
            Self::WriteProtected => 2,
            Self::OutOfRange => 3,
            Self::UnknownCommand => 4,
        }
    }
}

/// A single inserted disc image, borrowed from the host for the drive's
/// lifetime.
pub struct Drive<'a> {
    image: &'a mut [u8],
    read_only: bool,
}

impl<'a> Drive<'a> {
    pub fn new(image: &'a mut [u8], read_only: bool) -> Self {
        Self { image, read_only }
    }

    fn range(&self, position: u32, count: u32) -> Option<std::ops::Range<usize>> {
        let start = position as usize;
        let end = start.checked_add(count as usize)?;
        (end <= self.image.len()).then_some(start..end)
    }
}

pub struct Disc<'a> {
    drives: [Option<Drive<'a>>; crate::mac::DISC_NUM_DRIVES],
    ejected: [bool; crate::mac::DISC_NUM_DRIVES],
}

impl<'a> Disc<'a> {
    pub fn new() -> Self {
        Self {
            drives: std::array::from_fn(|_| None),
            ejected: [false; crate::mac::DISC_NUM_DRIVES],
        }
    }

    /// Inserts a disc image into `slot`, replacing whatever was there.
    pub fn insert(&mut self, slot: usize, drive: Drive<'a>) {
        if let Some(d) = self.drives.get_mut(slot) {
            *d = Some(drive);
        }
    }

    pub fn is_inserted(&self, slot: usize) -> bool {
        self.drives.get(slot).map(|d| d.is_some()).unwrap_or(false)
    }

    /// Drains and returns the set of drive slots the core reported ejected
    /// since the last call, for the host's `umac_disc_ejected()`-equivalent
    /// notification (`spec.md` §6 "Core -> host").
    pub fn take_ejected(&mut self) -> Vec<usize> {
        let mut out = Vec::new();
        for (slot, flag) in self.ejected.iter_mut().enumerate() {
            if *flag {
                *flag = false;
                out.push(slot);
            }
        }
        out
    }

    /// Executes a decoded command. `transfer` is the guest-RAM byte range
    /// the caller has already resolved from `cmd.buffer`/`cmd.count` (the
    /// bus owns RAM, not this service): for `PrimeRead` this service fills
    /// it from the disc image, for `PrimeWrite` it consumes it into the
    /// image.
    pub fn execute(&mut self, cmd: DiscCommand, transfer: &mut [u8]) -> DiscStatus {
        let Some(tag) = DiscCmd::from_u8(cmd.cmd) else {
            return DiscStatus::UnknownCommand;
        };
        let slot = cmd.drive as usize;

        match tag {
            DiscCmd::Open | DiscCmd::Status => {
                if self.drives.get(slot).map(|d| d.is_some()).unwrap_or(false) {
                    DiscStatus::Ok
                } else {
                    DiscStatus::NoDrive
                }
            }
            DiscCmd::Close => DiscStatus::Ok,
            DiscCmd::Control => {
                if cmd.flags & CONTROL_EJECT != 0 {
                    if let Some(slot_ref) = self.drives.get_mut(slot) {
                        *slot_ref = None;
                    }
                    if let Some(flag) = self.ejected.get_mut(slot) {
                        *flag = true;
                    }
                }
                DiscStatus::Ok
            }
            DiscCmd::PrimeRead => {
                let Some(Some(drive)) = self.drives.get(slot) else {
                    return DiscStatus::NoDrive;
                };
                let Some(range) = drive.range(cmd.position, cmd.count) else {
                    return DiscStatus::OutOfRange;
                };
                transfer[..range.len()].copy_from_slice(&drive.image[range]);
                DiscStatus::Ok
            }
            DiscCmd::PrimeWrite => {
                let Some(Some(drive)) = self.drives.get_mut(slot) else {
                    return DiscStatus::NoDrive;
                };
                if drive.read_only {
                    return DiscStatus::WriteProtected;
                }
                let Some(range) = drive.range(cmd.position, cmd.count) else {
                    return DiscStatus::OutOfRange;
                };
                let len = range.len();
                drive.image[range].copy_from_slice(&transfer[..len]);
                DiscStatus::Ok
            }
        }
    }
}

impl Default for Disc<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(tag: DiscCmd, drive: u8, flags: u8, buffer: u32, count: u32, position: u32) -> DiscCommand {
        DiscCommand { cmd: tag as u8, drive, flags, buffer, count, position }
    }

    #[test]
    fn decodes_command_bytes() {
        let mut bytes = [0u8; DiscCommand::WIRE_SIZE];
        bytes[0] = DiscCmd::PrimeRead as u8;
        bytes[1] = 1;
        bytes[4..8].copy_from_slice(&0x1000u32.to_be_bytes());
        bytes[8..12].copy_from_slice(&512u32.to_be_bytes());
        bytes[12..16].copy_from_slice(&1024u32.to_be_bytes());
        let decoded = DiscCommand::decode(&bytes).unwrap();
        assert_eq!(decoded.buffer, 0x1000);
        assert_eq!(decoded.count, 512);
        assert_eq!(decoded.position, 1024);
    }

    #[test]
    fn prime_read_copies_image_bytes() {
        let mut image = vec![0u8; 2048];
        image[512..516].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let mut disc = Disc::new();
        disc.insert(0, Drive::new(&mut image, false));

        let mut transfer = [0u8; 512];
        let resp = disc.execute(cmd(DiscCmd::PrimeRead, 0, 0, 0, 512, 512), &mut transfer);
        assert_eq!(resp, DiscStatus::Ok);
        assert_eq!(&transfer[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn prime_write_to_read_only_is_refused() {
        let mut image = vec![0u8; 512];
        let mut disc = Disc::new();
        disc.insert(0, Drive::new(&mut image, true));
        let mut transfer = [0xAAu8; 512];
        let resp = disc.execute(cmd(DiscCmd::PrimeWrite, 0, 0, 0, 512, 0), &mut transfer);
        assert_eq!(resp, DiscStatus::WriteProtected);
    }

    #[test]
    fn commands_to_empty_slot_report_no_drive() {
        let mut disc = Disc::new();
        let mut transfer = [0u8; 16];
        let resp = disc.execute(cmd(DiscCmd::PrimeRead, 0, 0, 0, 16, 0), &mut transfer);
        assert_eq!(resp, DiscStatus::NoDrive);
    }

    #[test]
    fn out_of_range_transfer_is_rejected() {
        let mut image = vec![0u8; 512];
        let mut disc = Disc::new();
        disc.insert(0, Drive::new(&mut image, false));
        let mut transfer = [0u8; 512];
        let resp = disc.execute(cmd(DiscCmd::PrimeRead, 0, 0, 0, 512, 256), &mut transfer);
        assert_eq!(resp, DiscStatus::OutOfRange);
    }

    #[test]
    fn control_eject_flag_removes_drive_and_reports_ejection() {
        let mut image = vec![0u8; 512];
        let mut disc = Disc::new();
        disc.insert(0, Drive::new(&mut image, false));
        let resp = disc.execute(cmd(DiscCmd::Control, 0, CONTROL_EJECT, 0, 0, 0), &mut []);
        assert_eq!(resp, DiscStatus::Ok);
        assert!(!disc.is_inserted(0));
        assert_eq!(disc.take_ejected(), vec![0]);
        assert!(disc.take_ejected().is_empty());
    }
}
