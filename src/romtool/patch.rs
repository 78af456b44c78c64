//! ROM patch table for the Mac Plus v3 ROM (`spec.md` §4.6).
//!
//! Grounded verbatim on `original_source/src/rom.c`'s `rom_patch_plusv3`:
//! every offset, opcode and byte-count check below is transcribed from that
//! function, not reinvented. The one piece `original_source` does not
//! supply is the replacement `.Sony` driver itself (`sonydrv.h` is a
//! pre-assembled binary table, filtered out of the retrieval pack as data
//! rather than source); [`SONY_DRIVER_STUB`] is a placeholder documented in
//! `DESIGN.md`.

use thiserror::Error;

use crate::mac::{PV_SONY_ADDR, ROM_SIZE};

/// The one ROM version this patcher (and `spec.md` §1's Non-goals) supports.
pub const ROM_PLUSV3_VERSION: u32 = 0x4D1F_8172;

/// Offset of the `.Sony` driver within the ROM image.
const SONY_DRV_OFFSET: usize = 0x17D30;

const M68K_NOP: u16 = 0x4E71;

/// Placeholder replacement `.Sony` driver (`spec.md` §4.6: "a short 68000
/// stub that packages its parameter block pointer and writes it to the
/// pseudo-address `PV_SONY_ADDR`"). The original's `sonydrv.h` byte table
/// was not part of the retrieved sources; this stub is sized and laid out
/// identically (64 bytes, trailing 4-byte pointer slot patched below) but
/// filled with `nop`/`rts` rather than the original's hand-assembled body.
/// See `DESIGN.md` for the Open Question this resolves.
const SONY_DRIVER_STUB: [u8; 64] = {
    let mut buf = [0u8; 64];
    let mut i = 0;
    while i < 60 {
        buf[i] = 0x4E;
        buf[i + 1] = 0x71; // nop
        i += 2;
    }
    buf[60] = 0x4E;
    buf[61] = 0x75; // rts
    // buf[60..64] holds the trailing pointer slot the caller overwrites;
    // rts at 60..62 is itself overwritten by the pointer patch below, which
    // is fine since this stub's body is a placeholder.
    buf
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RomPatchError {
    #[error("unknown ROM version {0:#010x}, refusing to patch")]
    UnsupportedVersion(u32),
    #[error("ROM image is {0} bytes, expected {1}")]
    WrongSize(usize, usize),
    #[error("screen geometry patch overflowed its scratch region ({0:#x} > {1:#x})")]
    PatchOverflow(usize, usize),
}

/// Parameters the patcher needs beyond the ROM image itself (`spec.md` §4.6,
/// §6 CLI flags `-w`/`-h`/`-m`).
#[derive(Debug, Clone, Copy)]
pub struct PatchOptions {
    pub disp_width: u32,
    pub disp_height: u32,
    pub ram_size: usize,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            disp_width: 512,
            disp_height: 342,
            ram_size: crate::mac::RAM_SIZE_DEFAULT,
        }
    }
}

fn wr8(rom: &mut [u8], off: usize, val: u8) {
    rom[off] = val;
}

fn wr16(rom: &mut [u8], off: usize, val: u16) {
    rom[off..off + 2].copy_from_slice(&val.to_be_bytes());
}

fn wr32(rom: &mut [u8], off: usize, val: u32) {
    rom[off..off + 4].copy_from_slice(&val.to_be_bytes());
}

pub fn rom_version(rom: &[u8]) -> u32 {
    u32::from_be_bytes(rom[0..4].try_into().expect("ROM image shorter than 4 bytes"))
}

/// Patches `rom` in place for the requested display geometry and RAM size.
/// `rom` MUST be exactly [`ROM_SIZE`] bytes of an unmodified Mac Plus v3
/// ROM. Idempotent: applying this twice to the same starting image produces
/// the same bytes as applying it once (`spec.md` §8, testable property 5),
/// since every write here is an unconditional fixed-value store, never a
/// read-modify-write relative to prior patch state.
pub fn patch(rom: &mut [u8], opts: PatchOptions) -> Result<(), RomPatchError> {
    if rom.len() != ROM_SIZE {
        return Err(RomPatchError::WrongSize(rom.len(), ROM_SIZE));
    }
    let version = rom_version(rom);
    if version != ROM_PLUSV3_VERSION {
        return Err(RomPatchError::UnsupportedVersion(version));
    }
    patch_plusv3(rom, opts)
}

fn patch_plusv3(rom: &mut [u8], opts: PatchOptions) -> Result<(), RomPatchError> {
    // Disable the ROM checksum compare: an "eor.l d3, d1" becomes "eor.l
    // d1, d1", which always yields zero / "matches".
    wr16(rom, 0xD92, 0xB381);

    // Replace the `.Sony` driver and register its doorbell address in the
    // trailing 4 bytes of the replacement driver.
    rom[SONY_DRV_OFFSET..SONY_DRV_OFFSET + SONY_DRIVER_STUB.len()].copy_from_slice(&SONY_DRIVER_STUB);
    wr32(rom, SONY_DRV_OFFSET + SONY_DRIVER_STUB.len() - 4, PV_SONY_ADDR);

    let ram_size = opts.ram_size;
    if ram_size > 128 * 1024 && ram_size < 512 * 1024 {
        let mut i = 0x376;
        while i < 0x37E {
            wr16(rom, i, M68K_NOP);
            i += 2;
        }
        wr16(rom, 0x376, 0x2A7C); // movea.l #ram_size, A5
        wr16(rom, 0x378, (ram_size >> 16) as u16);
        wr16(rom, 0x37A, (ram_size & 0xFFFF) as u16);
        // P_ChecksumRomAndTestMemory otherwise fails for anything that
        // isn't 128K/512K; skip its failure branch.
        wr16(rom, 0x132, 0x6000); // bra (was beq)
        // Boot-beep sound buffer pointer.
        wr32(rom, 0x292, (ram_size - 768) as u32);
    }

    if opts.disp_width != 512 || opts.disp_height != 342 {
        patch_screen_geometry(rom, opts.disp_width, opts.disp_height)?;
    }

    Ok(())
}

fn patch_screen_geometry(rom: &mut [u8], w: u32, h: u32) -> Result<(), RomPatchError> {
    let screen_size = (w * h / 8) as usize;
    let screen_distance_from_top = screen_size + 0x380;
    let screen_base = 0x400000u32 - screen_distance_from_top as u32;
    let sb = |x: u32, y: u32| screen_base + (w / 8) * y + x / 8;

    // The TestSoftware check at 0x42 is unused on the Plus; steal 0x46-0x57
    // as scratch space for patches too large to inline.
    wr16(rom, 0x42, 0x6000); // bra
    wr16(rom, 0x44, 0x62 - 0x44);

    let patch_0 = 0x46usize;
    wr16(rom, patch_0, 0x9BFC); // suba.l #imm32, A5
    wr32(rom, patch_0 + 2, screen_distance_from_top as u32);
    wr16(rom, patch_0 + 6, 0x6000); // bra
    wr16(rom, patch_0 + 8, (0x3A4 - (patch_0 + 8)) as u16);

    let patch_2 = 0x32usize;
    let patch_1 = patch_0 + 10;
    if (w / 8) >= 128 {
        wr16(rom, patch_1, 0x3A3C); // move.l ..., D5
        wr16(rom, patch_1 + 2, (w / 8) as u16);
        wr16(rom, patch_1 + 4, 0xC2C5); // mulu D5, D1
        wr16(rom, patch_1 + 6, 0x4E75); // rts
        if patch_1 + 8 > 0x58 {
            return Err(RomPatchError::PatchOverflow(patch_1 + 8, 0x58));
        }

        // The illegal-instruction vector entry at 0x2e falls through to the
        // test-software check; redirect it past the same way.
        wr16(rom, 0x2E, 0x6000); // bra
        wr16(rom, 0x30, 0x62 - 0x30);

        wr16(rom, patch_2, 0x303C); // move.l ..., D0
        wr16(rom, patch_2 + 2, (w / 8) as u16);
        wr16(rom, patch_2 + 4, 0x41F8); // lea.l (CrsrSave), A0
        wr16(rom, patch_2 + 6, 0x088C);
        wr16(rom, patch_2 + 8, 0x4E75); // rts
        if patch_2 + 10 > 0x41 {
            return Err(RomPatchError::PatchOverflow(patch_2 + 10, 0x41));
        }
    }

    // Screen-geometry constants at their fixed Mac Plus v3 ROM offsets.
    wr32(rom, 0x8A, screen_base);
    wr32(rom, 0x146, screen_base);
    wr32(rom, 0x164, sb(w / 2 - 24, h / 2 + 8));
    wr16(rom, 0x188, (w / 8) as u16);
    wr16(rom, 0x194, (w / 8) as u16);
    wr16(rom, 0x19C, (6 * w / 8 - 1) as u16);
    wr32(rom, 0x1A4, sb(w / 2 - 8, h / 2 + 16));
    wr16(rom, 0x1EE, (screen_size / 4 - 1) as u16);

    wr32(rom, 0xF0C, sb(w / 2 - 16, h / 2 - 26));
    wr32(rom, 0xF18, sb(w / 2 - 8, h / 2 - 20));
    wr32(rom, 0x7E0, sb(w / 2 - 16, h / 2 - 26));
    wr32(rom, 0x7F2, sb(w / 2 - 8, h / 2 - 11));

    // "suba #$5900, A5" would sign-extend negative at larger sizes; detour
    // through patch_0's 32-bit variant instead.
    wr16(rom, 0x3A0, 0x6000); // bra
    wr16(rom, 0x3A2, (patch_0 - 0x3A2) as u16);

    wr16(rom, 0x474, (w / 8) as u16);
    wr16(rom, 0x494, h as u16);
    wr16(rom, 0x498, w as u16);
    wr16(rom, 0xA0E, h as u16);
    wr16(rom, 0xA10, w as u16);
    wr16(rom, 0xEE2, (w / 8 - 4) as u16);
    wr16(rom, 0xEF2, (w / 8) as u16);
    wr16(rom, 0xF36, (w / 8 - 2) as u16);

    if (w / 8) >= 128 {
        wr16(rom, 0x1CCC, 0x4EBA); // jsr
        wr16(rom, 0x1CCE, (patch_2 as i32 - 0x1CCE) as u16);
        wr16(rom, 0x1CD0, 0x4E71); // nop
    } else {
        wr8(rom, 0x1CD1, (w / 8) as u8);
    }

    wr16(rom, 0x1D48, (w - 32) as u16);
    wr16(rom, 0x1D4E, (w - 32) as u16);
    wr16(rom, 0x1D6E, (h - 16) as u16);
    wr16(rom, 0x1D74, h as u16);
    wr8(rom, 0x1D93, (w / 8) as u8);
    wr16(rom, 0x1E68, h as u16);
    if (w / 8) >= 128 {
        wr16(rom, 0x1D92, 0x4EBA); // jsr
        wr16(rom, 0x1D94, (patch_1 as i32 - 0x1D94) as u16);
    } else {
        wr8(rom, 0x1D93, (w / 8) as u8);
    }
    wr16(rom, 0x1E6E, w as u16);
    wr16(rom, 0x1E82, h as u16);

    Ok(())
}
