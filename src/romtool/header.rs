//! C-header ROM export (`SPEC_FULL.md` §C.2).
//!
//! Grounded on `original_source/src/rom.c`'s `UMAC_STANDALONE_PATCHER` `-o`
//! path: a flat `%d,` byte list, newline every 16 bytes, suitable for
//! `#include`-ing into a microcontroller build the way `rom.c` does for the
//! Pico target.

use std::io::{self, Write};

/// Writes `rom` to `out` as a comma-separated decimal byte list, 16 values
/// per line, matching `rom.c`'s `fprintf(ofd, "%d,", rom_base[i])` loop
/// byte-for-byte (including its trailing newline after the last group).
pub fn write_c_header(out: &mut impl Write, rom: &[u8]) -> io::Result<()> {
    for (i, byte) in rom.iter().enumerate() {
        write!(out, "{byte},")?;
        if i % 16 == 15 {
            writeln!(out)?;
        }
    }
    writeln!(out)?;
    Ok(())
}
