//! File-based round trip for the ROM patcher's read/write paths
//! (`SPEC_FULL.md` §B tests: file I/O exercised through real temporary
//! files rather than in-memory buffers only, the way `itsakeyfut-psrx`
//! uses `tempfile` for its own on-disk round trips).

use std::fs;
use std::io::Read;

use pv_mac::mac::ROM_SIZE;
use pv_mac::romtool::{patch, write_c_header, PatchOptions, ROM_PLUSV3_VERSION};

fn canonical_rom() -> Vec<u8> {
    let mut rom = vec![0u8; ROM_SIZE];
    rom[0..4].copy_from_slice(&ROM_PLUSV3_VERSION.to_be_bytes());
    rom
}

#[test]
fn patched_rom_round_trips_through_a_real_file() {
    let dir = tempfile::tempdir().unwrap();
    let rom_path = dir.path().join("plus.rom");
    fs::write(&rom_path, canonical_rom()).unwrap();

    let mut rom = fs::read(&rom_path).unwrap();
    patch(&mut rom, PatchOptions::default()).unwrap();

    let out_path = dir.path().join("plus-patched.rom");
    fs::write(&out_path, &rom).unwrap();

    let reread = fs::read(&out_path).unwrap();
    assert_eq!(reread, rom);
    assert_eq!(reread.len(), ROM_SIZE);
}

#[test]
fn c_header_export_round_trips_through_a_real_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut rom = canonical_rom();
    patch(&mut rom, PatchOptions::default()).unwrap();

    let header_path = dir.path().join("plus.h");
    let mut file = fs::File::create(&header_path).unwrap();
    write_c_header(&mut file, &rom).unwrap();
    drop(file);

    let mut text = String::new();
    fs::File::open(&header_path).unwrap().read_to_string(&mut text).unwrap();

    let values: Vec<u16> = text
        .lines()
        .flat_map(|line| line.split(',').filter(|s| !s.is_empty()))
        .map(|s| s.parse().unwrap())
        .collect();
    assert_eq!(values.len(), ROM_SIZE);
    assert_eq!(values[0] as u8, rom[0]);
}
