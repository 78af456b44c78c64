//! Minimal headless host runner (`SPEC_FULL.md` §C.3).
//!
//! Grounded on `original_source/src/main.c`'s `main()`: load RAM/ROM/disc
//! images from paths, drive `umac_loop()` until it reports done or a quanta
//! budget is exhausted, optionally dump the framebuffer. No window, no
//! audio, no host scancode translation -- those belong to a real frontend,
//! not this crate (`spec.md` §1 Non-goals).

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use pv_mac::emulator::Emulator;
use pv_mac::mac::ROM_SIZE;

/// Runs a Mac Plus ROM/RAM image to completion (or a quanta budget)
/// without any interactive host loop, for smoke-testing a patched ROM or
/// disc image headlessly.
#[derive(Parser, Debug)]
#[command(name = "pv-mac-run", version, about)]
struct Args {
    /// Path to an already-patched ROM image.
    #[arg(long)]
    rom: PathBuf,

    /// RAM size in KiB (default 128).
    #[arg(long, default_value_t = 128)]
    ram_kib: usize,

    /// Optional disc image to mount in drive 0.
    #[arg(long)]
    disc0: Option<PathBuf>,

    /// Optional disc image to mount in drive 1.
    #[arg(long)]
    disc1: Option<PathBuf>,

    /// Mount disc images read-only.
    #[arg(long)]
    read_only: bool,

    /// Display width in pixels (default 512).
    #[arg(long, default_value_t = 512)]
    width: u32,

    /// Display height in pixels (default 342).
    #[arg(long, default_value_t = 342)]
    height: u32,

    /// Maximum number of main-loop quanta to run before giving up.
    #[arg(long, default_value_t = 1_000_000)]
    max_quanta: u64,

    /// Dump the framebuffer as a portable bitmap (P4) to this path once the
    /// run stops.
    #[arg(long)]
    dump_fb: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let rom = fs::read(&args.rom).with_context(|| format!("reading {}", args.rom.display()))?;
    if rom.len() != ROM_SIZE {
        bail!("{} is {} bytes, expected {ROM_SIZE}", args.rom.display(), rom.len());
    }
    let mut ram = vec![0u8; args.ram_kib * 1024];

    let mut disc0 = args.disc0.as_ref().map(|p| fs::read(p)).transpose()?;
    let mut disc1 = args.disc1.as_ref().map(|p| fs::read(p)).transpose()?;

    let mut emu = Emulator::init(&mut ram, &rom, args.width, args.height);
    if let Some(image) = disc0.as_mut() {
        emu.insert_disc(0, image, args.read_only);
    }
    if let Some(image) = disc1.as_mut() {
        emu.insert_disc(1, image, args.read_only);
    }

    let mut quanta = 0u64;
    loop {
        if emu.step() {
            info!("core reported fatal error after {quanta} quanta, stopping");
            break;
        }
        quanta += 1;
        if quanta >= args.max_quanta {
            info!("reached quanta budget ({quanta}), stopping");
            break;
        }
        for slot in emu.take_ejected_discs() {
            info!("disc slot {slot} ejected");
        }
    }

    if let Some(path) = &args.dump_fb {
        dump_framebuffer(&emu, args.width, args.height, path)?;
        info!("dumped framebuffer to {}", path.display());
    }

    Ok(())
}

fn dump_framebuffer(emu: &Emulator, width: u32, height: u32, path: &PathBuf) -> Result<()> {
    let offset = emu.get_fb_offset();
    let row_bytes = (width / 8) as usize;
    let len = row_bytes * height as usize;
    let ram = emu.ram();
    let end = offset.checked_add(len).filter(|&e| e <= ram.len());
    let Some(end) = end else {
        bail!("framebuffer region {offset:#x}+{len:#x} exceeds RAM size {:#x}", ram.len());
    };

    let mut out = fs::File::create(path).with_context(|| format!("writing {}", path.display()))?;
    write!(out, "P4\n{width} {height}\n")?;
    out.write_all(&ram[offset..end])?;
    Ok(())
}
