//! Standalone offline ROM patcher CLI (`spec.md` §6 "CLI (offline ROM
//! patcher tool)", `SPEC_FULL.md` §C.1).
//!
//! Grounded on `original_source/src/rom.c`'s `UMAC_STANDALONE_PATCHER` main
//! function: same flag letters, same "at least one output format" rule.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use pv_mac::mac::ROM_SIZE;
use pv_mac::romtool::{patch, write_c_header, PatchOptions};

/// Patches a Mac Plus v3 ROM image for in-core emulation: defeats its
/// checksum, replaces the `.Sony` driver with the pseudo-disc hook, and
/// rewrites the RAM-size/screen-geometry constants for non-default setups.
#[derive(Parser, Debug)]
#[command(name = "pv-mac-patch", version, about)]
struct Args {
    /// Path to the unmodified 128KiB ROM image to patch.
    #[arg(short = 'r', long = "rom")]
    rom: PathBuf,

    /// Write the patched ROM as a raw binary to this path.
    #[arg(short = 'W', long = "write")]
    write_bin: Option<PathBuf>,

    /// Write the patched ROM as a C header (comma-separated byte table).
    #[arg(short = 'o', long = "header-out")]
    write_header: Option<PathBuf>,

    /// Display width in pixels (default 512).
    #[arg(short = 'w', long = "width", default_value_t = 512)]
    width: u32,

    /// Display height in pixels (default 342).
    #[arg(short = 'h', long = "height", default_value_t = 342)]
    height: u32,

    /// RAM size in KiB (default 128).
    #[arg(short = 'm', long = "ram-kib", default_value_t = 128)]
    ram_kib: usize,

    /// Shorthand for `-w 640 -h 480`.
    #[arg(short = 'v', long = "vga")]
    vga: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let mut args = Args::parse();

    if args.vga {
        args.width = 640;
        args.height = 480;
    }

    if args.write_bin.is_none() && args.write_header.is_none() {
        bail!("at least one of -W (binary) or -o (C header) output must be given");
    }

    let mut rom = fs::read(&args.rom).with_context(|| format!("reading {}", args.rom.display()))?;
    if rom.len() != ROM_SIZE {
        bail!("{} is {} bytes, expected {ROM_SIZE}", args.rom.display(), rom.len());
    }

    let opts = PatchOptions {
        disp_width: args.width,
        disp_height: args.height,
        ram_size: args.ram_kib * 1024,
    };
    patch(&mut rom, opts)?;
    info!(
        "patched {} for {}x{} display, {}KiB RAM",
        args.rom.display(),
        args.width,
        args.height,
        args.ram_kib
    );

    if let Some(path) = &args.write_bin {
        fs::write(path, &rom).with_context(|| format!("writing {}", path.display()))?;
        info!("wrote binary ROM to {}", path.display());
    }

    if let Some(path) = &args.write_header {
        let mut out = fs::File::create(path).with_context(|| format!("writing {}", path.display()))?;
        write_c_header(&mut out, &rom)?;
        info!("wrote C header to {}", path.display());
    }

    Ok(())
}
