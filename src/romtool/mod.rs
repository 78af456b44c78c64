//! Offline ROM patcher (`spec.md` §4.6, §6 "CLI (offline ROM patcher tool)").
//!
//! `spec.md` §6 `init(ram_base, rom_base, discs[])` is explicit that "the rom
//! has been passed through the patcher" by the time the host calls it --
//! patching is a host-side step, not something `emulator::Emulator::init`
//! does itself. This module is the library half shared by the standalone
//! `pv-mac-patch` binary (`SPEC_FULL.md` §C.1) and, for hosts that patch in
//! process rather than shelling out, direct calls to [`patch`] before
//! constructing an [`crate::emulator::Emulator`].

pub mod header;
pub mod patch;

pub use header::write_c_header;
pub use patch::{patch, rom_version, PatchOptions, RomPatchError, ROM_PLUSV3_VERSION};
