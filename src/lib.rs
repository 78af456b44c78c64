#![allow(clippy::new_without_default)]
#![allow(clippy::unit_arg)]
#![allow(clippy::single_match)]

pub mod bus;
pub mod cpu;
pub mod emulator;
pub mod intctl;
pub mod mac;
pub mod romtool;
pub mod tickable;
pub mod types;
pub mod util;
