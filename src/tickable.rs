use anyhow::Result;

/// Representation of an amount of whole-system clock cycles.
pub type Ticks = u64;

/// Components driven by the main dispatch loop implement this to advance
/// their internal state by a given number of cycles.
pub trait Tickable {
    fn tick(&mut self, ticks: Ticks) -> Result<Ticks>;
}
