//! Seven-level priority encoder arbitrating the VIA and SCC interrupt
//! outputs onto the CPU's single prioritised IRQ input.
//!
//! Grounded on `original_source/src/main.c`'s `int_controller_set`/
//! `int_controller_clear`, generalised from the two hardwired devices there
//! (VIA at level 1, SCC at level 2) into `spec.md` §4.4's seven-level
//! encoder. VIA and SCC each hold a `level` constant and call `set`/`clear`
//! on this controller from their own `irq_set` callback rather than poking
//! the CPU directly, breaking the VIA/intctl/CPU collaborator cycle the way
//! `spec.md` §9 recommends (collaborators wired by reference at `init`).

/// VIA always asserts on priority level 1 (`spec.md` §4.4).
pub const LEVEL_VIA: u8 = 1;
/// SCC always asserts on priority level 2 (`spec.md` §4.4).
pub const LEVEL_SCC: u8 = 2;

#[derive(Debug, Default)]
pub struct IntController {
    /// Bit `n` set means level `n` is currently asserted.
    pending: u8,
    highest: u8,
}

impl IntController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assert interrupt `level` (1..=7).
    pub fn set(&mut self, level: u8) {
        debug_assert!((1..=7).contains(&level));
        self.pending |= 1 << level;
        self.recompute();
    }

    /// De-assert interrupt `level` (1..=7).
    pub fn clear(&mut self, level: u8) {
        debug_assert!((1..=7).contains(&level));
        self.pending &= !(1 << level);
        self.recompute();
    }

    fn recompute(&mut self) {
        self.highest = (0..=7).rev().find(|l| self.pending & (1 << l) != 0).unwrap_or(0);
    }

    /// Highest currently pending interrupt level, or 0 if none are pending.
    /// This is what the CPU's IRQ input should be driven to (`spec.md` §3
    /// invariant: "highest_int equals the maximum bit set in the pending
    /// mask, or 0 if the mask is empty").
    pub fn level(&self) -> u8 {
        self.highest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_level_zero() {
        let ic = IntController::new();
        assert_eq!(ic.level(), 0);
    }

    #[test]
    fn reports_highest_pending() {
        let mut ic = IntController::new();
        ic.set(LEVEL_VIA);
        assert_eq!(ic.level(), LEVEL_VIA);
        ic.set(LEVEL_SCC);
        assert_eq!(ic.level(), LEVEL_SCC);
        ic.clear(LEVEL_SCC);
        assert_eq!(ic.level(), LEVEL_VIA);
        ic.clear(LEVEL_VIA);
        assert_eq!(ic.level(), 0);
    }

    #[test]
    fn clearing_non_highest_keeps_highest() {
        let mut ic = IntController::new();
        ic.set(3);
        ic.set(5);
        ic.clear(3);
        assert_eq!(ic.level(), 5);
    }

    #[test]
    fn idempotent_set() {
        let mut ic = IntController::new();
        ic.set(4);
        ic.set(4);
        assert_eq!(ic.level(), 4);
        ic.clear(4);
        assert_eq!(ic.level(), 0);
    }
}
