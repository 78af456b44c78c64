//! M0110 keyboard protocol service.
//!
//! Grounded on `core/src/mac/pluskbd.rs` (the command/response shape) and
//! `original_source/src/main.c`'s `kbd_rx`/`umac_kbd_event` (the exact
//! command and response byte values). `spec.md` §4.5 requires the model byte
//! to read back as the Plus's keyboard model (5), which is the one place
//! this diverges from the teacher's generic `Keyboard`, which answers model
//! queries for the 128K's keyboard instead.

use std::collections::VecDeque;

const CMD_INQUIRY: u8 = 0x10;
const CMD_INSTANT: u8 = 0x14;
const CMD_GET_MODEL: u8 = 0x16;
const CMD_TEST: u8 = 0x36;

const RSP_NULL: u8 = 0x7B;
const RSP_TEST_ACK: u8 = 0x7D;

/// Mac Plus keyboard model number (`spec.md` §4.5).
const KBD_MODEL: u8 = 5;

/// Maximum number of pending key transition bytes the ring buffer holds
/// before the oldest is dropped (`spec.md` §9: "an 8-entry ring buffer").
const QUEUE_CAPACITY: usize = 8;

#[derive(Default)]
pub struct Keyboard {
    queue: VecDeque<u8>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a key transition byte (scancode with bit 7 clear for
    /// key-down, set for key-up) as produced by the host's key event.
    /// Drops the oldest pending byte if the ring is full.
    pub fn push_event(&mut self, transition: u8) {
        if self.queue.len() == QUEUE_CAPACITY {
            self.queue.pop_front();
        }
        self.queue.push_back(transition);
    }

    /// Processes one command byte received over the VIA shift register and
    /// returns the response byte (`spec.md` §4.5).
    pub fn cmd(&mut self, cmd: u8) -> u8 {
        match cmd {
            CMD_INQUIRY | CMD_INSTANT => self.queue.pop_front().unwrap_or(RSP_NULL),
            CMD_GET_MODEL => (KBD_MODEL << 1) | 1,
            CMD_TEST => RSP_TEST_ACK,
            _ => RSP_NULL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_query_returns_plus_model() {
        let mut kbd = Keyboard::new();
        assert_eq!(kbd.cmd(CMD_GET_MODEL), 0x0B);
    }

    #[test]
    fn inquiry_with_empty_queue_returns_null() {
        let mut kbd = Keyboard::new();
        assert_eq!(kbd.cmd(CMD_INQUIRY), RSP_NULL);
    }

    #[test]
    fn inquiry_drains_pending_transitions_in_order() {
        let mut kbd = Keyboard::new();
        kbd.push_event(0x52);
        kbd.push_event(0xD2);
        assert_eq!(kbd.cmd(CMD_INQUIRY), 0x52);
        assert_eq!(kbd.cmd(CMD_INQUIRY), 0xD2);
        assert_eq!(kbd.cmd(CMD_INQUIRY), RSP_NULL);
    }

    #[test]
    fn ring_buffer_drops_oldest_when_full() {
        let mut kbd = Keyboard::new();
        for i in 0..QUEUE_CAPACITY as u8 + 2 {
            kbd.push_event(i);
        }
        assert_eq!(kbd.cmd(CMD_INQUIRY), 2);
    }

    #[test]
    fn test_command_acks() {
        let mut kbd = Keyboard::new();
        assert_eq!(kbd.cmd(CMD_TEST), RSP_TEST_ACK);
    }
}
