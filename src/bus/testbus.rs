//! In-memory bus harness for exercising a single `BusMember` in isolation,
//! without wiring up the full Mac memory map. Modelled on the teacher's
//! `Testbus` (a HashMap-backed `Bus` impl used to unit-test bus-trait
//! consumers without a real address space behind them).

use std::collections::HashMap;

use super::{Address, BusMember};

#[derive(Default)]
pub struct TestBus {
    mem: HashMap<Address, u8>,
}

impl TestBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BusMember<Address> for TestBus {
    fn read(&mut self, addr: Address) -> Option<u8> {
        Some(*self.mem.get(&addr).unwrap_or(&0))
    }

    fn write(&mut self, addr: Address, val: u8) -> Option<()> {
        self.mem.insert(addr, val);
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_writes() {
        let mut b = TestBus::new();
        assert_eq!(b.read(0x1000), Some(0));
        b.write(0x1000, 0x42);
        assert_eq!(b.read(0x1000), Some(0x42));
    }
}
