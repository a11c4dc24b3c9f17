//! ST MMU, register side: the memory-configuration register at $FF8001.
//!
//! Two bits per bank select 128 KiB, 512 KiB or 2 MiB. TOS writes the
//! value it probes during boot and reads it back afterwards; the actual
//! RAM array lives in the machine's memory map.

use emu_core::{InterfaceVersion, IoModule};

/// Bank size decode for one 2-bit field.
fn bank_bytes(bits: u8) -> u32 {
    match bits & 3 {
        0 => 128 * 1024,
        1 => 512 * 1024,
        _ => 2 * 1024 * 1024,
    }
}

/// The MMU configuration latch.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mmu {
    config: u8,
}

impl Mmu {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total RAM the current configuration implies.
    #[must_use]
    pub fn configured_ram(&self) -> u32 {
        bank_bytes(self.config >> 2) + bank_bytes(self.config)
    }
}

impl IoModule for Mmu {
    fn name(&self) -> &'static str {
        "mmu"
    }

    fn version(&self) -> InterfaceVersion {
        InterfaceVersion::new(1, 2)
    }

    fn reset(&mut self) {
        self.config = 0;
    }

    fn read_byte(&mut self, offset: u32) -> u8 {
        if offset == 1 { self.config } else { 0xFF }
    }

    fn write_byte(&mut self, offset: u32, value: u8) {
        if offset == 1 {
            self.config = value & 0x0F;
        }
    }

    fn clock(&mut self, _cycles: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips() {
        let mut mmu = Mmu::new();
        mmu.write_byte(1, 0x05);
        assert_eq!(mmu.read_byte(1), 0x05);
    }

    #[test]
    fn configured_ram_decodes_banks() {
        let mut mmu = Mmu::new();
        mmu.write_byte(1, 0x05); // two 512 KiB banks
        assert_eq!(mmu.configured_ram(), 1024 * 1024);
        mmu.write_byte(1, 0x00);
        assert_eq!(mmu.configured_ram(), 256 * 1024);
    }
}
