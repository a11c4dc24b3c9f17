//! Shared test fixture: a flat RAM bus with fault recording.

#![allow(dead_code)]

use cpu_m68k::Cpu68000;
use emu_core::{BusFault, BusPort, BusResult, ensure_even};

/// 1 MiB of RAM; anything above faults as a bus error.
pub const RAM_SIZE: u32 = 0x10_0000;

pub struct TestBus {
    pub ram: Vec<u8>,
    /// Every fault the bus handed back, in order.
    pub faults: Vec<BusFault>,
    /// Vector supplied on level-6 acknowledge, if any.
    pub level6_vector: Option<u8>,
}

impl TestBus {
    pub fn new() -> Self {
        Self {
            ram: vec![0; RAM_SIZE as usize],
            faults: Vec::new(),
            level6_vector: None,
        }
    }

    fn fault(&mut self, fault: BusFault) -> BusFault {
        self.faults.push(fault);
        fault
    }

    pub fn load(&mut self, addr: u32, bytes: &[u8]) {
        let addr = addr as usize;
        self.ram[addr..addr + bytes.len()].copy_from_slice(bytes);
    }

    pub fn read_long_raw(&self, addr: u32) -> u32 {
        let a = addr as usize;
        u32::from(self.ram[a]) << 24
            | u32::from(self.ram[a + 1]) << 16
            | u32::from(self.ram[a + 2]) << 8
            | u32::from(self.ram[a + 3])
    }

    pub fn read_word_raw(&self, addr: u32) -> u16 {
        let a = addr as usize;
        u16::from(self.ram[a]) << 8 | u16::from(self.ram[a + 1])
    }
}

impl BusPort for TestBus {
    fn read_byte(&mut self, addr: u32) -> BusResult<u8> {
        if addr < RAM_SIZE {
            Ok(self.ram[addr as usize])
        } else {
            Err(self.fault(BusFault::bus_error(addr, false)))
        }
    }

    fn read_word(&mut self, addr: u32) -> BusResult<u16> {
        ensure_even(addr, false).map_err(|f| self.fault(f))?;
        if addr + 1 < RAM_SIZE {
            Ok(self.read_word_raw(addr))
        } else {
            Err(self.fault(BusFault::bus_error(addr, false)))
        }
    }

    fn write_byte(&mut self, addr: u32, value: u8) -> BusResult<()> {
        if addr < RAM_SIZE {
            self.ram[addr as usize] = value;
            Ok(())
        } else {
            Err(self.fault(BusFault::bus_error(addr, true)))
        }
    }

    fn write_word(&mut self, addr: u32, value: u16) -> BusResult<()> {
        ensure_even(addr, true).map_err(|f| self.fault(f))?;
        if addr + 1 < RAM_SIZE {
            self.ram[addr as usize] = (value >> 8) as u8;
            self.ram[(addr + 1) as usize] = value as u8;
            Ok(())
        } else {
            Err(self.fault(BusFault::bus_error(addr, true)))
        }
    }

    fn iack(&mut self, level: u8) -> u8 {
        if level == 6 {
            if let Some(vector) = self.level6_vector {
                return vector;
            }
        }
        24 + level
    }
}

/// A CPU reset against a bus whose vectors point SSP at 0x8000 and PC at
/// `entry`, with `program` loaded there.
pub fn setup(entry: u32, program: &[u8]) -> (Cpu68000, TestBus) {
    let mut bus = TestBus::new();
    bus.load(0, &0x0000_8000u32.to_be_bytes());
    bus.load(4, &entry.to_be_bytes());
    bus.load(entry, program);
    let mut cpu = Cpu68000::new();
    cpu.reset(&mut bus);
    (cpu, bus)
}

/// Run a single instruction and return its cycle cost.
pub fn step(cpu: &mut Cpu68000, bus: &mut TestBus) -> u32 {
    cpu.execute(bus, 1)
}
