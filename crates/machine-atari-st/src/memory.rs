//! The ST memory map: RAM, TOS ROM, and the I/O handler table.
//!
//! Address routing for every bus initiator:
//! - `$000000..ram_size`: RAM (up to 4 MiB)
//! - `$FC0000..$FEFFFF`: TOS ROM (writes dropped, short reads float high)
//! - `$FF0000..$FFFFFF`: the I/O window, dispatched through the
//!   registered handler table
//! - everything else: bus error
//!
//! Odd word or long access faults with an address error before any
//! handler or memory is touched. On reset the first 8 bytes of RAM are
//! overwritten with the first 8 bytes of ROM so the CPU's reset fetch of
//! SSP/PC lands in TOS (the GLUE ROM-overlay behaviour).

use emu_core::{AUTOVECTOR_BASE, BusFault, BusPort, BusResult, IoModule, ensure_even};
use log::debug;

use crate::MachineError;

/// Base of the memory-mapped I/O window.
pub const IO_BASE: u32 = 0xFF_0000;
/// Last byte of the I/O window.
pub const IO_END: u32 = 0xFF_FFFF;
/// TOS ROM window.
pub const ROM_BASE: u32 = 0xFC_0000;
pub const ROM_END: u32 = 0xFE_FFFF;
/// Largest supported RAM array.
pub const MAX_RAM: u32 = 4 * 1024 * 1024;
/// Handler table capacity.
pub const MAX_IO_REGIONS: usize = 16;

/// One registered I/O handler: an address range and the chip behind it.
struct IoRegion {
    base: u32,
    end: u32,
    name: &'static str,
    module: Box<dyn IoModule>,
}

/// The memory map; also the machine's bus.
pub struct StMemoryMap {
    ram: Vec<u8>,
    rom: Vec<u8>,
    regions: Vec<IoRegion>,
}

impl StMemoryMap {
    /// Allocate zeroed RAM. The ROM arrives via [`Self::load_rom`].
    pub fn new(ram_size: u32) -> Self {
        Self {
            ram: vec![0; ram_size.min(MAX_RAM) as usize],
            rom: Vec::new(),
            regions: Vec::new(),
        }
    }

    pub fn load_rom(&mut self, rom: Vec<u8>) {
        self.rom = rom;
    }

    #[must_use]
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    #[must_use]
    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    /// Zero RAM, keep ROM, apply the reset overlay.
    pub fn reset(&mut self) {
        self.ram.fill(0);
        let overlay = self.rom.len().min(8);
        self.ram[..overlay].copy_from_slice(&self.rom[..overlay]);
    }

    /// Register a chip over `base..=end`. Ranges must sit inside the I/O
    /// window and must not overlap an existing handler.
    pub fn register_io(
        &mut self,
        base: u32,
        end: u32,
        name: &'static str,
        module: Box<dyn IoModule>,
    ) -> Result<usize, MachineError> {
        if base < IO_BASE || end > IO_END || base > end {
            return Err(MachineError::IoRangeOutsideWindow { base, end });
        }
        if let Some(existing) = self
            .regions
            .iter()
            .find(|r| base <= r.end && end >= r.base)
        {
            return Err(MachineError::IoRangeOverlap {
                base,
                end,
                name: existing.name,
            });
        }
        if self.regions.len() >= MAX_IO_REGIONS {
            return Err(MachineError::IoTableFull);
        }
        self.regions.push(IoRegion {
            base,
            end,
            name,
            module,
        });
        Ok(self.regions.len() - 1)
    }

    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    #[must_use]
    pub fn region_name(&self, index: usize) -> Option<&'static str> {
        self.regions.get(index).map(|r| r.name)
    }

    pub fn module_mut(&mut self, index: usize) -> &mut dyn IoModule {
        &mut *self.regions[index].module
    }

    #[must_use]
    pub fn module(&self, index: usize) -> &dyn IoModule {
        &*self.regions[index].module
    }

    /// Clock every registered chip by the consumed CPU cycles.
    pub fn clock_all(&mut self, cycles: u32) {
        for region in &mut self.regions {
            region.module.clock(cycles);
        }
    }

    /// Reset every registered chip.
    pub fn reset_modules(&mut self) {
        for region in &mut self.regions {
            region.module.reset();
        }
    }

    /// Swap the chip behind a region, returning the old one so the
    /// caller can shut it down after the exchange.
    pub fn replace_module(
        &mut self,
        index: usize,
        module: Box<dyn IoModule>,
    ) -> Box<dyn IoModule> {
        std::mem::replace(&mut self.regions[index].module, module)
    }

    /// Index of the region registered under `name`.
    #[must_use]
    pub fn region_index(&self, name: &str) -> Option<usize> {
        self.regions.iter().position(|r| r.name == name)
    }

    /// Render a frame with the module at `index`, feeding it the RAM the
    /// real chip would fetch over its dedicated port.
    pub fn render_frame(&mut self, index: usize, framebuffer: &mut [u32]) {
        let Self { ram, regions, .. } = self;
        if let Some(video) = regions[index].module.as_video() {
            video.render_frame(ram, framebuffer);
        }
    }

    fn region_for(&mut self, addr: u32) -> Option<&mut IoRegion> {
        self.regions.iter_mut().find(|r| addr >= r.base && addr <= r.end)
    }

    fn in_rom(&self, addr: u32) -> bool {
        (ROM_BASE..=ROM_END).contains(&addr)
    }
}

impl BusPort for StMemoryMap {
    fn read_byte(&mut self, addr: u32) -> BusResult<u8> {
        let addr = addr & 0x00FF_FFFF;
        if (addr as usize) < self.ram.len() {
            return Ok(self.ram[addr as usize]);
        }
        if self.in_rom(addr) {
            let offset = (addr - ROM_BASE) as usize;
            return Ok(self.rom.get(offset).copied().unwrap_or(0xFF));
        }
        if addr >= IO_BASE {
            if let Some(region) = self.region_for(addr) {
                let offset = addr - region.base;
                return Ok(region.module.read_byte(offset));
            }
        }
        debug!("bus error: read byte at {addr:#08x}");
        Err(BusFault::bus_error(addr, false))
    }

    fn read_word(&mut self, addr: u32) -> BusResult<u16> {
        let addr = addr & 0x00FF_FFFF;
        ensure_even(addr, false)?;
        if (addr as usize) + 1 < self.ram.len() {
            let a = addr as usize;
            return Ok(u16::from(self.ram[a]) << 8 | u16::from(self.ram[a + 1]));
        }
        if self.in_rom(addr) {
            let offset = (addr - ROM_BASE) as usize;
            let hi = self.rom.get(offset).copied().unwrap_or(0xFF);
            let lo = self.rom.get(offset + 1).copied().unwrap_or(0xFF);
            return Ok(u16::from(hi) << 8 | u16::from(lo));
        }
        if addr >= IO_BASE {
            if let Some(region) = self.region_for(addr) {
                let offset = addr - region.base;
                return Ok(region.module.read_word(offset));
            }
        }
        debug!("bus error: read word at {addr:#08x}");
        Err(BusFault::bus_error(addr, false))
    }

    fn write_byte(&mut self, addr: u32, value: u8) -> BusResult<()> {
        let addr = addr & 0x00FF_FFFF;
        if (addr as usize) < self.ram.len() {
            self.ram[addr as usize] = value;
            return Ok(());
        }
        if self.in_rom(addr) {
            // ROM ignores writes
            return Ok(());
        }
        if addr >= IO_BASE {
            if let Some(region) = self.region_for(addr) {
                let offset = addr - region.base;
                region.module.write_byte(offset, value);
                return Ok(());
            }
        }
        debug!("bus error: write byte at {addr:#08x}");
        Err(BusFault::bus_error(addr, true))
    }

    fn write_word(&mut self, addr: u32, value: u16) -> BusResult<()> {
        let addr = addr & 0x00FF_FFFF;
        ensure_even(addr, true)?;
        if (addr as usize) + 1 < self.ram.len() {
            let a = addr as usize;
            self.ram[a] = (value >> 8) as u8;
            self.ram[a + 1] = value as u8;
            return Ok(());
        }
        if self.in_rom(addr) {
            return Ok(());
        }
        if addr >= IO_BASE {
            if let Some(region) = self.region_for(addr) {
                let offset = addr - region.base;
                region.module.write_word(offset, value);
                return Ok(());
            }
        }
        debug!("bus error: write word at {addr:#08x}");
        Err(BusFault::bus_error(addr, true))
    }

    fn iack(&mut self, level: u8) -> u8 {
        if level == 6 {
            for region in &mut self.regions {
                if region.module.irq_pending() {
                    if let Some(vector) = region.module.irq_vector() {
                        return vector;
                    }
                }
            }
        }
        AUTOVECTOR_BASE + level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::{FaultKind, InterfaceVersion};

    /// A one-register chip for dispatch tests.
    struct Latch {
        value: u8,
    }

    impl IoModule for Latch {
        fn name(&self) -> &'static str {
            "latch"
        }
        fn version(&self) -> InterfaceVersion {
            InterfaceVersion::new(1, 2)
        }
        fn reset(&mut self) {
            self.value = 0;
        }
        fn read_byte(&mut self, _offset: u32) -> u8 {
            self.value
        }
        fn write_byte(&mut self, _offset: u32, value: u8) {
            self.value = value;
        }
        fn clock(&mut self, _cycles: u32) {}
    }

    fn latch() -> Box<Latch> {
        Box::new(Latch { value: 0 })
    }

    #[test]
    fn long_write_round_trips_big_endian() {
        let mut map = StMemoryMap::new(0x10000);
        map.write_long(0x1000, 0x1122_3344).expect("write");
        assert_eq!(map.ram()[0x1000..0x1004], [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(map.read_long(0x1000), Ok(0x1122_3344));
        assert_eq!(map.read_word(0x1000), Ok(0x1122));
    }

    #[test]
    fn odd_word_access_is_an_address_error_and_mutates_nothing() {
        let mut map = StMemoryMap::new(0x10000);
        let before = map.ram()[0x1001];
        let fault = map.write_word(0x1001, 0xABCD).expect_err("odd write");
        assert_eq!(fault.kind, FaultKind::Address);
        assert_eq!(map.ram()[0x1001], before);
        let fault = map.read_long(0x1003).expect_err("odd read");
        assert_eq!(fault.kind, FaultKind::Address);
    }

    #[test]
    fn unmapped_space_is_a_bus_error() {
        let mut map = StMemoryMap::new(0x10000);
        let fault = map.read_byte(0x40_0000).expect_err("hole");
        assert_eq!(fault.kind, FaultKind::Bus);
        let fault = map.write_word(0xFF_F000, 0).expect_err("empty I/O window");
        assert_eq!(fault.kind, FaultKind::Bus);
    }

    #[test]
    fn rom_reads_and_ignores_writes() {
        let mut map = StMemoryMap::new(0x10000);
        map.load_rom(vec![0xAB, 0xCD, 0xEF, 0x01]);
        assert_eq!(map.read_word(ROM_BASE), Ok(0xABCD));
        map.write_word(ROM_BASE, 0x1234).expect("silently dropped");
        assert_eq!(map.read_word(ROM_BASE), Ok(0xABCD));
        // Past the ROM's end the bus floats high
        assert_eq!(map.read_byte(ROM_BASE + 0x100), Ok(0xFF));
    }

    #[test]
    fn reset_overlays_rom_vectors_into_ram() {
        let mut map = StMemoryMap::new(0x10000);
        map.load_rom(vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0xAA]);
        map.ram_mut().fill(0xEE);
        map.reset();
        assert_eq!(&map.ram()[..8], &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(map.ram()[8], 0, "rest of RAM cleared");
    }

    #[test]
    fn io_dispatch_uses_region_offsets() {
        let mut map = StMemoryMap::new(0x1000);
        map.register_io(0xFF_8800, 0xFF_88FF, "latch", latch())
            .expect("register");
        map.write_byte(0xFF_8800, 0x5A).expect("io write");
        assert_eq!(map.read_byte(0xFF_8842), Ok(0x5A));
    }

    #[test]
    fn overlapping_io_ranges_are_rejected() {
        let mut map = StMemoryMap::new(0x1000);
        map.register_io(0xFF_8800, 0xFF_88FF, "a", latch())
            .expect("first");
        let err = map
            .register_io(0xFF_8880, 0xFF_8900, "b", latch())
            .expect_err("overlap");
        assert!(matches!(err, MachineError::IoRangeOverlap { .. }));
    }

    #[test]
    fn io_range_must_sit_in_the_window() {
        let mut map = StMemoryMap::new(0x1000);
        let err = map
            .register_io(0xF0_0000, 0xF0_00FF, "low", latch())
            .expect_err("below window");
        assert!(matches!(err, MachineError::IoRangeOutsideWindow { .. }));
    }

    /// Exposes accumulated clocks through its data register.
    struct CycleProbe {
        clocks: u32,
    }

    impl IoModule for CycleProbe {
        fn name(&self) -> &'static str {
            "probe"
        }
        fn version(&self) -> InterfaceVersion {
            InterfaceVersion::new(1, 2)
        }
        fn reset(&mut self) {
            self.clocks = 0;
        }
        fn read_byte(&mut self, _offset: u32) -> u8 {
            self.clocks as u8
        }
        fn write_byte(&mut self, _offset: u32, _value: u8) {}
        fn clock(&mut self, cycles: u32) {
            self.clocks += cycles;
        }
    }

    #[test]
    fn clock_all_reaches_every_region() {
        let mut map = StMemoryMap::new(0x1000);
        map.register_io(0xFF_8900, 0xFF_89FF, "probe", Box::new(CycleProbe { clocks: 0 }))
            .expect("register");
        map.clock_all(0x42);
        assert_eq!(map.read_byte(0xFF_8900), Ok(0x42));
    }
}
