//! The native capability-table ABI loaded modules speak.
//!
//! A module's entry function takes no arguments and returns a pointer to
//! an immutable table whose first field is the interface version and
//! second a NUL-terminated name; the function pointers after that depend
//! on the component type. All tables here are `#[repr(C)]` and
//! bit-stable: they are the contract between this host and code built
//! out-of-tree.

use std::ffi::{CStr, c_char, c_void};

use emu_core::{BusFault, BusPort, CpuState, InterfaceVersion};

/// Entry function every module exports.
pub type ModuleEntry = unsafe extern "C" fn() -> *const ModuleHeader;

/// Common prefix of every capability table.
#[repr(C)]
pub struct ModuleHeader {
    pub interface_version: u32,
    pub name: *const c_char,
}

impl ModuleHeader {
    /// # Safety
    /// `self.name` must be null or a valid NUL-terminated string.
    #[must_use]
    pub unsafe fn name(&self) -> Option<&str> {
        if self.name.is_null() {
            return None;
        }
        // SAFETY: caller guarantees the pointer.
        unsafe { CStr::from_ptr(self.name) }.to_str().ok()
    }

    #[must_use]
    pub fn version(&self) -> InterfaceVersion {
        InterfaceVersion::from_packed(self.interface_version)
    }
}

/// The nine-field bus table handed to bus initiators: six big-endian
/// accessors, the two fault hooks, and one opaque context.
#[repr(C)]
pub struct BusInterface {
    pub read_byte: unsafe extern "C" fn(ctx: *mut c_void, addr: u32) -> u8,
    pub read_word: unsafe extern "C" fn(ctx: *mut c_void, addr: u32) -> u16,
    pub read_long: unsafe extern "C" fn(ctx: *mut c_void, addr: u32) -> u32,
    pub write_byte: unsafe extern "C" fn(ctx: *mut c_void, addr: u32, value: u8),
    pub write_word: unsafe extern "C" fn(ctx: *mut c_void, addr: u32, value: u16),
    pub write_long: unsafe extern "C" fn(ctx: *mut c_void, addr: u32, value: u32),
    pub bus_error: unsafe extern "C" fn(ctx: *mut c_void, addr: u32, is_write: u8),
    pub address_error: unsafe extern "C" fn(ctx: *mut c_void, addr: u32, is_write: u8),
    pub context: *mut c_void,
}

/// Bridge state behind a [`BusInterface`] built over a Rust [`BusPort`].
///
/// Faults surface through the hook pointers exactly once per failed
/// access and are also latched here for the adapter to collect.
pub struct BusBridge<'a> {
    port: &'a mut dyn BusPort,
    pub pending_fault: Option<BusFault>,
}

impl<'a> BusBridge<'a> {
    pub fn new(port: &'a mut dyn BusPort) -> Self {
        Self {
            port,
            pending_fault: None,
        }
    }

    /// Build the C table over this bridge. The table is only valid while
    /// the bridge is alive and pinned.
    pub fn interface(&mut self) -> BusInterface {
        BusInterface {
            read_byte: bridge_read_byte,
            read_word: bridge_read_word,
            read_long: bridge_read_long,
            write_byte: bridge_write_byte,
            write_word: bridge_write_word,
            write_long: bridge_write_long,
            bus_error: bridge_fault,
            address_error: bridge_fault,
            context: std::ptr::from_mut(self).cast(),
        }
    }

    fn latch(&mut self, fault: BusFault) {
        if self.pending_fault.is_none() {
            self.pending_fault = Some(fault);
        }
    }
}

unsafe fn bridge<'a>(ctx: *mut c_void) -> &'a mut BusBridge<'a> {
    // SAFETY: context always points at the live BusBridge that built the
    // table; the machine keeps it pinned for the duration of the call.
    unsafe { &mut *ctx.cast() }
}

unsafe extern "C" fn bridge_read_byte(ctx: *mut c_void, addr: u32) -> u8 {
    let b = unsafe { bridge(ctx) };
    match b.port.read_byte(addr) {
        Ok(value) => value,
        Err(fault) => {
            b.latch(fault);
            0xFF
        }
    }
}

unsafe extern "C" fn bridge_read_word(ctx: *mut c_void, addr: u32) -> u16 {
    let b = unsafe { bridge(ctx) };
    match b.port.read_word(addr) {
        Ok(value) => value,
        Err(fault) => {
            b.latch(fault);
            0xFFFF
        }
    }
}

unsafe extern "C" fn bridge_read_long(ctx: *mut c_void, addr: u32) -> u32 {
    let b = unsafe { bridge(ctx) };
    match b.port.read_long(addr) {
        Ok(value) => value,
        Err(fault) => {
            b.latch(fault);
            0xFFFF_FFFF
        }
    }
}

unsafe extern "C" fn bridge_write_byte(ctx: *mut c_void, addr: u32, value: u8) {
    let b = unsafe { bridge(ctx) };
    if let Err(fault) = b.port.write_byte(addr, value) {
        b.latch(fault);
    }
}

unsafe extern "C" fn bridge_write_word(ctx: *mut c_void, addr: u32, value: u16) {
    let b = unsafe { bridge(ctx) };
    if let Err(fault) = b.port.write_word(addr, value) {
        b.latch(fault);
    }
}

unsafe extern "C" fn bridge_write_long(ctx: *mut c_void, addr: u32, value: u32) {
    let b = unsafe { bridge(ctx) };
    if let Err(fault) = b.port.write_long(addr, value) {
        b.latch(fault);
    }
}

unsafe extern "C" fn bridge_fault(ctx: *mut c_void, addr: u32, is_write: u8) {
    let b = unsafe { bridge(ctx) };
    b.latch(BusFault::bus_error(addr, is_write != 0));
}

/// CPU state record as it crosses the C boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCpuState {
    pub d: [u32; 8],
    pub a: [u32; 7],
    pub usp: u32,
    pub ssp: u32,
    pub pc: u32,
    pub sr: u16,
    pub stopped: u8,
    pub halted: u8,
    pub cycles: u64,
}

impl From<CpuState> for RawCpuState {
    fn from(s: CpuState) -> Self {
        Self {
            d: s.d,
            a: s.a,
            usp: s.usp,
            ssp: s.ssp,
            pc: s.pc,
            sr: s.sr,
            stopped: u8::from(s.stopped),
            halted: u8::from(s.halted),
            cycles: s.cycles,
        }
    }
}

impl From<RawCpuState> for CpuState {
    fn from(s: RawCpuState) -> Self {
        Self {
            d: s.d,
            a: s.a,
            usp: s.usp,
            ssp: s.ssp,
            pc: s.pc,
            sr: s.sr,
            stopped: s.stopped != 0,
            halted: s.halted != 0,
            cycles: s.cycles,
        }
    }
}

/// CPU module capability table.
#[repr(C)]
pub struct CpuInterface {
    pub header: ModuleHeader,
    pub init: unsafe extern "C" fn() -> i32,
    pub reset: unsafe extern "C" fn(),
    pub shutdown: unsafe extern "C" fn(),
    pub execute: unsafe extern "C" fn(budget: u32) -> u32,
    pub stop: unsafe extern "C" fn(),
    pub get_state: unsafe extern "C" fn(out: *mut RawCpuState),
    pub set_state: unsafe extern "C" fn(state: *const RawCpuState),
    pub set_irq: unsafe extern "C" fn(level: u8),
    pub set_nmi: unsafe extern "C" fn(),
    pub set_bus: unsafe extern "C" fn(bus: *const BusInterface),
}

/// Video module capability table.
#[repr(C)]
pub struct VideoInterface {
    pub header: ModuleHeader,
    pub init: unsafe extern "C" fn() -> i32,
    pub reset: unsafe extern "C" fn(),
    pub shutdown: unsafe extern "C" fn(),
    pub render_scanline: unsafe extern "C" fn(line: u32, out: *mut u32, pixels: u32),
    pub render_frame: unsafe extern "C" fn(out: *mut u32, pixels: u32),
    pub get_hpos: unsafe extern "C" fn() -> u32,
    pub get_vpos: unsafe extern "C" fn() -> u32,
    pub in_vblank: unsafe extern "C" fn() -> u8,
    pub in_hblank: unsafe extern "C" fn() -> u8,
    pub read_reg: unsafe extern "C" fn(offset: u32) -> u8,
    pub write_reg: unsafe extern "C" fn(offset: u32, value: u8),
    pub get_mode: unsafe extern "C" fn() -> u8,
    pub clock: unsafe extern "C" fn(cycles: u32),
}

/// Audio module capability table.
#[repr(C)]
pub struct AudioInterface {
    pub header: ModuleHeader,
    pub init: unsafe extern "C" fn(sample_rate: u32) -> i32,
    pub reset: unsafe extern "C" fn(),
    pub shutdown: unsafe extern "C" fn(),
    pub generate: unsafe extern "C" fn(out: *mut i16, samples: u32),
    pub read_reg: unsafe extern "C" fn(offset: u32) -> u8,
    pub write_reg: unsafe extern "C" fn(offset: u32, value: u8),
    pub clock: unsafe extern "C" fn(cycles: u32),
}

/// I/O module capability table.
#[repr(C)]
pub struct IoInterface {
    pub header: ModuleHeader,
    pub init: unsafe extern "C" fn() -> i32,
    pub reset: unsafe extern "C" fn(),
    pub shutdown: unsafe extern "C" fn(),
    pub read_byte: unsafe extern "C" fn(offset: u32) -> u8,
    pub read_word: unsafe extern "C" fn(offset: u32) -> u16,
    pub write_byte: unsafe extern "C" fn(offset: u32, value: u8),
    pub write_word: unsafe extern "C" fn(offset: u32, value: u16),
    pub clock: unsafe extern "C" fn(cycles: u32),
    pub irq_pending: unsafe extern "C" fn() -> u8,
    pub get_vector: unsafe extern "C" fn() -> u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::NullBus;

    #[test]
    fn bridge_reads_pass_through() {
        let mut bus = NullBus;
        let mut bridge = BusBridge::new(&mut bus);
        let table = bridge.interface();
        // SAFETY: calling the table we just built over a live bridge.
        unsafe {
            assert_eq!((table.read_byte)(table.context, 0x100), 0xFF);
            assert_eq!((table.read_word)(table.context, 0x100), 0xFFFF);
            (table.write_long)(table.context, 0x100, 0xDEAD_BEEF);
        }
        assert!(bridge.pending_fault.is_none());
    }

    #[test]
    fn module_header_version_unpacks() {
        let header = ModuleHeader {
            interface_version: 0x0001_0002,
            name: std::ptr::null(),
        };
        assert_eq!(header.version(), InterfaceVersion::new(1, 2));
        // SAFETY: null name is allowed.
        assert_eq!(unsafe { header.name() }, None);
    }
}
