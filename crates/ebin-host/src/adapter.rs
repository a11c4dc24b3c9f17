//! Trait adapters over native capability tables.
//!
//! Each adapter owns its [`LoadedModule`], so the executable region
//! outlives every call through the table, and shutdown runs exactly once
//! when the adapter drops. The machine composes these behind the same
//! trait objects as the built-in components.

use emu_core::{
    AudioModule, BusPort, CpuModule, CpuState, InterfaceVersion, IoModule, VideoMode, VideoModule,
};

use crate::LoadError;
use crate::abi::{AudioInterface, BusBridge, CpuInterface, IoInterface, RawCpuState, VideoInterface};
use crate::loader::LoadedModule;

fn leak_name(module: &LoadedModule) -> &'static str {
    // SAFETY: the name pointer lives in the module's sealed image; the
    // adapter keeps that image alive for its own lifetime, and adapters
    // are only dropped with the machine.
    let name = unsafe { module.table().as_ref().name() };
    name.map_or("module", |n| Box::leak(n.to_owned().into_boxed_str()))
}

macro_rules! table {
    ($self:ident, $ty:ty) => {
        // SAFETY: the table pointer was produced by this module's entry
        // function and the image it points into is owned by `$self`.
        unsafe { &*$self.module.table().as_ptr().cast::<$ty>() }
    };
}

/// A CPU loaded from an EBIN container.
pub struct NativeCpu {
    module: LoadedModule,
    name: &'static str,
}

impl NativeCpu {
    pub fn new(module: LoadedModule) -> Result<Self, LoadError> {
        let name = leak_name(&module);
        let cpu = Self { module, name };
        // SAFETY: calling into the sealed image.
        unsafe {
            ((table!(cpu, CpuInterface)).init)();
        }
        Ok(cpu)
    }
}

impl CpuModule for NativeCpu {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> InterfaceVersion {
        self.module.table_version()
    }

    fn reset(&mut self, bus: &mut dyn BusPort) {
        let mut bridge = BusBridge::new(bus);
        let table = bridge.interface();
        // SAFETY: the bridge outlives both calls; the module samples the
        // bus table before returning from reset.
        unsafe {
            ((table!(self, CpuInterface)).set_bus)(&raw const table);
            ((table!(self, CpuInterface)).reset)();
        }
    }

    fn execute(&mut self, bus: &mut dyn BusPort, budget: u32) -> u32 {
        let mut bridge = BusBridge::new(bus);
        let table = bridge.interface();
        // SAFETY: the bridge is pinned on this frame for the whole slice.
        unsafe {
            ((table!(self, CpuInterface)).set_bus)(&raw const table);
            ((table!(self, CpuInterface)).execute)(budget)
        }
    }

    fn stop(&mut self) {
        // SAFETY: plain table call.
        unsafe { ((table!(self, CpuInterface)).stop)() }
    }

    fn set_irq(&mut self, level: u8) {
        // SAFETY: plain table call.
        unsafe { ((table!(self, CpuInterface)).set_irq)(level) }
    }

    fn state(&self) -> CpuState {
        let mut out = RawCpuState::default();
        // SAFETY: out-pointer to a live local.
        unsafe { ((table!(self, CpuInterface)).get_state)(&raw mut out) };
        out.into()
    }

    fn set_state(&mut self, state: &CpuState) {
        let snapshot: RawCpuState = (*state).into();
        // SAFETY: in-pointer to a live local.
        unsafe { ((table!(self, CpuInterface)).set_state)(&raw const snapshot) }
    }
}

impl Drop for NativeCpu {
    fn drop(&mut self) {
        // SAFETY: final call before the image unmaps.
        unsafe { ((table!(self, CpuInterface)).shutdown)() }
    }
}

/// An I/O chip loaded from an EBIN container.
pub struct NativeIo {
    module: LoadedModule,
    name: &'static str,
}

impl NativeIo {
    pub fn new(module: LoadedModule) -> Result<Self, LoadError> {
        let name = leak_name(&module);
        let io = Self { module, name };
        // SAFETY: calling into the sealed image.
        unsafe {
            ((table!(io, IoInterface)).init)();
        }
        Ok(io)
    }
}

impl IoModule for NativeIo {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> InterfaceVersion {
        self.module.table_version()
    }

    fn reset(&mut self) {
        // SAFETY: plain table calls throughout.
        unsafe { ((table!(self, IoInterface)).reset)() }
    }

    fn shutdown(&mut self) {
        unsafe { ((table!(self, IoInterface)).shutdown)() }
    }

    fn read_byte(&mut self, offset: u32) -> u8 {
        unsafe { ((table!(self, IoInterface)).read_byte)(offset) }
    }

    fn write_byte(&mut self, offset: u32, value: u8) {
        unsafe { ((table!(self, IoInterface)).write_byte)(offset, value) }
    }

    fn read_word(&mut self, offset: u32) -> u16 {
        unsafe { ((table!(self, IoInterface)).read_word)(offset) }
    }

    fn write_word(&mut self, offset: u32, value: u16) {
        unsafe { ((table!(self, IoInterface)).write_word)(offset, value) }
    }

    fn clock(&mut self, cycles: u32) {
        unsafe { ((table!(self, IoInterface)).clock)(cycles) }
    }

    fn irq_pending(&self) -> bool {
        unsafe { ((table!(self, IoInterface)).irq_pending)() != 0 }
    }

    fn irq_vector(&mut self) -> Option<u8> {
        let raw = unsafe { ((table!(self, IoInterface)).get_vector)() };
        // Vectors are 8-bit; the upper byte flags "no vector supplied"
        if raw & 0xFF00 == 0 { Some(raw as u8) } else { None }
    }
}

/// A video controller loaded from an EBIN container.
///
/// Native renderers fetch pixel data through the bus they were
/// initialised with, so the RAM slice the trait offers goes unused.
pub struct NativeVideo {
    module: LoadedModule,
    name: &'static str,
}

impl NativeVideo {
    pub fn new(module: LoadedModule) -> Result<Self, LoadError> {
        let name = leak_name(&module);
        let video = Self { module, name };
        // SAFETY: calling into the sealed image.
        unsafe {
            ((table!(video, VideoInterface)).init)();
        }
        Ok(video)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl VideoModule for NativeVideo {
    fn render_scanline(&mut self, _ram: &[u8], line: u32, framebuffer: &mut [u32]) {
        // SAFETY: out-buffer length is passed alongside the pointer.
        unsafe {
            ((table!(self, VideoInterface)).render_scanline)(
                line,
                framebuffer.as_mut_ptr(),
                framebuffer.len() as u32,
            );
        }
    }

    fn render_frame(&mut self, _ram: &[u8], framebuffer: &mut [u32]) {
        // SAFETY: as above.
        unsafe {
            ((table!(self, VideoInterface)).render_frame)(
                framebuffer.as_mut_ptr(),
                framebuffer.len() as u32,
            );
        }
    }

    fn frame_size(&self) -> (u32, u32) {
        match self.mode() {
            VideoMode::Low => (320, 200),
            VideoMode::Medium => (640, 200),
            VideoMode::High => (640, 400),
        }
    }

    fn hpos(&self) -> u32 {
        // SAFETY: plain table calls throughout.
        unsafe { ((table!(self, VideoInterface)).get_hpos)() }
    }

    fn vpos(&self) -> u32 {
        unsafe { ((table!(self, VideoInterface)).get_vpos)() }
    }

    fn in_vblank(&self) -> bool {
        unsafe { ((table!(self, VideoInterface)).in_vblank)() != 0 }
    }

    fn in_hblank(&self) -> bool {
        unsafe { ((table!(self, VideoInterface)).in_hblank)() != 0 }
    }

    fn mode(&self) -> VideoMode {
        match unsafe { ((table!(self, VideoInterface)).get_mode)() } {
            1 => VideoMode::Medium,
            2 => VideoMode::High,
            _ => VideoMode::Low,
        }
    }
}

impl IoModule for NativeVideo {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> InterfaceVersion {
        self.module.table_version()
    }

    fn reset(&mut self) {
        // SAFETY: plain table calls throughout.
        unsafe { ((table!(self, VideoInterface)).reset)() }
    }

    fn shutdown(&mut self) {
        unsafe { ((table!(self, VideoInterface)).shutdown)() }
    }

    fn read_byte(&mut self, offset: u32) -> u8 {
        unsafe { ((table!(self, VideoInterface)).read_reg)(offset) }
    }

    fn write_byte(&mut self, offset: u32, value: u8) {
        unsafe { ((table!(self, VideoInterface)).write_reg)(offset, value) }
    }

    fn clock(&mut self, cycles: u32) {
        unsafe { ((table!(self, VideoInterface)).clock)(cycles) }
    }

    fn as_video(&mut self) -> Option<&mut dyn VideoModule> {
        Some(self)
    }
}

/// A sample generator loaded from an EBIN container.
pub struct NativeAudio {
    module: LoadedModule,
    name: &'static str,
}

impl NativeAudio {
    pub fn new(module: LoadedModule, sample_rate: u32) -> Result<Self, LoadError> {
        let name = leak_name(&module);
        let audio = Self { module, name };
        // SAFETY: calling into the sealed image.
        unsafe {
            ((table!(audio, AudioInterface)).init)(sample_rate);
        }
        Ok(audio)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl AudioModule for NativeAudio {
    fn set_sample_rate(&mut self, rate: u32) {
        // SAFETY: re-init with the new rate, per the audio contract.
        unsafe { ((table!(self, AudioInterface)).init)(rate) };
    }

    fn generate(&mut self, out: &mut [i16]) {
        // SAFETY: out-buffer length passed alongside the pointer.
        unsafe {
            ((table!(self, AudioInterface)).generate)(out.as_mut_ptr(), out.len() as u32);
        }
    }
}

impl IoModule for NativeAudio {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> InterfaceVersion {
        self.module.table_version()
    }

    fn reset(&mut self) {
        // SAFETY: plain table calls throughout.
        unsafe { ((table!(self, AudioInterface)).reset)() }
    }

    fn shutdown(&mut self) {
        unsafe { ((table!(self, AudioInterface)).shutdown)() }
    }

    fn read_byte(&mut self, offset: u32) -> u8 {
        unsafe { ((table!(self, AudioInterface)).read_reg)(offset) }
    }

    fn write_byte(&mut self, offset: u32, value: u8) {
        unsafe { ((table!(self, AudioInterface)).write_reg)(offset, value) }
    }

    fn clock(&mut self, cycles: u32) {
        unsafe { ((table!(self, AudioInterface)).clock)(cycles) }
    }

    fn as_audio(&mut self) -> Option<&mut dyn AudioModule> {
        Some(self)
    }
}
