//! Capability traits for the machine's pluggable modules.
//!
//! One CPU slot, one video slot, and any number of audio and I/O slots
//! make up a machine. The memory map owns the bus-visible modules and
//! dispatches register accesses by range; the scheduler clocks every
//! module with the cycles the CPU actually consumed.
//!
//! Modules never hold a reference back to the CPU. A chip that wants an
//! interrupt reports `irq_pending()` and the GLUE aggregation turns that
//! into a level on the CPU's IRQ input.

use crate::bus::BusPort;
use crate::state::CpuState;
use crate::version::InterfaceVersion;

/// A CPU core: executes against a bus, counts cycles, takes interrupts.
pub trait CpuModule {
    fn name(&self) -> &'static str;

    fn version(&self) -> InterfaceVersion;

    /// Hardware reset: load SSP from address 0 and PC from address 4,
    /// enter supervisor mode with the interrupt mask at 7.
    fn reset(&mut self, bus: &mut dyn BusPort);

    /// Run until at least `budget` cycles are consumed (overshooting by at
    /// most one instruction) or the CPU halts. Returns cycles consumed.
    fn execute(&mut self, bus: &mut dyn BusPort, budget: u32) -> u32;

    /// Externally induced halt. Cleared by `reset`.
    fn stop(&mut self);

    /// Set the pending interrupt request level; 0 withdraws the request.
    fn set_irq(&mut self, level: u8);

    fn set_nmi(&mut self) {
        self.set_irq(7);
    }

    fn state(&self) -> CpuState;

    fn set_state(&mut self, state: &CpuState);
}

/// Shifter video mode as seen in the resolution register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoMode {
    /// 320x200, 4 planes, 16 colours.
    #[default]
    Low,
    /// 640x200, 2 planes, 4 colours.
    Medium,
    /// 640x400, 1 plane, monochrome.
    High,
}

/// Register-side video controller plus frame rendering.
///
/// Rendering reads pixel data straight out of machine RAM (the chip's DMA
/// view); the machine passes its RAM slice so the renderer never owns a
/// bus reference.
pub trait VideoModule {
    fn render_scanline(&mut self, ram: &[u8], line: u32, framebuffer: &mut [u32]);

    fn render_frame(&mut self, ram: &[u8], framebuffer: &mut [u32]);

    /// Output resolution of the framebuffer in pixels.
    fn frame_size(&self) -> (u32, u32);

    fn hpos(&self) -> u32;

    fn vpos(&self) -> u32;

    fn in_vblank(&self) -> bool;

    fn in_hblank(&self) -> bool;

    fn mode(&self) -> VideoMode;
}

/// PCM sample generator.
pub trait AudioModule {
    /// Host output rate in Hz. Called once before the first `generate`.
    fn set_sample_rate(&mut self, rate: u32);

    /// Fill `out` with signed 16-bit mono samples.
    fn generate(&mut self, out: &mut [i16]);
}

/// A bus-visible peripheral: register file plus a cycle clock.
///
/// Offsets are relative to the base the machine registered the module at.
/// Word accessors default to big-endian byte pairs, which matches how the
/// narrow ST peripherals sit on the 16-bit bus.
pub trait IoModule {
    fn name(&self) -> &'static str;

    fn version(&self) -> InterfaceVersion;

    fn reset(&mut self);

    fn shutdown(&mut self) {}

    fn read_byte(&mut self, offset: u32) -> u8;

    fn write_byte(&mut self, offset: u32, value: u8);

    fn read_word(&mut self, offset: u32) -> u16 {
        u16::from(self.read_byte(offset)) << 8 | u16::from(self.read_byte(offset | 1))
    }

    fn write_word(&mut self, offset: u32, value: u16) {
        self.write_byte(offset, (value >> 8) as u8);
        self.write_byte(offset | 1, value as u8);
    }

    /// Advance the chip by `cycles` consumed CPU cycles.
    fn clock(&mut self, cycles: u32);

    /// True while the chip has an unmasked interrupt waiting.
    fn irq_pending(&self) -> bool {
        false
    }

    /// Device-supplied vector for an interrupt acknowledge, if this chip
    /// answers IACK cycles (the MFP does; everything else autovectors).
    fn irq_vector(&mut self) -> Option<u8> {
        None
    }

    /// Drive one of the chip's input pins (the MFP's GPIP lines). The
    /// machine uses this to wire chip outputs to chip inputs without the
    /// chips holding references to each other.
    fn set_input_line(&mut self, _line: u8, _level: bool) {}

    /// Deliver a byte on a serial input (the ACIAs' receive side);
    /// channel 0 is the keyboard link, 1 the MIDI link.
    fn receive_byte(&mut self, _channel: u32, _value: u8) {}

    /// Video capability of this module, if it has one.
    fn as_video(&mut self) -> Option<&mut dyn VideoModule> {
        None
    }

    /// Audio capability of this module, if it has one.
    fn as_audio(&mut self) -> Option<&mut dyn AudioModule> {
        None
    }
}
