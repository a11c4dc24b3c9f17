//! The machine: slots, lifecycle, and the per-frame core loop.

use std::path::{Path, PathBuf};

use atari_glue::Glue;
use ebin_host::Loader;
use emu_core::{CpuModule, CpuState, InterfaceVersion};
use format_ebin::ComponentType;
use log::{info, warn};

use crate::builtin::{resolve_cpu, resolve_io, wiring_for_role};
use crate::memory::StMemoryMap;
use crate::profile::{Profile, SlotEntry, VideoStandard};
use crate::{MachineError, ProfileError};

/// Interface version this host requires of its modules.
pub const HOST_INTERFACE: InterfaceVersion = InterfaceVersion::new(1, 2);

/// Scheduler quantum: one scanline's worth of CPU cycles. Small enough
/// that HBL and MFP timer edges land on the right instruction
/// boundaries, large enough to stay out of the interpreter's way.
const QUANTUM: u32 = 512;

/// What one frame produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameOutput {
    pub cycles: u32,
    pub width: u32,
    pub height: u32,
}

/// A fully composed Atari ST.
pub struct Machine {
    profile: Profile,
    cpu: Box<dyn CpuModule>,
    map: StMemoryMap,
    glue: Glue,
    loader: Loader,
    module_dir: PathBuf,
    video_region: usize,
    audio_regions: Vec<usize>,
    mfp_region: Option<usize>,
    acia_region: Option<usize>,
    sample_rate: u32,
    running: bool,
    framebuffer: Vec<u32>,
    frame_size: (u32, u32),
    scratch: Vec<i16>,
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("profile", &self.profile)
            .field("cpu", &self.cpu.name())
            .field("glue", &self.glue)
            .field("loader", &self.loader)
            .field("module_dir", &self.module_dir)
            .field("running", &self.running)
            .field("frame_size", &self.frame_size)
            .finish_non_exhaustive()
    }
}

impl Machine {
    /// Compose a machine from a profile.
    ///
    /// Slot order is fixed: CPU, MMU, video, audio in declared order,
    /// I/O in declared order. Any failure unwinds completely; there is
    /// no partially loaded machine.
    pub fn load(
        profile: Profile,
        module_dir: &Path,
        tos_dir: &Path,
        sample_rate: u32,
    ) -> Result<Self, MachineError> {
        let ram_bytes = profile.ram_bytes();
        let mut map = StMemoryMap::new(ram_bytes);

        let tos_path = tos_dir.join(&profile.memory.tos_file);
        match std::fs::read(&tos_path) {
            Ok(rom) => {
                info!("TOS {} ({} KiB)", tos_path.display(), rom.len() / 1024);
                map.load_rom(rom);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if profile.memory.tos_required {
                    return Err(MachineError::TosNotFound(tos_path));
                }
                warn!("running without TOS: {} absent", tos_path.display());
            }
            Err(source) => {
                return Err(MachineError::TosIo {
                    path: tos_path,
                    source,
                });
            }
        }

        let mut loader = Loader::new(HOST_INTERFACE);
        let cpu = resolve_cpu(&mut loader, module_dir, &profile.components.cpu, ram_bytes)?;

        let mut audio_regions = Vec::new();
        let mut mfp_region = None;
        let mut acia_region = None;

        let mut register = |map: &mut StMemoryMap,
                            loader: &mut Loader,
                            slot: &SlotEntry,
                            expected: ComponentType|
         -> Result<Option<usize>, MachineError> {
            let module = match resolve_io(loader, module_dir, slot, expected, ram_bytes) {
                Ok(module) => module,
                Err(e) if slot.optional => {
                    info!("optional slot {:?} skipped: {e}", slot.file);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };
            let (base, end, name) = wiring_for_role(slot.role())
                .ok_or_else(|| MachineError::UnknownComponent(slot.role().to_owned()))?;
            Ok(Some(map.register_io(base, end, name, module)?))
        };

        register(&mut map, &mut loader, &profile.components.mmu, ComponentType::Io)?;
        let video_region = register(
            &mut map,
            &mut loader,
            &profile.components.video,
            ComponentType::Video,
        )?
        .ok_or_else(|| MachineError::UnknownComponent("video".into()))?;
        if let Some(slot) = &profile.components.blitter {
            // No built-in blitter exists; this slot only fills from an
            // EBIN module, and is normally marked optional.
            register(&mut map, &mut loader, slot, ComponentType::Io)?;
        }
        for slot in &profile.components.audio {
            if let Some(idx) = register(&mut map, &mut loader, slot, ComponentType::Audio)? {
                audio_regions.push(idx);
            }
        }
        for slot in &profile.components.io {
            if let Some(idx) = register(&mut map, &mut loader, slot, ComponentType::Io)? {
                match map.region_name(idx) {
                    Some("mfp") => mfp_region = Some(idx),
                    Some("acia") => acia_region = Some(idx),
                    _ => {}
                }
            }
        }

        let glue = Glue::new(profile.video_standard == VideoStandard::Pal);
        let mut machine = Self {
            profile,
            cpu,
            map,
            glue,
            loader,
            module_dir: module_dir.to_path_buf(),
            video_region,
            audio_regions,
            mfp_region,
            acia_region,
            sample_rate,
            running: false,
            framebuffer: Vec::new(),
            frame_size: (0, 0),
            scratch: Vec::new(),
        };
        machine.init_audio();
        machine.reset();
        machine.running = true;
        info!(
            "machine {} up: {} KiB RAM, {} I/O regions",
            machine.profile.machine,
            machine.profile.memory.ram_kb,
            machine.map.region_count(),
        );
        Ok(machine)
    }

    fn init_audio(&mut self) {
        let rate = self.sample_rate;
        for &idx in &self.audio_regions {
            if let Some(audio) = self.map.module_mut(idx).as_audio() {
                audio.set_sample_rate(rate);
            }
        }
    }

    /// Full machine reset: RAM cleared, ROM overlay applied, every chip
    /// reset, then the CPU fetches its vectors from address 0.
    pub fn reset(&mut self) {
        self.map.reset();
        self.map.reset_modules();
        self.glue.reset();
        self.init_audio();
        self.cpu.reset(&mut self.map);
        self.refresh_frame_size();
    }

    fn refresh_frame_size(&mut self) {
        if let Some(video) = self.map.module_mut(self.video_region).as_video() {
            let size = video.frame_size();
            self.frame_size = size;
            self.framebuffer
                .resize((size.0 * size.1) as usize, 0xFF00_0000);
        }
    }

    /// Run one frame of emulated time.
    ///
    /// The frame is sliced into scanline quanta: execute, clock the
    /// chips with the cycles actually consumed, then let GLUE re-raise
    /// the interrupt level so the CPU samples it on its next boundary.
    pub fn run_frame(&mut self) -> FrameOutput {
        let frame_cycles = self.glue.cycles_per_frame();
        let mut total = 0u32;
        while total < frame_cycles {
            let quantum = QUANTUM.min(frame_cycles - total);
            let consumed = self.cpu.execute(&mut self.map, quantum);
            self.map.clock_all(consumed);

            if let (Some(acia), Some(mfp)) = (self.acia_region, self.mfp_region) {
                // ACIA IRQ rides GPIP line 4, active low
                let irq = self.map.module(acia).irq_pending();
                self.map.module_mut(mfp).set_input_line(4, !irq);
            }
            let mfp_pending = self
                .mfp_region
                .is_some_and(|idx| self.map.module(idx).irq_pending());
            if let Some(level) = self.glue.clock(consumed, mfp_pending) {
                self.cpu.set_irq(level);
            }
            total += consumed.max(1);
        }

        self.refresh_frame_size();
        let video = self.video_region;
        self.map.render_frame(video, &mut self.framebuffer);
        FrameOutput {
            cycles: total,
            width: self.frame_size.0,
            height: self.frame_size.1,
        }
    }

    /// Fill `out` with one frame's worth of PCM, mixing every audio slot.
    pub fn generate_audio(&mut self, out: &mut [i16]) {
        out.fill(0);
        if self.audio_regions.is_empty() {
            return;
        }
        self.scratch.resize(out.len(), 0);
        for i in 0..self.audio_regions.len() {
            let idx = self.audio_regions[i];
            let scratch = &mut self.scratch;
            if let Some(audio) = self.map.module_mut(idx).as_audio() {
                audio.generate(scratch);
                for (acc, &s) in out.iter_mut().zip(scratch.iter()) {
                    *acc = acc.saturating_add(s);
                }
            }
        }
    }

    /// Deliver a keyboard scancode; release is the make code with the
    /// top bit set, the IKBD convention.
    pub fn key_event(&mut self, code: u8, pressed: bool) {
        if let Some(acia) = self.acia_region {
            let byte = if pressed { code & 0x7F } else { code | 0x80 };
            self.map.module_mut(acia).receive_byte(0, byte);
        }
    }

    /// Swap the CPU slot for a different module. Only callable while the
    /// scheduler has the machine paused; the old core drops (shutting a
    /// native module down and unmapping it) before the new one loads.
    pub fn swap_cpu(&mut self, slot: &SlotEntry) -> Result<(), MachineError> {
        let ram = self.profile.ram_bytes();
        let cpu = resolve_cpu(&mut self.loader, &self.module_dir, slot, ram)?;
        let old = std::mem::replace(&mut self.cpu, cpu);
        drop(old);
        self.cpu.reset(&mut self.map);
        info!("CPU slot now {}", self.cpu.name());
        Ok(())
    }

    /// Swap a peripheral slot: shutdown, unload, load, init, reset, in
    /// that order. The replacement takes over the old module's bus range.
    pub fn swap_io(
        &mut self,
        slot: &SlotEntry,
        expected: ComponentType,
    ) -> Result<(), MachineError> {
        let ram = self.profile.ram_bytes();
        let (_, _, name) = wiring_for_role(slot.role())
            .ok_or_else(|| MachineError::UnknownComponent(slot.role().to_owned()))?;
        let index = self
            .map
            .region_index(name)
            .ok_or_else(|| MachineError::UnknownComponent(name.to_owned()))?;
        let mut module = resolve_io(&mut self.loader, &self.module_dir, slot, expected, ram)?;
        module.reset();
        let mut old = self.map.replace_module(index, module);
        old.shutdown();
        drop(old);
        self.init_audio();
        info!("slot {name} swapped");
        Ok(())
    }

    #[must_use]
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn framebuffer(&self) -> &[u32] {
        &self.framebuffer
    }

    #[must_use]
    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    #[must_use]
    pub fn cpu_state(&self) -> CpuState {
        self.cpu.state()
    }

    pub fn set_cpu_state(&mut self, state: &CpuState) {
        self.cpu.set_state(state);
    }

    #[must_use]
    pub fn scanline(&self) -> u32 {
        self.glue.scanline()
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.glue.frame_count()
    }

    #[must_use]
    pub fn cycles_per_frame(&self) -> u32 {
        self.glue.cycles_per_frame()
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples one frame is worth at the configured rate.
    #[must_use]
    pub fn samples_per_frame(&self) -> usize {
        let clock = u64::from(self.profile.cpu_clock_hz());
        (u64::from(self.sample_rate) * u64::from(self.cycles_per_frame()) / clock) as usize
    }

    /// Direct bus access for tests and the debug surface.
    pub fn bus(&mut self) -> &mut StMemoryMap {
        &mut self.map
    }

    /// Tear the machine down, releasing modules in reverse acquisition
    /// order. Consumes the machine; a fresh `load` builds the next one.
    pub fn unload(mut self) {
        self.running = false;
        info!("machine {} unloaded", self.profile.machine);
        // Drop order: cpu and map (with its modules) fall out of scope
        // here, native adapters run their shutdowns, the loader unmaps.
    }
}

impl Drop for Machine {
    fn drop(&mut self) {
        self.running = false;
    }
}

/// Find a profile JSON by machine id inside a directory.
pub fn find_profile(dir: &Path, machine_id: &str) -> Result<Profile, ProfileError> {
    let path = dir.join(format!("{machine_id}.json"));
    Profile::from_path(&path)
}
