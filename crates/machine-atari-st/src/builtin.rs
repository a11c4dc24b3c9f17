//! Built-in components and slot wiring.
//!
//! A profile slot names a module file. When the file exists on the
//! module path it is loaded as an EBIN; otherwise the file stem selects
//! the statically linked implementation here, so a machine boots from a
//! bare filesystem and EBIN files remain the hot-swap override.
//!
//! The wiring table maps a slot's role tag to the bus address block the
//! machine registers it over.

use std::path::Path;

use atari_dma_fdc::DmaFdc;
use atari_mmu::Mmu;
use atari_shifter::Shifter;
use cpu_m68k::Cpu68000;
use ebin_host::{Loader, NativeAudio, NativeCpu, NativeIo, NativeVideo};
use emu_core::{CpuModule, IoModule};
use format_ebin::ComponentType;
use log::info;
use motorola_68901::Mfp68901;
use motorola_acia_6850::AciaPair;
use yamaha_ym2149::Ym2149;

use crate::MachineError;
use crate::profile::SlotEntry;

/// Bus address block for a role tag.
pub(crate) fn wiring_for_role(role: &str) -> Option<(u32, u32, &'static str)> {
    match role {
        "mmu" => Some((0xFF_8000, 0xFF_800F, "mmu")),
        "video" | "shifter" => Some((0xFF_8200, 0xFF_82FF, "shifter")),
        "dma" | "dma-fdc" | "fdc" => Some((0xFF_8600, 0xFF_860F, "dma-fdc")),
        "psg" | "ym2149" => Some((0xFF_8800, 0xFF_88FF, "psg")),
        "blitter" => Some((0xFF_8A00, 0xFF_8A3F, "blitter")),
        "mfp" | "mfp68901" => Some((0xFF_FA00, 0xFF_FA3F, "mfp")),
        "acia" => Some((0xFF_FC00, 0xFF_FC07, "acia")),
        _ => None,
    }
}

fn stem(file: &str) -> &str {
    file.split('.').next().unwrap_or(file)
}

/// Resolve the CPU slot: EBIN file if present, built-in otherwise.
pub(crate) fn resolve_cpu(
    loader: &mut Loader,
    module_dir: &Path,
    slot: &SlotEntry,
    available_ram: u32,
) -> Result<Box<dyn CpuModule>, MachineError> {
    let path = module_dir.join(&slot.file);
    if path.is_file() {
        let id = loader.load_component(&path, ComponentType::Cpu, available_ram)?;
        let module = loader.take_component(id)?;
        return Ok(Box::new(NativeCpu::new(module)?));
    }
    match stem(&slot.file) {
        "cpu68000" | "cpu-m68k" | "cpu" => Ok(Box::new(Cpu68000::new())),
        other => Err(MachineError::UnknownComponent(other.to_owned())),
    }
}

/// Resolve a non-CPU slot of the given expected type.
pub(crate) fn resolve_io(
    loader: &mut Loader,
    module_dir: &Path,
    slot: &SlotEntry,
    expected: ComponentType,
    available_ram: u32,
) -> Result<Box<dyn IoModule>, MachineError> {
    let path = module_dir.join(&slot.file);
    if path.is_file() {
        let id = loader.load_component(&path, expected, available_ram)?;
        let module = loader.take_component(id)?;
        info!("slot {:?} filled from {}", slot.file, path.display());
        return Ok(match expected {
            ComponentType::Video => Box::new(NativeVideo::new(module)?),
            ComponentType::Audio => Box::new(NativeAudio::new(module, 48_000)?),
            _ => Box::new(NativeIo::new(module)?),
        });
    }
    match stem(&slot.file) {
        "mmu" => Ok(Box::new(Mmu::new())),
        "shifter" | "video" => Ok(Box::new(Shifter::new())),
        "ym2149" | "psg" => Ok(Box::new(Ym2149::new())),
        "mfp68901" | "mfp" => Ok(Box::new(Mfp68901::new())),
        "acia" => Ok(Box::new(AciaPair::new())),
        "dma-fdc" | "dma" => Ok(Box::new(DmaFdc::new())),
        other => Err(MachineError::UnknownComponent(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_role_has_wiring() {
        for role in ["mmu", "shifter", "psg", "mfp", "acia", "dma"] {
            assert!(wiring_for_role(role).is_some(), "role {role}");
        }
        assert!(wiring_for_role("turboblitter").is_none());
    }

    #[test]
    fn wiring_blocks_sit_inside_the_io_window() {
        for role in ["mmu", "video", "dma", "psg", "mfp", "acia"] {
            let (base, end, _) = wiring_for_role(role).expect("wired");
            assert!(base >= crate::IO_BASE && end <= crate::IO_END);
            assert!(base < end);
        }
    }
}
