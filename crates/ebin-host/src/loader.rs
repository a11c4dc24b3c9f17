//! Container loading: reserve, copy, relocate, seal, enter, register.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use emu_core::InterfaceVersion;
use format_ebin::{
    ComponentType, EbinFile, HEADER_SIZE, Header, RelocSection, RelocType,
};
use log::{debug, info};

use crate::abi::{ModuleEntry, ModuleHeader};
use crate::{ExecRegion, LoadError};

/// Fixed registry capacity; more live modules than this is a
/// configuration error, not a workload.
pub const MODULE_REGISTRY_SIZE: usize = 16;

/// Identifies a loaded module in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleId(usize);

/// A relocated image before its entry point has run.
///
/// Addresses are final: code at the region base, data immediately after,
/// zeroed BSS after that, all sealed read/execute.
#[derive(Debug)]
pub struct LoadedImage {
    pub header: Header,
    region: ExecRegion,
}

impl LoadedImage {
    #[must_use]
    pub fn code_base(&self) -> *const u8 {
        self.region.base()
    }

    #[must_use]
    pub fn data_base(&self) -> *const u8 {
        // SAFETY: data begins right after code inside the same region.
        unsafe { self.region.base().add(self.header.code_size as usize) }
    }

    #[must_use]
    pub fn bss_base(&self) -> *const u8 {
        // SAFETY: bss begins right after data inside the same region.
        unsafe {
            self.region
                .base()
                .add((self.header.code_size + self.header.data_size) as usize)
        }
    }

    /// The sealed image bytes (code then data then BSS).
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.region.as_slice()
    }
}

/// Build a live image from a parsed container: steps 4 through 9 of the
/// load sequence. The entry point is not called here.
pub fn load_image(ebin: &EbinFile) -> Result<LoadedImage, LoadError> {
    let header = ebin.header;
    let image_size = usize::try_from(header.image_size().div_ceil(8) * 8)
        .map_err(|_| LoadError::OutOfMemory(usize::MAX))?;
    let mut region = ExecRegion::allocate(image_size.max(8))?;

    // The container addresses a 32-bit space; patches wrap with the
    // truncated region base on wider hosts.
    let base = region.base() as usize as u32;
    {
        let bytes = region.as_mut_slice();
        let code_end = header.code_size as usize;
        let data_end = code_end + header.data_size as usize;
        bytes[..code_end].copy_from_slice(ebin.code());
        bytes[code_end..data_end].copy_from_slice(ebin.data());
        // BSS after data is already zero from the fresh mapping

        for reloc in ebin.relocs() {
            let section_start = match reloc.section {
                RelocSection::Code => 0,
                RelocSection::Data => code_end,
            };
            let at = section_start + reloc.offset as usize;
            match reloc.kind {
                RelocType::Absolute => {
                    let raw = u32::from_le_bytes([
                        bytes[at],
                        bytes[at + 1],
                        bytes[at + 2],
                        bytes[at + 3],
                    ]);
                    bytes[at..at + 4].copy_from_slice(&raw.wrapping_add(base).to_le_bytes());
                }
                RelocType::Relative => {}
                RelocType::High16 => {
                    let raw = u16::from_le_bytes([bytes[at], bytes[at + 1]]);
                    let patched = raw.wrapping_add((base >> 16) as u16);
                    bytes[at..at + 2].copy_from_slice(&patched.to_le_bytes());
                }
                RelocType::Low16 => {
                    let raw = u16::from_le_bytes([bytes[at], bytes[at + 1]]);
                    let patched = raw.wrapping_add(base as u16);
                    bytes[at..at + 2].copy_from_slice(&patched.to_le_bytes());
                }
            }
        }
    }

    region.make_executable()?;
    Ok(LoadedImage { header, region })
}

/// A registered module: image plus the capability table its entry
/// function returned.
#[derive(Debug)]
pub struct LoadedModule {
    pub path: PathBuf,
    pub image: LoadedImage,
    table: NonNull<ModuleHeader>,
}

impl LoadedModule {
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.image.header
    }

    /// Raw capability table. Cast to the concrete interface struct for
    /// the module's component type.
    #[must_use]
    pub fn table(&self) -> NonNull<ModuleHeader> {
        self.table
    }

    /// Interface version the table itself reports.
    #[must_use]
    pub fn table_version(&self) -> InterfaceVersion {
        // SAFETY: table points into the sealed image.
        unsafe { self.table.as_ref() }.version()
    }
}

/// The module host: loads, registers and unloads components.
#[derive(Debug)]
pub struct Loader {
    /// Interface version this host requires of modules.
    required: InterfaceVersion,
    slots: [Option<LoadedModule>; MODULE_REGISTRY_SIZE],
}

impl Loader {
    #[must_use]
    pub fn new(required: InterfaceVersion) -> Self {
        Self {
            required,
            slots: std::array::from_fn(|_| None),
        }
    }

    #[must_use]
    pub fn required_version(&self) -> InterfaceVersion {
        self.required
    }

    /// Full load sequence for one component file.
    ///
    /// On any failure every resource acquired on the way is released
    /// before returning; a failed load leaves no registry entry.
    pub fn load_component(
        &mut self,
        path: &Path,
        expected: ComponentType,
        available_ram: u32,
    ) -> Result<ModuleId, LoadError> {
        let bytes = std::fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                LoadError::NotFound(path.to_path_buf())
            } else {
                LoadError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let ebin = EbinFile::parse(&bytes)?;
        self.check_header(&ebin.header, expected, available_ram)?;

        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(LoadError::RegistryFull)?;

        let image = load_image(&ebin)?;

        // SAFETY: the image is sealed executable and the entry offset was
        // bounds-checked at parse time; the function signature is the
        // module contract.
        let table = unsafe {
            let entry: ModuleEntry = std::mem::transmute(
                image.code_base().add(ebin.header.entry_offset as usize),
            );
            entry()
        };
        let table = NonNull::new(table.cast_mut()).ok_or(LoadError::EntryReturnedNull)?;

        info!(
            "loaded {:?} module {} ({} code, {} data, {} bss)",
            ebin.header.component,
            path.display(),
            ebin.header.code_size,
            ebin.header.data_size,
            ebin.header.bss_size,
        );
        self.slots[slot] = Some(LoadedModule {
            path: path.to_path_buf(),
            image,
            table,
        });
        Ok(ModuleId(slot))
    }

    fn check_header(
        &self,
        header: &Header,
        expected: ComponentType,
        available_ram: u32,
    ) -> Result<(), LoadError> {
        if header.component != expected {
            return Err(LoadError::TypeMismatch {
                expected,
                found: header.component,
            });
        }
        let supplied = InterfaceVersion::new(header.interface_major(), header.interface_minor());
        if !supplied.satisfies(self.required) {
            return Err(LoadError::UnsupportedInterface {
                required: self.required,
                supplied,
            });
        }
        if header.min_ram > available_ram {
            return Err(LoadError::InsufficientRam {
                required: header.min_ram,
                available: available_ram,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<&LoadedModule> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// Move a module out of the registry, handing its lifetime to an
    /// adapter. The slot frees up immediately.
    pub fn take_component(&mut self, id: ModuleId) -> Result<LoadedModule, LoadError> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(LoadError::EmptySlot(id.0))
    }

    /// Drop a module and release its executable region.
    ///
    /// The caller must guarantee the module's code is not on any call
    /// stack; the machine pauses the scheduler before unloading.
    pub fn unload_component(&mut self, id: ModuleId) -> Result<(), LoadError> {
        let module = self
            .slots
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(LoadError::EmptySlot(id.0))?;
        debug!("unloaded module {}", module.path.display());
        Ok(())
    }

    /// Currently registered modules.
    pub fn list_components(&self) -> impl Iterator<Item = (ModuleId, &LoadedModule)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|m| (ModuleId(i), m)))
    }
}

/// Scan a directory for EBIN containers and report their headers.
pub fn scan_components(dir: &Path) -> std::io::Result<Vec<(PathBuf, Header)>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension() != Some(OsStr::new("ebin")) {
            continue;
        }
        let data = std::fs::read(&path)?;
        if data.len() < HEADER_SIZE {
            continue;
        }
        if let Ok(ebin) = EbinFile::parse(&data) {
            found.push((path, ebin.header));
        }
    }
    Ok(found)
}
