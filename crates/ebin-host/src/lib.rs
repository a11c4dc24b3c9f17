//! Host side of the EBIN module system.
//!
//! Takes a container off storage and turns it into live code: one
//! contiguous executable region holding code, data and BSS, relocations
//! applied, caches made coherent, and the module's entry function called
//! to obtain its capability table. Loaded modules sit in a fixed-size
//! registry until unloaded.
//!
//! The capability-table ABI the entry function returns is defined in
//! [`abi`]; [`NativeCpu`] and [`NativeIo`] wrap those raw tables in the
//! crate-level module traits so the machine treats loaded and built-in
//! components identically.

// Running foreign machine code is this crate's entire purpose; the raw
// mmap/mprotect and function-pointer calls live here and nowhere else.
#![allow(unsafe_code)]

pub mod abi;
mod adapter;
mod exec;
mod loader;

use std::path::PathBuf;

use thiserror::Error;

pub use adapter::{NativeAudio, NativeCpu, NativeIo, NativeVideo};
pub use exec::ExecRegion;
pub use loader::{
    LoadedImage, LoadedModule, Loader, MODULE_REGISTRY_SIZE, ModuleId, load_image,
    scan_components,
};

use emu_core::InterfaceVersion;
use format_ebin::{ComponentType, EbinError};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("module not found: {0}")]
    NotFound(PathBuf),
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Format(#[from] EbinError),
    #[error("expected a {expected:?} module, found {found:?}")]
    TypeMismatch {
        expected: ComponentType,
        found: ComponentType,
    },
    #[error("module interface {supplied} does not satisfy required {required}")]
    UnsupportedInterface {
        required: InterfaceVersion,
        supplied: InterfaceVersion,
    },
    #[error("module needs {required} bytes of machine RAM, have {available}")]
    InsufficientRam { required: u32, available: u32 },
    #[error("executable memory exhausted ({0} bytes requested)")]
    OutOfMemory(usize),
    #[error("host refuses executable mappings")]
    NoExecutableMemory,
    #[error("module registry full ({MODULE_REGISTRY_SIZE} slots)")]
    RegistryFull,
    #[error("module entry function returned null")]
    EntryReturnedNull,
    #[error("no module loaded in slot {0}")]
    EmptySlot(usize),
}
