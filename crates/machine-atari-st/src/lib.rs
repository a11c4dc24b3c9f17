//! The Atari ST machine.
//!
//! Composes a CPU slot, a video slot and any number of audio and I/O
//! slots (built-in components or EBIN modules) over the ST memory map,
//! drives them per frame from one cooperative scheduler, and aggregates
//! interrupts through GLUE. Machine profiles are JSON documents naming
//! the module that fills each slot.

mod builtin;
mod machine;
mod memory;
mod profile;
mod scheduler;

use std::path::PathBuf;

use thiserror::Error;

pub use machine::{FrameOutput, HOST_INTERFACE, Machine, find_profile};
pub use memory::{IO_BASE, IO_END, MAX_IO_REGIONS, MAX_RAM, ROM_BASE, ROM_END, StMemoryMap};
pub use profile::{Profile, ProfileError, SlotEntry, VideoStandard};
pub use scheduler::{Command, EmulatorHandle, Scheduler, SchedulerStats};

#[derive(Debug, Error)]
pub enum MachineError {
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Load(#[from] ebin_host::LoadError),
    #[error("TOS image not found: {0}")]
    TosNotFound(PathBuf),
    #[error("reading TOS {path}: {source}")]
    TosIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("RAM size {0} KiB outside 128..=4096")]
    BadRamSize(u32),
    #[error("I/O range {base:#x}..{end:#x} outside the I/O window")]
    IoRangeOutsideWindow { base: u32, end: u32 },
    #[error("I/O range {base:#x}..{end:#x} overlaps {name}")]
    IoRangeOverlap {
        base: u32,
        end: u32,
        name: &'static str,
    },
    #[error("I/O handler table full ({MAX_IO_REGIONS} entries)")]
    IoTableFull,
    #[error("no built-in component or module file named {0:?}")]
    UnknownComponent(String),
    #[error("slot {slot} cannot take a {found:?} module")]
    SlotTypeMismatch {
        slot: &'static str,
        found: format_ebin::ComponentType,
    },
    #[error("machine is {actual}; operation needs {needed}")]
    InvalidState {
        needed: &'static str,
        actual: &'static str,
    },
}
