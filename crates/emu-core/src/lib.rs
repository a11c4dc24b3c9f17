//! Shared contracts for the ST emulator core.
//!
//! Everything that crosses a module boundary crosses through this crate:
//! the big-endian 68000 bus contract, the module capability traits, and
//! the interface-version discipline the loader enforces.

mod bus;
mod module;
mod state;
mod version;

pub use bus::{AUTOVECTOR_BASE, BusFault, BusPort, BusResult, FaultKind, NullBus, ensure_even};
pub use module::{AudioModule, CpuModule, IoModule, VideoMode, VideoModule};
pub use state::CpuState;
pub use version::InterfaceVersion;
