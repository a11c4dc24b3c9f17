//! The emulation task's outer loop and its cross-task plumbing.
//!
//! The core is single threaded: one scheduler owns the machine and runs
//! it a frame at a time. Other tasks talk to it through lock-free
//! single-producer single-consumer rings:
//!
//! - commands flow in and are drained once, at the top of each frame;
//! - finished frames and PCM chunks flow out through shallow rings; if
//!   the consumer is still busy the new buffer is dropped and counted,
//!   the emulator never blocks.

use log::info;
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};

use crate::machine::Machine;

/// Commands the API surface may deposit for the emulation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Pause,
    Resume,
    Reset,
    Key { code: u8, pressed: bool },
}

/// Drop and throughput counters, readable after every frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    pub frames_run: u64,
    pub frames_dropped: u64,
    pub sample_chunks_dropped: u64,
}

/// The far end of the scheduler's rings, held by the API/emitter tasks.
pub struct EmulatorHandle {
    commands: HeapProd<Command>,
    frames: HeapCons<Vec<u32>>,
    samples: HeapCons<Vec<i16>>,
}

impl EmulatorHandle {
    /// Deposit a command; false when the ring is full.
    pub fn send(&mut self, command: Command) -> bool {
        self.commands.try_push(command).is_ok()
    }

    /// Take the next finished frame, if one is ready.
    pub fn take_frame(&mut self) -> Option<Vec<u32>> {
        self.frames.try_pop()
    }

    /// Take the next PCM chunk, if one is ready.
    pub fn take_samples(&mut self) -> Option<Vec<i16>> {
        self.samples.try_pop()
    }
}

/// Runs the machine; owns everything the emulated hardware touches.
pub struct Scheduler {
    machine: Machine,
    running: bool,
    paused: bool,
    commands: HeapCons<Command>,
    frames: HeapProd<Vec<u32>>,
    samples: HeapProd<Vec<i16>>,
    stats: SchedulerStats,
}

impl Scheduler {
    /// Wrap a loaded machine. Returns the scheduler and the handle the
    /// API and emitter tasks keep.
    pub fn new(machine: Machine) -> (Self, EmulatorHandle) {
        let (cmd_prod, cmd_cons) = HeapRb::<Command>::new(64).split();
        // Two slots: one being emitted, one being produced
        let (frame_prod, frame_cons) = HeapRb::<Vec<u32>>::new(2).split();
        let (sample_prod, sample_cons) = HeapRb::<Vec<i16>>::new(4).split();
        (
            Self {
                machine,
                running: true,
                paused: false,
                commands: cmd_cons,
                frames: frame_prod,
                samples: sample_prod,
                stats: SchedulerStats::default(),
            },
            EmulatorHandle {
                commands: cmd_prod,
                frames: frame_cons,
                samples: sample_cons,
            },
        )
    }

    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[must_use]
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    /// Drain pending commands. Runs exactly once per frame, at the top.
    fn drain_commands(&mut self) {
        while let Some(command) = self.commands.try_pop() {
            match command {
                Command::Start | Command::Resume => self.paused = false,
                Command::Pause => self.paused = true,
                Command::Stop => {
                    // Cooperative: the current frame already finished
                    self.running = false;
                    info!("scheduler stopping");
                }
                Command::Reset => self.machine.reset(),
                Command::Key { code, pressed } => self.machine.key_event(code, pressed),
            }
        }
    }

    /// Run one frame: drain commands, emulate, hand off outputs.
    /// Returns false once a stop command has been honoured.
    pub fn run_frame(&mut self) -> bool {
        self.drain_commands();
        if !self.running {
            return false;
        }
        if self.paused {
            return true;
        }

        self.machine.run_frame();
        self.stats.frames_run += 1;

        let frame = self.machine.framebuffer().to_vec();
        if self.frames.try_push(frame).is_err() {
            self.stats.frames_dropped += 1;
        }

        let mut pcm = vec![0i16; self.machine.samples_per_frame()];
        self.machine.generate_audio(&mut pcm);
        if self.samples.try_push(pcm).is_err() {
            self.stats.sample_chunks_dropped += 1;
        }

        true
    }

    /// Hot-swap the CPU slot. Refused unless paused: a swap must never
    /// release a module whose code could still be on the call stack.
    pub fn swap_cpu(&mut self, slot: &crate::SlotEntry) -> Result<(), crate::MachineError> {
        self.require_paused()?;
        self.machine.swap_cpu(slot)
    }

    /// Hot-swap a peripheral slot; same pause discipline as the CPU.
    pub fn swap_io(
        &mut self,
        slot: &crate::SlotEntry,
        expected: format_ebin::ComponentType,
    ) -> Result<(), crate::MachineError> {
        self.require_paused()?;
        self.machine.swap_io(slot, expected)
    }

    fn require_paused(&self) -> Result<(), crate::MachineError> {
        if self.paused {
            Ok(())
        } else {
            Err(crate::MachineError::InvalidState {
                needed: "paused",
                actual: if self.running { "running" } else { "stopped" },
            })
        }
    }

    /// Run until a stop command arrives or `max_frames` elapse.
    pub fn run(&mut self, max_frames: Option<u64>) {
        let mut frames = 0u64;
        loop {
            if !self.run_frame() {
                break;
            }
            frames += 1;
            if let Some(limit) = max_frames {
                if frames >= limit {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_ring_reports_backpressure() {
        let rb = HeapRb::<Command>::new(2);
        let (mut prod, _cons) = rb.split();
        assert!(prod.try_push(Command::Start).is_ok());
        assert!(prod.try_push(Command::Pause).is_ok());
        assert!(prod.try_push(Command::Reset).is_err(), "ring full");
    }
}
