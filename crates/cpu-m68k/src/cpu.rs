//! The CPU proper: fetch/decode/execute loop, interrupt sampling, and the
//! flag-setting helpers every ALU handler shares.

use emu_core::{BusFault, BusPort, CpuModule, CpuState, InterfaceVersion};

use crate::ea::Size;
use crate::exceptions::Vector;
use crate::flags;
use crate::registers::Registers;

/// Interface version this core implements.
pub(crate) const INTERFACE: InterfaceVersion = InterfaceVersion::new(1, 2);

/// Why an instruction stopped executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exception {
    /// Group 1/2: take this vector immediately.
    Vector(u8),
    /// Group 0: a failed bus access. Latched and taken at the top of the
    /// next iteration, ahead of interrupt sampling.
    Fault { fault: BusFault, fetch: bool },
}

impl From<BusFault> for Exception {
    fn from(fault: BusFault) -> Self {
        Self::Fault { fault, fetch: false }
    }
}

pub(crate) type ExecResult<T = u32> = Result<T, Exception>;

/// Instruction-stepped MC68000.
#[derive(Debug, Clone)]
pub struct Cpu68000 {
    pub regs: Registers,
    /// Instruction register: opcode of the instruction in flight.
    pub(crate) ir: u16,
    /// Address the instruction in flight was fetched from. Group 1
    /// exceptions that re-execute (illegal, privilege, line A/F) push
    /// this instead of the advanced PC.
    pub(crate) instr_pc: u32,
    /// STOP state; 4-cycle idle slices until an interrupt is accepted.
    pub(crate) stopped: bool,
    /// Double bus fault or external halt; only reset recovers.
    pub(crate) halted: bool,
    /// Pending IRQ level (0 = none), as driven by GLUE.
    pending_irq: u8,
    /// Level 7 is edge triggered; set on the 6→7 transition only.
    nmi_edge: bool,
    /// Latched group 0 fault, taken on the next iteration.
    pending_fault: Option<(BusFault, bool)>,
    /// True while stacking a group 0 frame; a nested fault halts.
    pub(crate) group0_in_progress: bool,
    /// Cycles consumed in the current `execute` slice.
    pub(crate) slice_cycles: u32,
    total_cycles: u64,
}

impl Default for Cpu68000 {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu68000 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            ir: 0,
            instr_pc: 0,
            stopped: false,
            halted: false,
            pending_irq: 0,
            nmi_edge: false,
            pending_fault: None,
            group0_in_progress: false,
            slice_cycles: 0,
            total_cycles: 0,
        }
    }

    /// Hardware reset: supervisor mode, interrupt mask 7, SSP from
    /// address 0, PC from address 4, counters and latches cleared.
    pub fn reset<B: BusPort + ?Sized>(&mut self, bus: &mut B) {
        self.regs = Registers::new();
        self.ir = 0;
        self.instr_pc = 0;
        self.stopped = false;
        self.halted = false;
        self.pending_irq = 0;
        self.nmi_edge = false;
        self.pending_fault = None;
        self.group0_in_progress = false;
        self.slice_cycles = 0;
        self.total_cycles = 0;
        self.regs.ssp = bus.read_long(0).unwrap_or(0);
        self.regs.pc = bus.read_long(4).unwrap_or(0);
        self.regs.normalize();
    }

    /// Run instructions until at least `budget` cycles are consumed,
    /// overshooting by at most one instruction. Returns cycles consumed.
    pub fn execute<B: BusPort + ?Sized>(&mut self, bus: &mut B, budget: u32) -> u32 {
        self.slice_cycles = 0;
        while self.slice_cycles < budget {
            if self.halted {
                self.slice_cycles = self.slice_cycles.max(budget);
                break;
            }

            // Group 0 first: a latched fault outranks interrupt sampling.
            if let Some((fault, fetch)) = self.pending_fault.take() {
                self.enter_group0(bus, fault, fetch);
                continue;
            }

            if self.service_interrupt(bus) {
                continue;
            }

            if self.stopped {
                self.slice_cycles += 4;
                continue;
            }

            let trace = self.regs.is_trace();
            self.instr_pc = self.regs.pc & 0x00FF_FFFF;

            let opcode = match self.fetch_word(bus) {
                Ok(op) => op,
                Err(e) => {
                    self.post_exception(bus, e);
                    continue;
                }
            };
            self.ir = opcode;

            match crate::decode::dispatch(self, bus, opcode) {
                Ok(cycles) => {
                    self.slice_cycles += cycles;
                    self.regs.normalize();
                    if trace && !self.stopped {
                        self.enter_exception(bus, Vector::Trace as u8);
                    }
                }
                Err(e) => {
                    self.regs.normalize();
                    self.post_exception(bus, e);
                }
            }
        }
        self.total_cycles += u64::from(self.slice_cycles);
        self.slice_cycles
    }

    /// Take a group 1/2 exception now; latch a group 0 fault for the next
    /// iteration.
    fn post_exception<B: BusPort + ?Sized>(&mut self, bus: &mut B, e: Exception) {
        match e {
            Exception::Vector(v) => self.enter_exception(bus, v),
            Exception::Fault { fault, fetch } => {
                self.pending_fault = Some((fault, fetch));
                self.slice_cycles += 4;
            }
        }
    }

    fn service_interrupt<B: BusPort + ?Sized>(&mut self, bus: &mut B) -> bool {
        let level = self.pending_irq;
        if level == 0 {
            return false;
        }
        if level == 7 {
            if !self.nmi_edge {
                return false;
            }
        } else if level <= self.regs.interrupt_mask() {
            return false;
        }

        let vector = bus.iack(level);
        self.enter_exception_timed(bus, vector, 44);
        self.regs.set_interrupt_mask(level);
        if level == 7 {
            self.nmi_edge = false;
        }
        true
    }

    /// Fetch the next word at PC (program space) and advance PC.
    pub(crate) fn fetch_word<B: BusPort + ?Sized>(&mut self, bus: &mut B) -> ExecResult<u16> {
        let pc = self.regs.pc & 0x00FF_FFFF;
        let word = bus
            .read_word(pc)
            .map_err(|fault| Exception::Fault { fault, fetch: true })?;
        self.regs.pc = self.regs.pc.wrapping_add(2);
        Ok(word)
    }

    pub(crate) fn fetch_long<B: BusPort + ?Sized>(&mut self, bus: &mut B) -> ExecResult<u32> {
        let hi = self.fetch_word(bus)?;
        let lo = self.fetch_word(bus)?;
        Ok(u32::from(hi) << 16 | u32::from(lo))
    }

    /// Externally induced halt; only reset recovers.
    pub fn stop(&mut self) {
        self.halted = true;
    }

    /// Drive the interrupt request input. 0 withdraws; level 7 is latched
    /// as an edge so a held NMI line fires once.
    pub fn set_irq(&mut self, level: u8) {
        let level = level & 7;
        if level == 7 && self.pending_irq != 7 {
            self.nmi_edge = true;
        }
        self.pending_irq = level;
    }

    pub fn set_nmi(&mut self) {
        self.set_irq(7);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    #[must_use]
    pub fn state(&self) -> CpuState {
        CpuState {
            d: self.regs.d,
            a: self.regs.a,
            usp: self.regs.usp,
            ssp: self.regs.ssp,
            pc: self.regs.pc,
            sr: self.regs.sr,
            stopped: self.stopped,
            halted: self.halted,
            cycles: self.total_cycles,
        }
    }

    pub fn set_state(&mut self, state: &CpuState) {
        self.regs.d = state.d;
        self.regs.a = state.a;
        self.regs.usp = state.usp;
        self.regs.ssp = state.ssp;
        self.regs.pc = state.pc;
        self.regs.sr = state.sr & flags::SR_MASK;
        self.stopped = state.stopped;
        self.halted = state.halted;
        self.total_cycles = state.cycles;
        self.pending_fault = None;
        self.group0_in_progress = false;
    }

    // === Flag helpers ===
    //
    // All four take masked operands/results for the given size. The carry
    // and overflow formulas are bitwise so they hold with or without an
    // extend carry-in.

    /// Flags for ADD family. `extended` keeps Z sticky (ADDX rule).
    pub(crate) fn set_flags_add(&mut self, size: Size, src: u32, dst: u32, res: u32, extended: bool) {
        let sign = size.sign_bit();
        let res = res & size.mask();
        let carry = ((src & dst) | ((src | dst) & !res)) & sign != 0;
        let overflow = (!(src ^ dst) & (src ^ res)) & sign != 0;
        self.update_nzvc(size, res, overflow, carry, extended);
        self.set_x(carry);
    }

    /// Flags for SUB family (`res = dst - src - x`).
    pub(crate) fn set_flags_sub(&mut self, size: Size, src: u32, dst: u32, res: u32, extended: bool) {
        let sign = size.sign_bit();
        let res = res & size.mask();
        let borrow = ((src & !dst) | ((src | !dst) & res)) & sign != 0;
        let overflow = ((src ^ dst) & (res ^ dst)) & sign != 0;
        self.update_nzvc(size, res, overflow, borrow, extended);
        self.set_x(borrow);
    }

    /// Flags for CMP family: like SUB but X is untouched.
    pub(crate) fn set_flags_cmp(&mut self, size: Size, src: u32, dst: u32, res: u32) {
        let sign = size.sign_bit();
        let res = res & size.mask();
        let borrow = ((src & !dst) | ((src | !dst) & res)) & sign != 0;
        let overflow = ((src ^ dst) & (res ^ dst)) & sign != 0;
        self.update_nzvc(size, res, overflow, borrow, false);
    }

    /// Flags for MOVE and the logic ops: N/Z from the result, V/C cleared.
    pub(crate) fn set_flags_move(&mut self, size: Size, res: u32) {
        let res = res & size.mask();
        self.update_nzvc(size, res, false, false, false);
    }

    fn update_nzvc(&mut self, size: Size, res: u32, v: bool, c: bool, extended: bool) {
        let mut sr = self.regs.sr & !(flags::N | flags::V | flags::C);
        if res & size.sign_bit() != 0 {
            sr |= flags::N;
        }
        if extended {
            // Z is only ever cleared by the extended forms
            if res != 0 {
                sr &= !flags::Z;
            }
        } else {
            sr &= !flags::Z;
            if res == 0 {
                sr |= flags::Z;
            }
        }
        if v {
            sr |= flags::V;
        }
        if c {
            sr |= flags::C;
        }
        self.regs.sr = sr;
    }

    pub(crate) fn set_x(&mut self, x: bool) {
        if x {
            self.regs.sr |= flags::X;
        } else {
            self.regs.sr &= !flags::X;
        }
    }

    pub(crate) fn x_bit(&self) -> u32 {
        u32::from(self.regs.sr & flags::X != 0)
    }

    /// Privilege check for the supervisor-only instructions.
    pub(crate) fn require_supervisor(&self) -> ExecResult<()> {
        if self.regs.is_supervisor() {
            Ok(())
        } else {
            Err(Exception::Vector(Vector::PrivilegeViolation as u8))
        }
    }
}

impl CpuModule for Cpu68000 {
    fn name(&self) -> &'static str {
        "cpu68000"
    }

    fn version(&self) -> InterfaceVersion {
        INTERFACE
    }

    fn reset(&mut self, bus: &mut dyn BusPort) {
        Cpu68000::reset(self, bus);
    }

    fn execute(&mut self, bus: &mut dyn BusPort, budget: u32) -> u32 {
        Cpu68000::execute(self, bus, budget)
    }

    fn stop(&mut self) {
        Cpu68000::stop(self);
    }

    fn set_irq(&mut self, level: u8) {
        Cpu68000::set_irq(self, level);
    }

    fn state(&self) -> CpuState {
        Cpu68000::state(self)
    }

    fn set_state(&mut self, state: &CpuState) {
        Cpu68000::set_state(self, state);
    }
}
