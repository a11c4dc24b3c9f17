//! Exception entry and the vector map.

use emu_core::{BusFault, BusPort, FaultKind};

use crate::cpu::Cpu68000;
use crate::flags;

/// Exception vector numbers the core raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Vector {
    BusError = 2,
    AddressError = 3,
    IllegalInstruction = 4,
    ZeroDivide = 5,
    ChkInstruction = 6,
    TrapvInstruction = 7,
    PrivilegeViolation = 8,
    Trace = 9,
    LineA = 10,
    LineF = 11,
    /// First TRAP #n vector; n adds 0..15.
    Trap0 = 32,
}

/// Documented exception processing times.
pub(crate) fn vector_cycles(vector: u8) -> u32 {
    match vector {
        2 | 3 => 50,       // bus / address error, long frame
        5 => 38,           // zero divide
        6 => 40,           // CHK
        24..=31 => 44,     // interrupts
        _ => 34,           // illegal, privilege, trace, TRAP #n, line A/F
    }
}

impl Cpu68000 {
    pub(crate) fn push_word<B: BusPort + ?Sized>(
        &mut self,
        bus: &mut B,
        value: u16,
    ) -> Result<(), BusFault> {
        let sp = self.regs.active_sp().wrapping_sub(2);
        self.regs.set_active_sp(sp);
        bus.write_word(sp & 0x00FF_FFFF, value)
    }

    pub(crate) fn push_long<B: BusPort + ?Sized>(
        &mut self,
        bus: &mut B,
        value: u32,
    ) -> Result<(), BusFault> {
        let sp = self.regs.active_sp().wrapping_sub(4);
        self.regs.set_active_sp(sp);
        bus.write_long(sp & 0x00FF_FFFF, value)
    }

    pub(crate) fn pop_word<B: BusPort + ?Sized>(&mut self, bus: &mut B) -> Result<u16, BusFault> {
        let sp = self.regs.active_sp();
        let value = bus.read_word(sp & 0x00FF_FFFF)?;
        self.regs.set_active_sp(sp.wrapping_add(2));
        Ok(value)
    }

    pub(crate) fn pop_long<B: BusPort + ?Sized>(&mut self, bus: &mut B) -> Result<u32, BusFault> {
        let sp = self.regs.active_sp();
        let value = bus.read_long(sp & 0x00FF_FFFF)?;
        self.regs.set_active_sp(sp.wrapping_add(4));
        Ok(value)
    }

    /// Enter a group 1/2 exception: push SR and PC, vector through the
    /// table, charge the documented processing time.
    pub(crate) fn enter_exception<B: BusPort + ?Sized>(&mut self, bus: &mut B, vector: u8) {
        self.enter_exception_timed(bus, vector, vector_cycles(vector));
    }

    /// As `enter_exception` with an explicit cycle charge; interrupts pay
    /// 44 regardless of which vector the device supplies.
    pub(crate) fn enter_exception_timed<B: BusPort + ?Sized>(
        &mut self,
        bus: &mut B,
        vector: u8,
        cycles: u32,
    ) {
        let old_sr = self.regs.sr;

        // Supervisor on, trace off; A7 switches to SSP by construction.
        self.regs.sr = (self.regs.sr | flags::S) & !flags::T;
        self.stopped = false;

        // Illegal, privilege violation and the line traps resume at the
        // offending instruction; everything else resumes after it.
        let return_pc = match vector {
            4 | 8 | 10 | 11 => self.instr_pc,
            _ => self.regs.pc,
        };

        let frame = self
            .push_long(bus, return_pc)
            .and_then(|()| self.push_word(bus, old_sr))
            .and_then(|()| bus.read_long(u32::from(vector) * 4));
        match frame {
            Ok(handler) => {
                self.regs.pc = handler & 0x00FF_FFFF;
                self.slice_cycles += cycles;
            }
            Err(_) => self.double_fault(),
        }
    }

    /// Enter a group 0 exception (bus or address error) with the long
    /// stack frame: SSW, fault address, instruction register, SR, PC.
    pub(crate) fn enter_group0<B: BusPort + ?Sized>(
        &mut self,
        bus: &mut B,
        fault: BusFault,
        fetch: bool,
    ) {
        if self.group0_in_progress {
            // A fault while stacking a fault halts the processor.
            self.double_fault();
            return;
        }
        self.group0_in_progress = true;

        let old_sr = self.regs.sr;
        self.regs.sr = (self.regs.sr | flags::S) & !flags::T;
        self.stopped = false;

        let vector = match fault.kind {
            FaultKind::Bus => Vector::BusError as u8,
            FaultKind::Address => Vector::AddressError as u8,
        };

        // Special-status word: function code in bits 0-2, instruction/not
        // in bit 3, read/write in bit 4 (1 = read).
        let supervisor = old_sr & flags::S != 0;
        let fc: u16 = match (supervisor, fetch) {
            (false, false) => 1,
            (false, true) => 2,
            (true, false) => 5,
            (true, true) => 6,
        };
        let instruction_bit = if fetch { 0 } else { 0x08 };
        let read_bit = if fault.write { 0 } else { 0x10 };
        let ssw = fc | instruction_bit | read_bit;

        let frame = self
            .push_long(bus, self.regs.pc)
            .and_then(|()| self.push_word(bus, old_sr))
            .and_then(|()| self.push_word(bus, self.ir))
            .and_then(|()| self.push_long(bus, fault.address & 0x00FF_FFFF))
            .and_then(|()| self.push_word(bus, ssw))
            .and_then(|()| bus.read_long(u32::from(vector) * 4));
        match frame {
            Ok(handler) => {
                self.regs.pc = handler & 0x00FF_FFFF;
                self.slice_cycles += vector_cycles(vector);
                self.group0_in_progress = false;
            }
            Err(_) => self.double_fault(),
        }
    }

    fn double_fault(&mut self) {
        self.halted = true;
        self.group0_in_progress = false;
    }
}
