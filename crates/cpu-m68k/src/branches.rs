//! Groups 5 and 6: ADDQ/SUBQ, Scc, DBcc, Bcc, BRA and BSR.

use emu_core::BusPort;

use crate::cpu::{Cpu68000, ExecResult};
use crate::decode::illegal;
use crate::ea::{AddrMode, Size};
use crate::flags;
use crate::timing;

pub(crate) fn group5<B: BusPort + ?Sized>(
    cpu: &mut Cpu68000,
    bus: &mut B,
    op: u16,
) -> ExecResult {
    if op & 0x00C0 == 0x00C0 {
        if (op >> 3) & 7 == 1 {
            return dbcc(cpu, bus, op);
        }
        return scc(cpu, bus, op);
    }
    addq_subq(cpu, bus, op)
}

fn addq_subq<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let Some(size) = Size::from_bits(op >> 6) else {
        return illegal();
    };
    let data = match (op >> 9) & 7 {
        0 => 8u32,
        n => u32::from(n),
    };
    let subtract = op & 0x0100 != 0;
    let mut ea = Cpu68000::decode_ea(op, size)?;

    if let AddrMode::AddrReg(r) = ea.mode {
        // Whole register, no flags, regardless of operand size
        if matches!(size, Size::Byte) {
            return illegal();
        }
        let dst = cpu.regs.a(r);
        let res = if subtract {
            dst.wrapping_sub(data)
        } else {
            dst.wrapping_add(data)
        };
        cpu.regs.set_a(r, res);
        return Ok(timing::ADDQ_AREG);
    }
    if matches!(
        ea.mode,
        AddrMode::PcDisp | AddrMode::PcIndex | AddrMode::Immediate
    ) {
        return illegal();
    }

    let mut time = match (ea.mode.is_data_reg(), size.is_long()) {
        (true, false) => timing::ADDQ_REG_BW,
        (true, true) => timing::ADDQ_REG_L,
        (false, false) => timing::ADDQ_MEM_BW,
        (false, true) => timing::ADDQ_MEM_L,
    };
    let dst = cpu.ea_read(bus, &mut ea, &mut time)?;
    let res = if subtract {
        dst.wrapping_sub(data)
    } else {
        dst.wrapping_add(data)
    } & size.mask();
    if subtract {
        cpu.set_flags_sub(size, data, dst, res, false);
    } else {
        cpu.set_flags_add(size, data, dst, res, false);
    }
    cpu.ea_write(bus, &mut ea, &mut time, res)?;
    Ok(time)
}

fn scc<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let cond = ((op >> 8) & 0xF) as u8;
    let mut ea = Cpu68000::decode_ea(op, Size::Byte)?;
    if matches!(
        ea.mode,
        AddrMode::AddrReg(_) | AddrMode::PcDisp | AddrMode::PcIndex | AddrMode::Immediate
    ) {
        return illegal();
    }
    let set = flags::condition(cpu.regs.sr, cond);
    let value = if set { 0xFFu32 } else { 0 };
    let mut time = if ea.mode.is_data_reg() {
        if set {
            timing::SCC_REG_TRUE
        } else {
            timing::SCC_REG_FALSE
        }
    } else {
        timing::SCC_MEM
    };
    cpu.ea_write(bus, &mut ea, &mut time, value)?;
    Ok(time)
}

fn dbcc<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let cond = ((op >> 8) & 0xF) as u8;
    let reg = (op & 7) as u8;
    let base = cpu.regs.pc;
    let disp = cpu.fetch_word(bus)? as i16 as i32 as u32;

    if flags::condition(cpu.regs.sr, cond) {
        return Ok(timing::DBCC_TRUE);
    }
    let counter = (cpu.regs.d[reg as usize] as u16).wrapping_sub(1);
    cpu.regs.set_d_word(reg, counter);
    if counter == 0xFFFF {
        Ok(timing::DBCC_FALSE_EXPIRED)
    } else {
        cpu.regs.pc = base.wrapping_add(disp);
        Ok(timing::DBCC_FALSE_BRANCH)
    }
}

/// Group 6: Bcc, BRA (cond 0) and BSR (cond 1).
pub(crate) fn group6<B: BusPort + ?Sized>(
    cpu: &mut Cpu68000,
    bus: &mut B,
    op: u16,
) -> ExecResult {
    let cond = ((op >> 8) & 0xF) as u8;
    let base = cpu.regs.pc;
    let d8 = op as u8;
    let (disp, word_form) = if d8 == 0 {
        (cpu.fetch_word(bus)? as i16 as i32 as u32, true)
    } else {
        (d8 as i8 as i32 as u32, false)
    };

    if cond == 1 {
        // Return address is past the displacement word, if any
        cpu.push_long(bus, cpu.regs.pc)?;
        cpu.regs.pc = base.wrapping_add(disp);
        return Ok(timing::BSR);
    }

    if flags::condition(cpu.regs.sr, cond) {
        cpu.regs.pc = base.wrapping_add(disp);
        Ok(timing::BCC_TAKEN)
    } else if word_form {
        Ok(timing::BCC_NOT_TAKEN_WORD)
    } else {
        Ok(timing::BCC_NOT_TAKEN_BYTE)
    }
}
