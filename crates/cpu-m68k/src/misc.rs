//! Group 4: the miscellaneous page of the encoding map.
//!
//! NEGX/CLR/NEG/NOT, the SR/CCR moves, NBCD, SWAP/EXT/PEA, TST/TAS,
//! MOVEM, LEA/CHK, and the 0x4E page: TRAP, LINK/UNLK, MOVE USP, RESET,
//! NOP, STOP, RTE, RTS, RTR, TRAPV, JSR, JMP.

use emu_core::BusPort;

use crate::arith;
use crate::cpu::{Cpu68000, ExecResult, Exception};
use crate::decode::illegal;
use crate::ea::{AddrMode, Ea, Size};
use crate::exceptions::Vector;
use crate::flags;
use crate::timing;

pub(crate) fn group4<B: BusPort + ?Sized>(
    cpu: &mut Cpu68000,
    bus: &mut B,
    op: u16,
) -> ExecResult {
    match op {
        0x4AFC => return illegal(),
        0x4E70 => {
            cpu.require_supervisor()?;
            return Ok(timing::RESET);
        }
        0x4E71 => return Ok(timing::NOP),
        0x4E72 => return stop(cpu, bus),
        0x4E73 => return rte(cpu, bus),
        0x4E75 => return rts(cpu, bus),
        0x4E76 => return trapv(cpu),
        0x4E77 => return rtr(cpu, bus),
        _ => {}
    }

    if op & 0xFFF0 == 0x4E40 {
        return Err(Exception::Vector(Vector::Trap0 as u8 + (op & 0xF) as u8));
    }

    match op & 0xFFF8 {
        0x4E50 => return link(cpu, bus, (op & 7) as u8),
        0x4E58 => return unlk(cpu, bus, (op & 7) as u8),
        0x4E60 => return move_to_usp(cpu, (op & 7) as u8),
        0x4E68 => return move_from_usp(cpu, (op & 7) as u8),
        0x4840 => return swap(cpu, (op & 7) as u8),
        0x4880 => return ext(cpu, (op & 7) as u8, Size::Word),
        0x48C0 => return ext(cpu, (op & 7) as u8, Size::Long),
        _ => {}
    }

    match op & 0xFFC0 {
        0x40C0 => return move_from_sr(cpu, bus, op),
        0x44C0 => return move_to_ccr(cpu, bus, op),
        0x46C0 => return move_to_sr(cpu, bus, op),
        0x4800 => return nbcd(cpu, bus, op),
        0x4840 => return pea(cpu, bus, op),
        0x4AC0 => return tas(cpu, bus, op),
        0x4E80 => return jsr(cpu, bus, op),
        0x4EC0 => return jmp(cpu, bus, op),
        _ => {}
    }

    // LEA and CHK carry a register in bits 9-11
    match op & 0x01C0 {
        0x01C0 => return lea(cpu, bus, op),
        0x0180 => return chk(cpu, bus, op),
        _ => {}
    }

    if op & 0xFB80 == 0x4880 {
        return movem(cpu, bus, op);
    }

    match op & 0xFF00 {
        0x4000 => return negx(cpu, bus, op),
        0x4200 => return clr(cpu, bus, op),
        0x4400 => return neg(cpu, bus, op),
        0x4600 => return not(cpu, bus, op),
        0x4A00 => return tst(cpu, bus, op),
        _ => {}
    }

    illegal()
}

/// Data-alterable destination: no An, no PC-relative, no immediate.
fn require_data_alterable(ea: &Ea) -> ExecResult<()> {
    match ea.mode {
        AddrMode::AddrReg(_)
        | AddrMode::PcDisp
        | AddrMode::PcIndex
        | AddrMode::Immediate => illegal(),
        _ => Ok(()),
    }
}

fn unary_size(op: u16) -> ExecResult<Size> {
    Size::from_bits(op >> 6).map_or_else(illegal, Ok)
}

fn unary_time(ea: &Ea, size: Size) -> u32 {
    match (ea.mode.is_data_reg(), size.is_long()) {
        (true, false) => timing::CLR_REG_BW,
        (true, true) => timing::CLR_REG_L,
        (false, false) => timing::CLR_MEM_BW,
        (false, true) => timing::CLR_MEM_L,
    }
}

fn negx<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let size = unary_size(op)?;
    let mut ea = Cpu68000::decode_ea(op, size)?;
    require_data_alterable(&ea)?;
    let mut time = unary_time(&ea, size);
    let value = cpu.ea_read(bus, &mut ea, &mut time)?;
    let res = 0u32.wrapping_sub(value).wrapping_sub(cpu.x_bit()) & size.mask();
    cpu.set_flags_sub(size, value, 0, res, true);
    cpu.ea_write(bus, &mut ea, &mut time, res)?;
    Ok(time)
}

fn clr<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let size = unary_size(op)?;
    let mut ea = Cpu68000::decode_ea(op, size)?;
    require_data_alterable(&ea)?;
    let mut time = unary_time(&ea, size);
    // The 68000 reads the destination before clearing it
    let _ = cpu.ea_read(bus, &mut ea, &mut time)?;
    cpu.set_flags_move(size, 0);
    cpu.ea_write(bus, &mut ea, &mut time, 0)?;
    Ok(time)
}

fn neg<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let size = unary_size(op)?;
    let mut ea = Cpu68000::decode_ea(op, size)?;
    require_data_alterable(&ea)?;
    let mut time = unary_time(&ea, size);
    let value = cpu.ea_read(bus, &mut ea, &mut time)?;
    let res = 0u32.wrapping_sub(value) & size.mask();
    cpu.set_flags_sub(size, value, 0, res, false);
    cpu.ea_write(bus, &mut ea, &mut time, res)?;
    Ok(time)
}

fn not<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let size = unary_size(op)?;
    let mut ea = Cpu68000::decode_ea(op, size)?;
    require_data_alterable(&ea)?;
    let mut time = unary_time(&ea, size);
    let value = cpu.ea_read(bus, &mut ea, &mut time)?;
    let res = !value & size.mask();
    cpu.set_flags_move(size, res);
    cpu.ea_write(bus, &mut ea, &mut time, res)?;
    Ok(time)
}

fn tst<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let size = unary_size(op)?;
    let mut ea = Cpu68000::decode_ea(op, size)?;
    require_data_alterable(&ea)?;
    let mut time = timing::TST;
    let value = cpu.ea_read(bus, &mut ea, &mut time)?;
    cpu.set_flags_move(size, value);
    Ok(time)
}

fn tas<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let mut ea = Cpu68000::decode_ea(op, Size::Byte)?;
    require_data_alterable(&ea)?;
    let mut time = if ea.mode.is_data_reg() {
        timing::TAS_REG
    } else {
        timing::TAS_MEM
    };
    let value = cpu.ea_read(bus, &mut ea, &mut time)?;
    cpu.set_flags_move(Size::Byte, value);
    cpu.ea_write(bus, &mut ea, &mut time, value | 0x80)?;
    Ok(time)
}

fn nbcd<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let mut ea = Cpu68000::decode_ea(op, Size::Byte)?;
    require_data_alterable(&ea)?;
    let mut time = if ea.mode.is_data_reg() {
        timing::NBCD_REG
    } else {
        timing::NBCD_MEM
    };
    let value = cpu.ea_read(bus, &mut ea, &mut time)? as u8;
    let (res, borrow, overflow) = arith::bcd_sub(0, value, cpu.x_bit() as u8);
    arith::set_bcd_flags(cpu, res, borrow, overflow);
    cpu.ea_write(bus, &mut ea, &mut time, u32::from(res))?;
    Ok(time)
}

fn swap(cpu: &mut Cpu68000, r: u8) -> ExecResult {
    let value = cpu.regs.d[r as usize].rotate_left(16);
    cpu.regs.d[r as usize] = value;
    cpu.set_flags_move(Size::Long, value);
    Ok(timing::SWAP)
}

fn ext(cpu: &mut Cpu68000, r: u8, size: Size) -> ExecResult {
    match size {
        Size::Word => {
            let value = cpu.regs.d[r as usize] as u8 as i8 as i16 as u16;
            cpu.regs.set_d_word(r, value);
            cpu.set_flags_move(Size::Word, u32::from(value));
        }
        _ => {
            let value = cpu.regs.d[r as usize] as u16 as i16 as i32 as u32;
            cpu.regs.d[r as usize] = value;
            cpu.set_flags_move(Size::Long, value);
        }
    }
    Ok(timing::EXT)
}

fn pea<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let mut ea = Cpu68000::decode_ea(op, Size::Long)?;
    let time = match ea.mode {
        AddrMode::Indirect(_) => timing::PEA_ARI,
        AddrMode::Disp(_) | AddrMode::PcDisp => timing::PEA_DISP,
        AddrMode::Index(_) | AddrMode::PcIndex => timing::PEA_INDEX,
        AddrMode::AbsShort => timing::PEA_ABS_SHORT,
        AddrMode::AbsLong => timing::PEA_ABS_LONG,
        _ => return illegal(),
    };
    let addr = cpu.ea_address(bus, &mut ea)?;
    cpu.push_long(bus, addr)?;
    Ok(time)
}

fn move_from_sr<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let mut ea = Cpu68000::decode_ea(op, Size::Word)?;
    require_data_alterable(&ea)?;
    let mut time = if ea.mode.is_data_reg() {
        timing::MOVE_FROM_SR_REG
    } else {
        timing::MOVE_FROM_SR_MEM
    };
    cpu.ea_write(bus, &mut ea, &mut time, u32::from(cpu.regs.sr & flags::SR_MASK))?;
    Ok(time)
}

fn move_to_ccr<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let mut ea = Cpu68000::decode_ea(op, Size::Word)?;
    if ea.mode.is_addr_reg() {
        return illegal();
    }
    let mut time = timing::MOVE_TO_CCR;
    let value = cpu.ea_read(bus, &mut ea, &mut time)?;
    cpu.regs.set_ccr(value as u8);
    Ok(time)
}

fn move_to_sr<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    cpu.require_supervisor()?;
    let mut ea = Cpu68000::decode_ea(op, Size::Word)?;
    if ea.mode.is_addr_reg() {
        return illegal();
    }
    let mut time = timing::MOVE_TO_SR;
    let value = cpu.ea_read(bus, &mut ea, &mut time)?;
    cpu.regs.set_sr(value as u16);
    Ok(time)
}

fn movem_base(mode: AddrMode) -> u32 {
    match mode {
        AddrMode::Disp(_) | AddrMode::AbsShort | AddrMode::PcDisp => 12,
        AddrMode::Index(_) | AddrMode::PcIndex => 14,
        AddrMode::AbsLong => 16,
        _ => 8, // (An), (An)+, -(An)
    }
}

fn movem<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let to_regs = op & 0x0400 != 0;
    let size = if op & 0x0040 != 0 { Size::Long } else { Size::Word };
    let mask = cpu.fetch_word(bus)?;
    let mut ea = Cpu68000::decode_ea(op, size)?;
    match ea.mode {
        AddrMode::DataReg(_) | AddrMode::AddrReg(_) | AddrMode::Immediate => return illegal(),
        AddrMode::PreDec(_) if to_regs => return illegal(),
        AddrMode::PostInc(_) if !to_regs => return illegal(),
        AddrMode::PcDisp | AddrMode::PcIndex if !to_regs => return illegal(),
        _ => {}
    }

    let per_reg = if size.is_long() {
        timing::MOVEM_LONG
    } else {
        timing::MOVEM_WORD
    };
    let mut time = movem_base(ea.mode) + if to_regs { timing::MOVEM_MTR_EXTRA } else { 0 };
    let step = size.bytes();

    if let AddrMode::PreDec(r) = ea.mode {
        // Mask bit 0 is A7, descending through D0; stored high to low.
        let mut addr = cpu.regs.a(r);
        for i in 0..16u32 {
            if mask & (1 << i) == 0 {
                continue;
            }
            addr = addr.wrapping_sub(step) & 0x00FF_FFFF;
            let value = if i < 8 {
                cpu.regs.a((7 - i) as u8)
            } else {
                cpu.regs.d[(15 - i) as usize]
            };
            match size {
                Size::Long => bus.write_long(addr, value)?,
                _ => bus.write_word(addr, value as u16)?,
            }
            time += per_reg;
        }
        cpu.regs.set_a(r, addr);
        return Ok(time);
    }

    // Ascending order: mask bit 0 is D0 through bit 15 = A7.
    let mut addr = if let AddrMode::PostInc(r) = ea.mode {
        cpu.regs.a(r)
    } else {
        cpu.ea_address(bus, &mut ea)?
    };
    for i in 0..16u32 {
        if mask & (1 << i) == 0 {
            continue;
        }
        let addr24 = addr & 0x00FF_FFFF;
        if to_regs {
            let value = match size {
                Size::Long => bus.read_long(addr24)?,
                // Word transfers sign-extend into the full register
                _ => bus.read_word(addr24)? as i16 as i32 as u32,
            };
            if i < 8 {
                cpu.regs.d[i as usize] = value;
            } else {
                cpu.regs.set_a((i - 8) as u8, value);
            }
        } else {
            let value = if i < 8 {
                cpu.regs.d[i as usize]
            } else {
                cpu.regs.a((i - 8) as u8)
            };
            match size {
                Size::Long => bus.write_long(addr24, value)?,
                _ => bus.write_word(addr24, value as u16)?,
            }
        }
        addr = addr.wrapping_add(step);
        time += per_reg;
    }
    if let AddrMode::PostInc(r) = ea.mode {
        cpu.regs.set_a(r, addr);
    }
    Ok(time)
}

fn lea<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let reg = ((op >> 9) & 7) as u8;
    let mut ea = Cpu68000::decode_ea(op, Size::Long)?;
    let time = match ea.mode {
        AddrMode::Indirect(_) => timing::LEA_ARI,
        AddrMode::Disp(_) | AddrMode::PcDisp => timing::LEA_DISP,
        AddrMode::Index(_) | AddrMode::PcIndex => timing::LEA_INDEX,
        AddrMode::AbsShort => timing::LEA_ABS_SHORT,
        AddrMode::AbsLong => timing::LEA_ABS_LONG,
        _ => return illegal(),
    };
    let addr = cpu.ea_address(bus, &mut ea)?;
    cpu.regs.set_a(reg, addr);
    Ok(time)
}

fn chk<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let reg = ((op >> 9) & 7) as usize;
    let mut ea = Cpu68000::decode_ea(op, Size::Word)?;
    if ea.mode.is_addr_reg() {
        return illegal();
    }
    let mut time = timing::CHK_NO_TRAP;
    let bound = cpu.ea_read(bus, &mut ea, &mut time)? as u16 as i16;
    let value = cpu.regs.d[reg] as u16 as i16;
    if value < 0 {
        cpu.regs.sr |= flags::N;
        return Err(Exception::Vector(Vector::ChkInstruction as u8));
    }
    if value > bound {
        cpu.regs.sr &= !flags::N;
        return Err(Exception::Vector(Vector::ChkInstruction as u8));
    }
    Ok(time)
}

fn jsr<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let mut ea = Cpu68000::decode_ea(op, Size::Long)?;
    let time = match ea.mode {
        AddrMode::Indirect(_) => timing::JSR_ARI,
        AddrMode::Disp(_) | AddrMode::PcDisp => timing::JSR_DISP,
        AddrMode::Index(_) | AddrMode::PcIndex => timing::JSR_INDEX,
        AddrMode::AbsShort => timing::JSR_ABS_SHORT,
        AddrMode::AbsLong => timing::JSR_ABS_LONG,
        _ => return illegal(),
    };
    let target = cpu.ea_address(bus, &mut ea)?;
    cpu.push_long(bus, cpu.regs.pc)?;
    cpu.regs.pc = target;
    Ok(time)
}

fn jmp<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let mut ea = Cpu68000::decode_ea(op, Size::Long)?;
    let time = match ea.mode {
        AddrMode::Indirect(_) => timing::JMP_ARI,
        AddrMode::Disp(_) | AddrMode::PcDisp => timing::JMP_DISP,
        AddrMode::Index(_) | AddrMode::PcIndex => timing::JMP_INDEX,
        AddrMode::AbsShort => timing::JMP_ABS_SHORT,
        AddrMode::AbsLong => timing::JMP_ABS_LONG,
        _ => return illegal(),
    };
    cpu.regs.pc = cpu.ea_address(bus, &mut ea)?;
    Ok(time)
}

fn link<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, r: u8) -> ExecResult {
    let disp = cpu.fetch_word(bus)? as i16 as i32 as u32;
    cpu.push_long(bus, cpu.regs.a(r))?;
    let sp = cpu.regs.active_sp();
    cpu.regs.set_a(r, sp);
    cpu.regs.set_active_sp(sp.wrapping_add(disp));
    Ok(timing::LINK)
}

fn unlk<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, r: u8) -> ExecResult {
    cpu.regs.set_active_sp(cpu.regs.a(r));
    let value = cpu.pop_long(bus)?;
    cpu.regs.set_a(r, value);
    Ok(timing::UNLK)
}

fn move_to_usp(cpu: &mut Cpu68000, r: u8) -> ExecResult {
    cpu.require_supervisor()?;
    cpu.regs.usp = cpu.regs.a(r);
    Ok(timing::MOVE_USP)
}

fn move_from_usp(cpu: &mut Cpu68000, r: u8) -> ExecResult {
    cpu.require_supervisor()?;
    let usp = cpu.regs.usp;
    cpu.regs.set_a(r, usp);
    Ok(timing::MOVE_USP)
}

fn stop<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B) -> ExecResult {
    cpu.require_supervisor()?;
    let sr = cpu.fetch_word(bus)?;
    cpu.regs.set_sr(sr);
    cpu.stopped = true;
    Ok(timing::STOP)
}

fn rte<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B) -> ExecResult {
    cpu.require_supervisor()?;
    let sr = cpu.pop_word(bus)?;
    let pc = cpu.pop_long(bus)?;
    // Setting SR last: a user-mode target swaps A7 back to USP here
    cpu.regs.set_sr(sr);
    cpu.regs.pc = pc & 0x00FF_FFFF;
    Ok(timing::RTE)
}

fn rts<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B) -> ExecResult {
    let pc = cpu.pop_long(bus)?;
    cpu.regs.pc = pc & 0x00FF_FFFF;
    Ok(timing::RTS)
}

fn rtr<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B) -> ExecResult {
    let ccr = cpu.pop_word(bus)?;
    let pc = cpu.pop_long(bus)?;
    cpu.regs.set_ccr(ccr as u8);
    cpu.regs.pc = pc & 0x00FF_FFFF;
    Ok(timing::RTR)
}

fn trapv(cpu: &mut Cpu68000) -> ExecResult {
    if cpu.regs.sr & flags::V != 0 {
        Err(Exception::Vector(Vector::TrapvInstruction as u8))
    } else {
        Ok(timing::TRAPV_NO_TRAP)
    }
}
