//! Group 0: immediate ALU ops, the bit instructions, and MOVEP.

use emu_core::BusPort;

use crate::cpu::{Cpu68000, ExecResult};
use crate::decode::illegal;
use crate::ea::{AddrMode, Size};
use crate::flags;
use crate::timing;

#[derive(Clone, Copy, PartialEq, Eq)]
enum ImmOp {
    Or,
    And,
    Sub,
    Add,
    Eor,
    Cmp,
}

pub(crate) fn group0<B: BusPort + ?Sized>(
    cpu: &mut Cpu68000,
    bus: &mut B,
    op: u16,
) -> ExecResult {
    if op & 0x0138 == 0x0108 {
        return movep(cpu, bus, op);
    }
    if op & 0x0100 != 0 {
        let bit = cpu.regs.d[((op >> 9) & 7) as usize];
        return bit_op(cpu, bus, op, bit, false);
    }
    if op & 0x0F00 == 0x0800 {
        let bit = u32::from(cpu.fetch_word(bus)?);
        return bit_op(cpu, bus, op, bit, true);
    }
    let which = match (op >> 9) & 7 {
        0 => ImmOp::Or,
        1 => ImmOp::And,
        2 => ImmOp::Sub,
        3 => ImmOp::Add,
        5 => ImmOp::Eor,
        6 => ImmOp::Cmp,
        _ => return illegal(),
    };
    immediate_op(cpu, bus, op, which)
}

fn immediate_op<B: BusPort + ?Sized>(
    cpu: &mut Cpu68000,
    bus: &mut B,
    op: u16,
    which: ImmOp,
) -> ExecResult {
    let Some(size) = Size::from_bits(op >> 6) else {
        return illegal();
    };

    // EA field 111100 means the status register is the destination
    if op & 0x3F == 0x3C {
        let apply: fn(u16, u16) -> u16 = match which {
            ImmOp::Or => |a, b| a | b,
            ImmOp::And => |a, b| a & b,
            ImmOp::Eor => |a, b| a ^ b,
            _ => return illegal(),
        };
        return match size {
            Size::Byte => {
                let imm = cpu.fetch_word(bus)? & 0xFF;
                let ccr = u16::from(cpu.regs.ccr());
                cpu.regs.set_ccr(apply(ccr, imm) as u8);
                Ok(timing::IMM_TO_STATUS)
            }
            Size::Word => {
                cpu.require_supervisor()?;
                let imm = cpu.fetch_word(bus)?;
                cpu.regs.set_sr(apply(cpu.regs.sr, imm));
                Ok(timing::IMM_TO_STATUS)
            }
            Size::Long => illegal(),
        };
    }

    let imm = match size {
        Size::Long => cpu.fetch_long(bus)?,
        Size::Word => u32::from(cpu.fetch_word(bus)?),
        Size::Byte => u32::from(cpu.fetch_word(bus)? & 0xFF),
    };

    let mut ea = Cpu68000::decode_ea(op, size)?;
    if matches!(
        ea.mode,
        AddrMode::AddrReg(_) | AddrMode::PcDisp | AddrMode::PcIndex | AddrMode::Immediate
    ) {
        return illegal();
    }

    let to_reg = ea.mode.is_data_reg();
    let mut time = match which {
        ImmOp::Cmp => match (to_reg, size.is_long()) {
            (true, false) => timing::CMPI_REG_BW,
            (true, true) => timing::CMPI_REG_L,
            (false, false) => timing::CMPI_MEM_BW,
            (false, true) => timing::CMPI_MEM_L,
        },
        ImmOp::And if to_reg && size.is_long() => timing::ANDI_REG_L,
        _ => match (to_reg, size.is_long()) {
            (true, false) => timing::IMM_REG_BW,
            (true, true) => timing::IMM_REG_L,
            (false, false) => timing::IMM_MEM_BW,
            (false, true) => timing::IMM_MEM_L,
        },
    };

    let dst = cpu.ea_read(bus, &mut ea, &mut time)?;
    match which {
        ImmOp::Or | ImmOp::And | ImmOp::Eor => {
            let res = match which {
                ImmOp::Or => dst | imm,
                ImmOp::And => dst & imm,
                _ => dst ^ imm,
            } & size.mask();
            cpu.set_flags_move(size, res);
            cpu.ea_write(bus, &mut ea, &mut time, res)?;
        }
        ImmOp::Add => {
            let res = dst.wrapping_add(imm) & size.mask();
            cpu.set_flags_add(size, imm, dst, res, false);
            cpu.ea_write(bus, &mut ea, &mut time, res)?;
        }
        ImmOp::Sub => {
            let res = dst.wrapping_sub(imm) & size.mask();
            cpu.set_flags_sub(size, imm, dst, res, false);
            cpu.ea_write(bus, &mut ea, &mut time, res)?;
        }
        ImmOp::Cmp => {
            let res = dst.wrapping_sub(imm) & size.mask();
            cpu.set_flags_cmp(size, imm, dst, res);
        }
    }
    Ok(time)
}

/// BTST/BCHG/BCLR/BSET. On a data register the operand is a long and the
/// bit number is mod 32; on memory it is a byte and mod 8.
fn bit_op<B: BusPort + ?Sized>(
    cpu: &mut Cpu68000,
    bus: &mut B,
    op: u16,
    bit: u32,
    static_form: bool,
) -> ExecResult {
    let kind = (op >> 6) & 3;
    let mode = AddrMode::decode(((op >> 3) & 7) as u8, (op & 7) as u8);
    let Some(mode) = mode else { return illegal() };

    if let AddrMode::DataReg(r) = mode {
        let bit = bit % 32;
        let value = cpu.regs.d[r as usize];
        set_z_from_bit(cpu, value, bit);
        let time = match (kind, static_form) {
            (0, false) => timing::BTST_DYN_REG,
            (0, true) => timing::BTST_STA_REG,
            (1, false) => timing::BCHG_DYN_REG,
            (1, true) => timing::BCHG_STA_REG,
            (2, false) => timing::BCLR_DYN_REG,
            (2, true) => timing::BCLR_STA_REG,
            (3, false) => timing::BSET_DYN_REG,
            _ => timing::BSET_STA_REG,
        };
        if kind != 0 {
            cpu.regs.d[r as usize] = modify_bit(value, bit, kind);
        }
        return Ok(time);
    }

    match mode {
        AddrMode::AddrReg(_) | AddrMode::Immediate => return illegal(),
        AddrMode::PcDisp | AddrMode::PcIndex if kind != 0 => return illegal(),
        _ => {}
    }

    let mut ea = crate::ea::Ea::new(mode, Size::Byte);
    let mut time = match (kind, static_form) {
        (0, false) => timing::BTST_DYN_MEM,
        (0, true) => timing::BTST_STA_MEM,
        (_, false) => timing::BIT_DYN_MEM,
        _ => timing::BIT_STA_MEM,
    };
    let bit = bit % 8;
    let value = cpu.ea_read(bus, &mut ea, &mut time)?;
    set_z_from_bit(cpu, value, bit);
    if kind != 0 {
        cpu.ea_write(bus, &mut ea, &mut time, modify_bit(value, bit, kind))?;
    }
    Ok(time)
}

fn set_z_from_bit(cpu: &mut Cpu68000, value: u32, bit: u32) {
    if value & (1 << bit) == 0 {
        cpu.regs.sr |= flags::Z;
    } else {
        cpu.regs.sr &= !flags::Z;
    }
}

fn modify_bit(value: u32, bit: u32, kind: u16) -> u32 {
    match kind {
        1 => value ^ (1 << bit),
        2 => value & !(1 << bit),
        _ => value | (1 << bit),
    }
}

/// MOVEP: byte lanes on alternating addresses, d16(An) only.
fn movep<B: BusPort + ?Sized>(cpu: &mut Cpu68000, bus: &mut B, op: u16) -> ExecResult {
    let dreg = ((op >> 9) & 7) as u8;
    let areg = (op & 7) as u8;
    let opmode = (op >> 6) & 7;
    let disp = cpu.fetch_word(bus)? as i16 as i32 as u32;
    let addr = cpu.regs.a(areg).wrapping_add(disp) & 0x00FF_FFFF;

    match opmode {
        4 => {
            let hi = bus.read_byte(addr)?;
            let lo = bus.read_byte(addr.wrapping_add(2))?;
            cpu.regs.set_d_word(dreg, u16::from(hi) << 8 | u16::from(lo));
            Ok(timing::MOVEP_WORD)
        }
        5 => {
            let mut value = 0u32;
            for i in 0..4u32 {
                value = value << 8 | u32::from(bus.read_byte(addr.wrapping_add(i * 2))?);
            }
            cpu.regs.d[dreg as usize] = value;
            Ok(timing::MOVEP_LONG)
        }
        6 => {
            let value = cpu.regs.d[dreg as usize];
            bus.write_byte(addr, (value >> 8) as u8)?;
            bus.write_byte(addr.wrapping_add(2), value as u8)?;
            Ok(timing::MOVEP_WORD)
        }
        7 => {
            let value = cpu.regs.d[dreg as usize];
            for i in 0..4u32 {
                bus.write_byte(addr.wrapping_add(i * 2), (value >> (24 - i * 8)) as u8)?;
            }
            Ok(timing::MOVEP_LONG)
        }
        _ => illegal(),
    }
}
