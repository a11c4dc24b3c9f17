//! Group 14: shifts and rotates, register and memory forms.

use emu_core::BusPort;

use crate::cpu::{Cpu68000, ExecResult};
use crate::decode::illegal;
use crate::ea::{AddrMode, Size};
use crate::flags;
use crate::timing;

/// Shift kind from bits 4-3 (register form) or 10-9 (memory form):
/// 0 arithmetic, 1 logical, 2 rotate-with-extend, 3 rotate.
pub(crate) fn group_shift<B: BusPort + ?Sized>(
    cpu: &mut Cpu68000,
    bus: &mut B,
    op: u16,
) -> ExecResult {
    if op & 0x00C0 == 0x00C0 {
        // Memory form: word at <ea>, shift by one.
        if op & 0x0800 != 0 {
            return illegal();
        }
        let kind = ((op >> 9) & 3) as u8;
        let left = op & 0x0100 != 0;
        let mut ea = Cpu68000::decode_ea(op, Size::Word)?;
        if !matches!(
            ea.mode,
            AddrMode::Indirect(_)
                | AddrMode::PostInc(_)
                | AddrMode::PreDec(_)
                | AddrMode::Disp(_)
                | AddrMode::Index(_)
                | AddrMode::AbsShort
                | AddrMode::AbsLong
        ) {
            return illegal();
        }
        let mut time = timing::SHIFT_MEM;
        let value = cpu.ea_read(bus, &mut ea, &mut time)?;
        let res = apply_shift(cpu, kind, left, Size::Word, value, 1);
        cpu.ea_write(bus, &mut ea, &mut time, res)?;
        return Ok(time);
    }

    // Register form: count from the opcode (0 means 8) or from Dn mod 64.
    let Some(size) = Size::from_bits(op >> 6) else {
        return illegal();
    };
    let count_field = ((op >> 9) & 7) as u32;
    let count = if op & 0x0020 != 0 {
        cpu.regs.d[count_field as usize] % 64
    } else if count_field == 0 {
        8
    } else {
        count_field
    };
    let kind = ((op >> 3) & 3) as u8;
    let left = op & 0x0100 != 0;
    let reg = (op & 7) as u8;

    let value = cpu.regs.d[reg as usize] & size.mask();
    let res = apply_shift(cpu, kind, left, size, value, count);
    crate::arith::write_d(cpu, reg, size, res);

    let base = if size.is_long() {
        timing::SHIFT_REG_L
    } else {
        timing::SHIFT_REG_BW
    };
    Ok(base + timing::SHIFT_PER_BIT * count)
}

/// Run the shift one bit at a time and leave the flags behind.
///
/// X follows the last carry for everything except the plain rotates; ASL
/// accumulates V whenever the sign bit changes on the way.
fn apply_shift(
    cpu: &mut Cpu68000,
    kind: u8,
    left: bool,
    size: Size,
    value: u32,
    count: u32,
) -> u32 {
    let mask = size.mask();
    let sign = size.sign_bit();
    let top_shift = size.bytes() * 8 - 1;
    let mut val = value & mask;

    if count == 0 {
        // ROXd with a zero count still copies X into C
        let carry = kind == 2 && cpu.regs.sr & flags::X != 0;
        set_shift_flags(cpu, size, val, carry, false);
        return val;
    }

    let mut carry = false;
    let mut overflow = false;
    for _ in 0..count {
        match kind {
            0 => {
                if left {
                    carry = val & sign != 0;
                    let shifted = (val << 1) & mask;
                    overflow |= (val ^ shifted) & sign != 0;
                    val = shifted;
                } else {
                    carry = val & 1 != 0;
                    val = (val >> 1) | (val & sign);
                }
                cpu.set_x(carry);
            }
            1 => {
                if left {
                    carry = val & sign != 0;
                    val = (val << 1) & mask;
                } else {
                    carry = val & 1 != 0;
                    val >>= 1;
                }
                cpu.set_x(carry);
            }
            2 => {
                let x = cpu.x_bit();
                if left {
                    carry = val & sign != 0;
                    val = ((val << 1) | x) & mask;
                } else {
                    carry = val & 1 != 0;
                    val = (val >> 1) | (x << top_shift);
                }
                cpu.set_x(carry);
            }
            _ => {
                if left {
                    carry = val & sign != 0;
                    val = ((val << 1) | u32::from(carry)) & mask;
                } else {
                    carry = val & 1 != 0;
                    val = (val >> 1) | (u32::from(carry) << top_shift);
                }
            }
        }
    }

    set_shift_flags(cpu, size, val, carry, overflow);
    val
}

fn set_shift_flags(cpu: &mut Cpu68000, size: Size, res: u32, carry: bool, overflow: bool) {
    let mut sr = cpu.regs.sr & !(flags::N | flags::Z | flags::V | flags::C);
    if res & size.sign_bit() != 0 {
        sr |= flags::N;
    }
    if res & size.mask() == 0 {
        sr |= flags::Z;
    }
    if overflow {
        sr |= flags::V;
    }
    if carry {
        sr |= flags::C;
    }
    cpu.regs.sr = sr;
}
