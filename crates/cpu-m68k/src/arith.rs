//! ADD/SUB/CMP families, the extend forms, and BCD arithmetic.

use emu_core::BusPort;

use crate::cpu::{Cpu68000, ExecResult};
use crate::decode::illegal;
use crate::ea::{AddrMode, Ea, Size};
use crate::flags;
use crate::timing;

pub(crate) fn group_add<B: BusPort + ?Sized>(
    cpu: &mut Cpu68000,
    bus: &mut B,
    op: u16,
) -> ExecResult {
    add_sub(cpu, bus, op, true)
}

pub(crate) fn group_sub<B: BusPort + ?Sized>(
    cpu: &mut Cpu68000,
    bus: &mut B,
    op: u16,
) -> ExecResult {
    add_sub(cpu, bus, op, false)
}

fn add_sub<B: BusPort + ?Sized>(
    cpu: &mut Cpu68000,
    bus: &mut B,
    op: u16,
    is_add: bool,
) -> ExecResult {
    let opmode = (op >> 6) & 7;
    let reg = ((op >> 9) & 7) as u8;
    match opmode {
        3 => adda_suba(cpu, bus, op, reg, Size::Word, is_add),
        7 => adda_suba(cpu, bus, op, reg, Size::Long, is_add),
        0..=2 => {
            // <ea> op Dn -> Dn
            let Some(size) = Size::from_bits(opmode) else {
                return illegal();
            };
            let mut ea = Cpu68000::decode_ea(op, size)?;
            if ea.mode.is_addr_reg() && matches!(size, Size::Byte) {
                return illegal();
            }
            let mut time = if size.is_long() {
                if ea.mode.is_reg_or_imm() {
                    timing::ALU_REG_L_RDIMM
                } else {
                    timing::ALU_REG_L
                }
            } else {
                timing::ALU_REG_BW
            };
            let src = cpu.ea_read(bus, &mut ea, &mut time)?;
            let dst = cpu.regs.d[reg as usize] & size.mask();
            let res = if is_add {
                dst.wrapping_add(src)
            } else {
                dst.wrapping_sub(src)
            } & size.mask();
            if is_add {
                cpu.set_flags_add(size, src, dst, res, false);
            } else {
                cpu.set_flags_sub(size, src, dst, res, false);
            }
            write_d(cpu, reg, size, res);
            Ok(time)
        }
        _ => {
            let Some(size) = Size::from_bits(opmode) else {
                return illegal();
            };
            match (op >> 3) & 7 {
                0 => addx_subx_reg(cpu, op, size, is_add),
                1 => addx_subx_mem(cpu, bus, op, size, is_add),
                _ => {
                    // Dn op <ea> -> <ea>
                    let mut ea = Cpu68000::decode_ea(op, size)?;
                    if matches!(
                        ea.mode,
                        AddrMode::PcDisp | AddrMode::PcIndex | AddrMode::Immediate
                    ) {
                        return illegal();
                    }
                    let mut time = if size.is_long() {
                        timing::ALU_MEM_L
                    } else {
                        timing::ALU_MEM_BW
                    };
                    let dst = cpu.ea_read(bus, &mut ea, &mut time)?;
                    let src = cpu.regs.d[reg as usize] & size.mask();
                    let res = if is_add {
                        dst.wrapping_add(src)
                    } else {
                        dst.wrapping_sub(src)
                    } & size.mask();
                    if is_add {
                        cpu.set_flags_add(size, src, dst, res, false);
                    } else {
                        cpu.set_flags_sub(size, src, dst, res, false);
                    }
                    cpu.ea_write(bus, &mut ea, &mut time, res)?;
                    Ok(time)
                }
            }
        }
    }
}

fn adda_suba<B: BusPort + ?Sized>(
    cpu: &mut Cpu68000,
    bus: &mut B,
    op: u16,
    reg: u8,
    size: Size,
    is_add: bool,
) -> ExecResult {
    let mut ea = Cpu68000::decode_ea(op, size)?;
    let mut time = match size {
        Size::Word => timing::ADDA_WORD,
        _ if ea.mode.is_reg_or_imm() => timing::ADDA_LONG_RDIMM,
        _ => timing::ADDA_LONG,
    };
    let src = cpu.ea_read(bus, &mut ea, &mut time)?;
    let src = if matches!(size, Size::Word) {
        src as u16 as i16 as u32
    } else {
        src
    };
    let dst = cpu.regs.a(reg);
    let res = if is_add {
        dst.wrapping_add(src)
    } else {
        dst.wrapping_sub(src)
    };
    cpu.regs.set_a(reg, res);
    Ok(time)
}

fn addx_subx_reg(cpu: &mut Cpu68000, op: u16, size: Size, is_add: bool) -> ExecResult {
    let rx = ((op >> 9) & 7) as u8;
    let ry = (op & 7) as u8;
    let src = cpu.regs.d[ry as usize] & size.mask();
    let dst = cpu.regs.d[rx as usize] & size.mask();
    let x = cpu.x_bit();
    let res = if is_add {
        dst.wrapping_add(src).wrapping_add(x)
    } else {
        dst.wrapping_sub(src).wrapping_sub(x)
    } & size.mask();
    if is_add {
        cpu.set_flags_add(size, src, dst, res, true);
    } else {
        cpu.set_flags_sub(size, src, dst, res, true);
    }
    write_d(cpu, rx, size, res);
    Ok(if size.is_long() {
        timing::ADDX_REG_L
    } else {
        timing::ADDX_REG_BW
    })
}

fn addx_subx_mem<B: BusPort + ?Sized>(
    cpu: &mut Cpu68000,
    bus: &mut B,
    op: u16,
    size: Size,
    is_add: bool,
) -> ExecResult {
    let rx = ((op >> 9) & 7) as u8;
    let ry = (op & 7) as u8;
    let src_addr = predecrement(cpu, ry, size);
    let src = read_mem(bus, src_addr, size)?;
    let dst_addr = predecrement(cpu, rx, size);
    let dst = read_mem(bus, dst_addr, size)?;
    let x = cpu.x_bit();
    let res = if is_add {
        dst.wrapping_add(src).wrapping_add(x)
    } else {
        dst.wrapping_sub(src).wrapping_sub(x)
    } & size.mask();
    if is_add {
        cpu.set_flags_add(size, src, dst, res, true);
    } else {
        cpu.set_flags_sub(size, src, dst, res, true);
    }
    write_mem(bus, dst_addr, size, res)?;
    Ok(if size.is_long() {
        timing::ADDX_MEM_L
    } else {
        timing::ADDX_MEM_BW
    })
}

pub(crate) fn group_cmp<B: BusPort + ?Sized>(
    cpu: &mut Cpu68000,
    bus: &mut B,
    op: u16,
) -> ExecResult {
    let opmode = (op >> 6) & 7;
    let reg = ((op >> 9) & 7) as u8;
    match opmode {
        3 => cmpa(cpu, bus, op, reg, Size::Word),
        7 => cmpa(cpu, bus, op, reg, Size::Long),
        0..=2 => {
            let Some(size) = Size::from_bits(opmode) else {
                return illegal();
            };
            let mut ea = Cpu68000::decode_ea(op, size)?;
            if ea.mode.is_addr_reg() && matches!(size, Size::Byte) {
                return illegal();
            }
            let mut time = if size.is_long() {
                timing::CMP_L
            } else {
                timing::CMP_BW
            };
            let src = cpu.ea_read(bus, &mut ea, &mut time)?;
            let dst = cpu.regs.d[reg as usize] & size.mask();
            let res = dst.wrapping_sub(src) & size.mask();
            cpu.set_flags_cmp(size, src, dst, res);
            Ok(time)
        }
        _ => {
            let Some(size) = Size::from_bits(opmode) else {
                return illegal();
            };
            if (op >> 3) & 7 == 1 {
                return cmpm(cpu, bus, op, size);
            }
            // EOR Dn,<ea>
            let mut ea = Cpu68000::decode_ea(op, size)?;
            if matches!(
                ea.mode,
                AddrMode::AddrReg(_) | AddrMode::PcDisp | AddrMode::PcIndex | AddrMode::Immediate
            ) {
                return illegal();
            }
            let mut time = match (ea.mode.is_data_reg(), size.is_long()) {
                (true, false) => timing::ALU_REG_BW,
                (true, true) => timing::ALU_REG_L_RDIMM,
                (false, false) => timing::ALU_MEM_BW,
                (false, true) => timing::ALU_MEM_L,
            };
            let dst = cpu.ea_read(bus, &mut ea, &mut time)?;
            let res = (dst ^ (cpu.regs.d[reg as usize] & size.mask())) & size.mask();
            cpu.set_flags_move(size, res);
            cpu.ea_write(bus, &mut ea, &mut time, res)?;
            Ok(time)
        }
    }
}

fn cmpa<B: BusPort + ?Sized>(
    cpu: &mut Cpu68000,
    bus: &mut B,
    op: u16,
    reg: u8,
    size: Size,
) -> ExecResult {
    let mut ea = Cpu68000::decode_ea(op, size)?;
    let mut time = timing::CMPA;
    let src = cpu.ea_read(bus, &mut ea, &mut time)?;
    let src = if matches!(size, Size::Word) {
        src as u16 as i16 as u32
    } else {
        src
    };
    let dst = cpu.regs.a(reg);
    let res = dst.wrapping_sub(src);
    cpu.set_flags_cmp(Size::Long, src, dst, res);
    Ok(time)
}

fn cmpm<B: BusPort + ?Sized>(
    cpu: &mut Cpu68000,
    bus: &mut B,
    op: u16,
    size: Size,
) -> ExecResult {
    let ax = ((op >> 9) & 7) as u8;
    let ay = (op & 7) as u8;
    let src_addr = cpu.regs.a(ay);
    cpu.regs.set_a(ay, src_addr.wrapping_add(postinc_step(ay, size)));
    let src = read_mem(bus, src_addr & 0x00FF_FFFF, size)?;
    let dst_addr = cpu.regs.a(ax);
    cpu.regs.set_a(ax, dst_addr.wrapping_add(postinc_step(ax, size)));
    let dst = read_mem(bus, dst_addr & 0x00FF_FFFF, size)?;
    let res = dst.wrapping_sub(src) & size.mask();
    cpu.set_flags_cmp(size, src, dst, res);
    Ok(if size.is_long() {
        timing::CMPM_L
    } else {
        timing::CMPM_BW
    })
}

/// ABCD/SBCD, register or memory (predecrement) form.
pub(crate) fn abcd_sbcd<B: BusPort + ?Sized>(
    cpu: &mut Cpu68000,
    bus: &mut B,
    op: u16,
    is_add: bool,
) -> ExecResult {
    let rx = ((op >> 9) & 7) as u8;
    let ry = (op & 7) as u8;
    let x = cpu.x_bit() as u8;
    if op & 8 != 0 {
        let src_addr = predecrement(cpu, ry, Size::Byte);
        let src = bus.read_byte(src_addr)?;
        let dst_addr = predecrement(cpu, rx, Size::Byte);
        let dst = bus.read_byte(dst_addr)?;
        let (res, carry, overflow) = if is_add {
            bcd_add(src, dst, x)
        } else {
            bcd_sub(dst, src, x)
        };
        set_bcd_flags(cpu, res, carry, overflow);
        bus.write_byte(dst_addr, res)?;
        Ok(timing::BCD_MEM)
    } else {
        let src = cpu.regs.d[ry as usize] as u8;
        let dst = cpu.regs.d[rx as usize] as u8;
        let (res, carry, overflow) = if is_add {
            bcd_add(src, dst, x)
        } else {
            bcd_sub(dst, src, x)
        };
        set_bcd_flags(cpu, res, carry, overflow);
        cpu.regs.set_d_byte(rx, res);
        Ok(timing::BCD_REG)
    }
}

/// BCD addition with extend: src + dst + x.
pub(crate) fn bcd_add(src: u8, dst: u8, x: u8) -> (u8, bool, bool) {
    let low = (dst & 0x0F) + (src & 0x0F) + x;
    let low_adjust: u16 = if low > 9 { 6 } else { 0 };

    let uncorrected = u16::from(dst) + u16::from(src) + u16::from(x);

    let low_carry = (low + if low > 9 { 6 } else { 0 }) >> 4;
    let high = (dst >> 4) + (src >> 4) + low_carry;
    let carry = high > 9;

    let result = uncorrected + low_adjust + if carry { 0x60 } else { 0 };
    let overflow = (!uncorrected & result & 0x80) != 0;
    (result as u8, carry, overflow)
}

/// BCD subtraction with extend: dst - src - x.
pub(crate) fn bcd_sub(dst: u8, src: u8, x: u8) -> (u8, bool, bool) {
    let uncorrected = dst.wrapping_sub(src).wrapping_sub(x);
    let mut result = uncorrected;

    let low_borrowed = (dst & 0x0F) < (src & 0x0F).saturating_add(x);
    if low_borrowed {
        result = result.wrapping_sub(6);
    }

    let high_borrowed = (dst >> 4) < (src >> 4) + u8::from(low_borrowed);
    if high_borrowed {
        result = result.wrapping_sub(0x60);
    }

    let borrow = high_borrowed || (low_borrowed && uncorrected < 6);
    let overflow = (uncorrected & !result & 0x80) != 0;
    (result, borrow, overflow)
}

/// BCD flag rule: Z sticky, C and X track the decimal carry.
pub(crate) fn set_bcd_flags(cpu: &mut Cpu68000, res: u8, carry: bool, overflow: bool) {
    let mut sr = cpu.regs.sr & !(flags::N | flags::V | flags::C | flags::X);
    if res & 0x80 != 0 {
        sr |= flags::N;
    }
    if res != 0 {
        sr &= !flags::Z;
    }
    if overflow {
        sr |= flags::V;
    }
    if carry {
        sr |= flags::C | flags::X;
    }
    cpu.regs.sr = sr;
}

// === Shared small helpers ===

pub(crate) fn write_d(cpu: &mut Cpu68000, reg: u8, size: Size, value: u32) {
    match size {
        Size::Byte => cpu.regs.set_d_byte(reg, value as u8),
        Size::Word => cpu.regs.set_d_word(reg, value as u16),
        Size::Long => cpu.regs.d[reg as usize] = value,
    }
}

fn postinc_step(reg: u8, size: Size) -> u32 {
    if reg == 7 && matches!(size, Size::Byte) {
        2
    } else {
        size.bytes()
    }
}

fn predecrement(cpu: &mut Cpu68000, reg: u8, size: Size) -> u32 {
    let addr = cpu.regs.a(reg).wrapping_sub(postinc_step(reg, size)) & 0x00FF_FFFF;
    cpu.regs.set_a(reg, addr);
    addr
}

fn read_mem<B: BusPort + ?Sized>(bus: &mut B, addr: u32, size: Size) -> ExecResult<u32> {
    Ok(match size {
        Size::Byte => u32::from(bus.read_byte(addr)?),
        Size::Word => u32::from(bus.read_word(addr)?),
        Size::Long => bus.read_long(addr)?,
    })
}

fn write_mem<B: BusPort + ?Sized>(
    bus: &mut B,
    addr: u32,
    size: Size,
    value: u32,
) -> ExecResult<()> {
    match size {
        Size::Byte => bus.write_byte(addr, value as u8)?,
        Size::Word => bus.write_word(addr, value as u16)?,
        Size::Long => bus.write_long(addr, value)?,
    }
    Ok(())
}
