//! MOVE, MOVEA and MOVEQ.

use emu_core::BusPort;

use crate::cpu::{Cpu68000, ExecResult};
use crate::decode::illegal;
use crate::ea::{AddrMode, Ea, Size};
use crate::timing;

/// Groups 1-3: MOVE.B/L/W and MOVEA.W/L.
///
/// The destination field has mode and register swapped relative to the
/// source. An address-register destination makes it MOVEA: no flags,
/// word sources sign-extend to the full register.
pub(crate) fn execute_move<B: BusPort + ?Sized>(
    cpu: &mut Cpu68000,
    bus: &mut B,
    opcode: u16,
    size: Size,
) -> ExecResult {
    let src_mode = AddrMode::decode(((opcode >> 3) & 7) as u8, (opcode & 7) as u8);
    let dst_mode = AddrMode::decode(((opcode >> 6) & 7) as u8, ((opcode >> 9) & 7) as u8);
    let (Some(src_mode), Some(dst_mode)) = (src_mode, dst_mode) else {
        return illegal();
    };
    if src_mode.is_addr_reg() && matches!(size, Size::Byte) {
        return illegal();
    }

    if let AddrMode::AddrReg(reg) = dst_mode {
        if matches!(size, Size::Byte) {
            return illegal();
        }
        let mut time = timing::MOVE_BASE;
        let mut src = Ea::new(src_mode, size);
        let value = cpu.ea_read(bus, &mut src, &mut time)?;
        let value = if matches!(size, Size::Word) {
            value as u16 as i16 as u32
        } else {
            value
        };
        cpu.regs.set_a(reg, value);
        return Ok(time);
    }

    // PC-relative and immediate destinations do not exist
    if matches!(
        dst_mode,
        AddrMode::PcDisp | AddrMode::PcIndex | AddrMode::Immediate
    ) {
        return illegal();
    }

    let mut time = if matches!(dst_mode, AddrMode::PreDec(_)) {
        timing::MOVE_BASE_PREDEC
    } else {
        timing::MOVE_BASE
    };
    let mut src = Ea::new(src_mode, size);
    let value = cpu.ea_read(bus, &mut src, &mut time)?;
    cpu.set_flags_move(size, value);
    let mut dst = Ea::new(dst_mode, size);
    cpu.ea_write(bus, &mut dst, &mut time, value)?;
    Ok(time)
}

/// MOVEQ #d8,Dn: sign-extended byte into the full register.
pub(crate) fn moveq(cpu: &mut Cpu68000, opcode: u16) -> ExecResult {
    if opcode & 0x0100 != 0 {
        return illegal();
    }
    let reg = ((opcode >> 9) & 7) as usize;
    let value = opcode as u8 as i8 as i32 as u32;
    cpu.regs.d[reg] = value;
    cpu.set_flags_move(Size::Long, value);
    Ok(timing::MOVEQ)
}
