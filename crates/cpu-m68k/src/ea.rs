//! Effective-address decode, resolution and operand access.
//!
//! The twelve 68000 addressing modes, decoded from the 6-bit mode/register
//! field. An [`Ea`] caches its computed address so read-modify-write
//! instructions touch extension words and auto-increments exactly once,
//! and so the effective-address cycle column is charged on first touch
//! only.

use emu_core::BusPort;

use crate::cpu::{Cpu68000, ExecResult, Exception};

/// Operand size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Byte,
    Word,
    Long,
}

impl Size {
    /// Standard two-bit size field: 00 byte, 01 word, 10 long.
    pub(crate) const fn from_bits(bits: u16) -> Option<Self> {
        match bits & 3 {
            0 => Some(Self::Byte),
            1 => Some(Self::Word),
            2 => Some(Self::Long),
            _ => None,
        }
    }

    /// MOVE size field: 01 byte, 11 word, 10 long.
    pub(crate) const fn from_move_bits(bits: u16) -> Option<Self> {
        match bits & 3 {
            1 => Some(Self::Byte),
            3 => Some(Self::Word),
            2 => Some(Self::Long),
            _ => None,
        }
    }

    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::Long => 4,
        }
    }

    pub(crate) const fn mask(self) -> u32 {
        match self {
            Self::Byte => 0xFF,
            Self::Word => 0xFFFF,
            Self::Long => 0xFFFF_FFFF,
        }
    }

    pub(crate) const fn sign_bit(self) -> u32 {
        match self {
            Self::Byte => 0x80,
            Self::Word => 0x8000,
            Self::Long => 0x8000_0000,
        }
    }

    pub(crate) const fn is_long(self) -> bool {
        matches!(self, Self::Long)
    }
}

/// Decoded addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddrMode {
    /// Dn
    DataReg(u8),
    /// An
    AddrReg(u8),
    /// (An)
    Indirect(u8),
    /// (An)+
    PostInc(u8),
    /// -(An)
    PreDec(u8),
    /// d16(An)
    Disp(u8),
    /// d8(An,Xn)
    Index(u8),
    /// (xxx).W
    AbsShort,
    /// (xxx).L
    AbsLong,
    /// d16(PC)
    PcDisp,
    /// d8(PC,Xn)
    PcIndex,
    /// #imm
    Immediate,
}

impl AddrMode {
    pub(crate) const fn decode(mode: u8, reg: u8) -> Option<Self> {
        match mode & 7 {
            0 => Some(Self::DataReg(reg)),
            1 => Some(Self::AddrReg(reg)),
            2 => Some(Self::Indirect(reg)),
            3 => Some(Self::PostInc(reg)),
            4 => Some(Self::PreDec(reg)),
            5 => Some(Self::Disp(reg)),
            6 => Some(Self::Index(reg)),
            _ => match reg & 7 {
                0 => Some(Self::AbsShort),
                1 => Some(Self::AbsLong),
                2 => Some(Self::PcDisp),
                3 => Some(Self::PcIndex),
                4 => Some(Self::Immediate),
                _ => None,
            },
        }
    }

    pub(crate) const fn is_data_reg(self) -> bool {
        matches!(self, Self::DataReg(_))
    }

    pub(crate) const fn is_addr_reg(self) -> bool {
        matches!(self, Self::AddrReg(_))
    }

    pub(crate) const fn is_reg_or_imm(self) -> bool {
        matches!(self, Self::DataReg(_) | Self::AddrReg(_) | Self::Immediate)
    }

    /// Documented effective-address calculation cycles (operand fetch
    /// included). Register direct is free; everything else pays bus time.
    pub(crate) const fn cycles(self, size: Size) -> u32 {
        let long = size.is_long();
        match self {
            Self::DataReg(_) | Self::AddrReg(_) => 0,
            Self::Indirect(_) | Self::PostInc(_) => {
                if long { 8 } else { 4 }
            }
            Self::PreDec(_) => {
                if long { 10 } else { 6 }
            }
            Self::Disp(_) | Self::PcDisp | Self::AbsShort => {
                if long { 12 } else { 8 }
            }
            Self::Index(_) | Self::PcIndex => {
                if long { 14 } else { 10 }
            }
            Self::AbsLong => {
                if long { 16 } else { 12 }
            }
            Self::Immediate => {
                if long { 8 } else { 4 }
            }
        }
    }
}

/// An effective address in flight: mode, operand size and the address once
/// it has been computed.
#[derive(Debug)]
pub(crate) struct Ea {
    pub mode: AddrMode,
    pub size: Size,
    addr: Option<u32>,
}

impl Ea {
    pub(crate) const fn new(mode: AddrMode, size: Size) -> Self {
        Self {
            mode,
            size,
            addr: None,
        }
    }
}

impl Cpu68000 {
    /// Auto-increment step: byte accesses through A7 keep the stack word
    /// aligned by moving 2.
    const fn step(reg: u8, size: Size) -> u32 {
        if reg == 7 && matches!(size, Size::Byte) {
            2
        } else {
            size.bytes()
        }
    }

    /// Decode a brief extension word and produce the index contribution:
    /// sign-extended d8 plus the chosen register in word or long width.
    fn index_extension<B: BusPort + ?Sized>(&mut self, bus: &mut B) -> Result<u32, Exception> {
        let ext = self.fetch_word(bus)?;
        let disp = ext as u8 as i8 as i32 as u32;
        let reg = ((ext >> 12) & 7) as u8;
        let value = if ext & 0x8000 != 0 {
            self.regs.a(reg)
        } else {
            self.regs.d[reg as usize]
        };
        let index = if ext & 0x0800 != 0 {
            value
        } else {
            value as u16 as i16 as i32 as u32
        };
        Ok(disp.wrapping_add(index))
    }

    /// Compute (and cache) the memory address of an effective address.
    ///
    /// Must only be called for memory modes; register-direct and immediate
    /// operands never reach here.
    pub(crate) fn ea_address<B: BusPort + ?Sized>(
        &mut self,
        bus: &mut B,
        ea: &mut Ea,
    ) -> Result<u32, Exception> {
        if let Some(addr) = ea.addr {
            return Ok(addr);
        }
        let addr = match ea.mode {
            AddrMode::Indirect(r) => self.regs.a(r),
            AddrMode::PostInc(r) => {
                let addr = self.regs.a(r);
                self.regs.set_a(r, addr.wrapping_add(Self::step(r, ea.size)));
                addr
            }
            AddrMode::PreDec(r) => {
                let addr = self.regs.a(r).wrapping_sub(Self::step(r, ea.size));
                self.regs.set_a(r, addr);
                addr
            }
            AddrMode::Disp(r) => {
                let disp = self.fetch_word(bus)? as i16 as i32 as u32;
                self.regs.a(r).wrapping_add(disp)
            }
            AddrMode::Index(r) => {
                let base = self.regs.a(r);
                base.wrapping_add(self.index_extension(bus)?)
            }
            AddrMode::AbsShort => self.fetch_word(bus)? as i16 as i32 as u32,
            AddrMode::AbsLong => self.fetch_long(bus)?,
            AddrMode::PcDisp => {
                let base = self.regs.pc;
                let disp = self.fetch_word(bus)? as i16 as i32 as u32;
                base.wrapping_add(disp)
            }
            AddrMode::PcIndex => {
                let base = self.regs.pc;
                base.wrapping_add(self.index_extension(bus)?)
            }
            AddrMode::DataReg(_) | AddrMode::AddrReg(_) | AddrMode::Immediate => {
                debug_assert!(false, "register/immediate EA has no address");
                return Err(Exception::Vector(crate::exceptions::Vector::IllegalInstruction as u8));
            }
        };
        let addr = addr & 0x00FF_FFFF;
        ea.addr = Some(addr);
        Ok(addr)
    }

    /// Read the operand, charging the EA cycle column on first touch.
    /// The value is returned zero-extended in a u32.
    pub(crate) fn ea_read<B: BusPort + ?Sized>(
        &mut self,
        bus: &mut B,
        ea: &mut Ea,
        time: &mut u32,
    ) -> Result<u32, Exception> {
        match ea.mode {
            AddrMode::DataReg(r) => Ok(self.regs.d[r as usize] & ea.size.mask()),
            AddrMode::AddrReg(r) => Ok(self.regs.a(r) & ea.size.mask()),
            AddrMode::Immediate => {
                *time += ea.mode.cycles(ea.size);
                match ea.size {
                    Size::Byte => Ok(u32::from(self.fetch_word(bus)? & 0xFF)),
                    Size::Word => Ok(u32::from(self.fetch_word(bus)?)),
                    Size::Long => self.fetch_long(bus),
                }
            }
            _ => {
                let first_touch = ea.addr.is_none();
                let addr = self.ea_address(bus, ea)?;
                if first_touch {
                    *time += ea.mode.cycles(ea.size);
                }
                match ea.size {
                    Size::Byte => Ok(u32::from(bus.read_byte(addr)?)),
                    Size::Word => Ok(u32::from(bus.read_word(addr)?)),
                    Size::Long => Ok(bus.read_long(addr)?),
                }
            }
        }
    }

    /// Write the operand back, charging the EA column on first touch.
    pub(crate) fn ea_write<B: BusPort + ?Sized>(
        &mut self,
        bus: &mut B,
        ea: &mut Ea,
        time: &mut u32,
        value: u32,
    ) -> Result<(), Exception> {
        match ea.mode {
            AddrMode::DataReg(r) => {
                match ea.size {
                    Size::Byte => self.regs.set_d_byte(r, value as u8),
                    Size::Word => self.regs.set_d_word(r, value as u16),
                    Size::Long => self.regs.d[r as usize] = value,
                }
                Ok(())
            }
            AddrMode::AddrReg(r) => {
                match ea.size {
                    Size::Word => self.regs.set_a_word(r, value as u16),
                    _ => self.regs.set_a(r, value),
                }
                Ok(())
            }
            AddrMode::Immediate => {
                debug_assert!(false, "immediate is not writable");
                Err(Exception::Vector(crate::exceptions::Vector::IllegalInstruction as u8))
            }
            _ => {
                let first_touch = ea.addr.is_none();
                let addr = self.ea_address(bus, ea)?;
                if first_touch {
                    *time += ea.mode.cycles(ea.size);
                }
                match ea.size {
                    Size::Byte => Ok(bus.write_byte(addr, value as u8)?),
                    Size::Word => Ok(bus.write_word(addr, value as u16)?),
                    Size::Long => Ok(bus.write_long(addr, value)?),
                }
            }
        }
    }

    /// Decode the low six opcode bits into an EA, or raise illegal.
    pub(crate) fn decode_ea(opcode: u16, size: Size) -> ExecResult<Ea> {
        let mode = ((opcode >> 3) & 7) as u8;
        let reg = (opcode & 7) as u8;
        AddrMode::decode(mode, reg)
            .map(|m| Ea::new(m, size))
            .ok_or(Exception::Vector(crate::exceptions::Vector::IllegalInstruction as u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_all_modes() {
        assert_eq!(AddrMode::decode(0, 3), Some(AddrMode::DataReg(3)));
        assert_eq!(AddrMode::decode(1, 3), Some(AddrMode::AddrReg(3)));
        assert_eq!(AddrMode::decode(2, 0), Some(AddrMode::Indirect(0)));
        assert_eq!(AddrMode::decode(3, 0), Some(AddrMode::PostInc(0)));
        assert_eq!(AddrMode::decode(4, 0), Some(AddrMode::PreDec(0)));
        assert_eq!(AddrMode::decode(5, 0), Some(AddrMode::Disp(0)));
        assert_eq!(AddrMode::decode(6, 0), Some(AddrMode::Index(0)));
        assert_eq!(AddrMode::decode(7, 0), Some(AddrMode::AbsShort));
        assert_eq!(AddrMode::decode(7, 1), Some(AddrMode::AbsLong));
        assert_eq!(AddrMode::decode(7, 2), Some(AddrMode::PcDisp));
        assert_eq!(AddrMode::decode(7, 3), Some(AddrMode::PcIndex));
        assert_eq!(AddrMode::decode(7, 4), Some(AddrMode::Immediate));
        assert_eq!(AddrMode::decode(7, 5), None);
    }

    #[test]
    fn ea_cycle_column_matches_the_manual() {
        assert_eq!(AddrMode::Indirect(0).cycles(Size::Word), 4);
        assert_eq!(AddrMode::Indirect(0).cycles(Size::Long), 8);
        assert_eq!(AddrMode::PreDec(0).cycles(Size::Word), 6);
        assert_eq!(AddrMode::Disp(0).cycles(Size::Word), 8);
        assert_eq!(AddrMode::Index(0).cycles(Size::Word), 10);
        assert_eq!(AddrMode::AbsShort.cycles(Size::Word), 8);
        assert_eq!(AddrMode::AbsLong.cycles(Size::Word), 12);
        assert_eq!(AddrMode::AbsLong.cycles(Size::Long), 16);
        assert_eq!(AddrMode::Immediate.cycles(Size::Long), 8);
    }
}
