//! The two MC6850 ACIAs at $FFFC00: keyboard (IKBD) and MIDI.
//!
//! Each ACIA is a control/status register plus a data register on the
//! next word. Their IRQ outputs are wire-ORed onto MFP GPIP line 4,
//! active low; the machine polls `irq_pending` and drives that line.
//!
//! | Offset | Register |
//! |--------|----------|
//! | $00    | Keyboard control (w) / status (r) |
//! | $02    | Keyboard data |
//! | $04    | MIDI control / status |
//! | $06    | MIDI data |

use std::collections::VecDeque;

use emu_core::{InterfaceVersion, IoModule};

/// Status: receive data register full.
const STATUS_RDRF: u8 = 0x01;
/// Status: transmit data register empty (always, nothing throttles us).
const STATUS_TDRE: u8 = 0x02;
/// Status: interrupt request (mirrors the IRQ output, active high here).
const STATUS_IRQ: u8 = 0x80;

/// One MC6850.
#[derive(Debug, Clone, Default)]
pub struct Acia6850 {
    control: u8,
    /// Bytes received from the device side, waiting for the CPU.
    rx: VecDeque<u8>,
    /// Last byte the CPU transmitted (the device side consumes it).
    tx: Option<u8>,
}

impl Acia6850 {
    fn status(&self) -> u8 {
        let mut status = STATUS_TDRE;
        if !self.rx.is_empty() {
            status |= STATUS_RDRF;
            if self.control & 0x80 != 0 {
                status |= STATUS_IRQ;
            }
        }
        status
    }

    fn read_data(&mut self) -> u8 {
        self.rx.pop_front().unwrap_or(0)
    }

    fn write_data(&mut self, value: u8) {
        self.tx = Some(value);
    }

    /// Device side: deliver a received byte to the CPU.
    pub fn receive(&mut self, value: u8) {
        self.rx.push_back(value);
    }

    /// Device side: take the last transmitted byte.
    pub fn take_transmitted(&mut self) -> Option<u8> {
        self.tx.take()
    }

    fn irq(&self) -> bool {
        self.status() & STATUS_IRQ != 0
    }
}

/// The keyboard/MIDI pair as one bus module.
#[derive(Debug, Clone, Default)]
pub struct AciaPair {
    pub keyboard: Acia6850,
    pub midi: Acia6850,
}

impl AciaPair {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IoModule for AciaPair {
    fn name(&self) -> &'static str {
        "acia"
    }

    fn version(&self) -> InterfaceVersion {
        InterfaceVersion::new(1, 2)
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn read_byte(&mut self, offset: u32) -> u8 {
        match offset {
            0x00 => self.keyboard.status(),
            0x02 => self.keyboard.read_data(),
            0x04 => self.midi.status(),
            0x06 => self.midi.read_data(),
            _ => 0xFF,
        }
    }

    fn write_byte(&mut self, offset: u32, value: u8) {
        match offset {
            0x00 => self.keyboard.control = value,
            0x02 => self.keyboard.write_data(value),
            0x04 => self.midi.control = value,
            0x06 => self.midi.write_data(value),
            _ => {}
        }
    }

    fn clock(&mut self, _cycles: u32) {}

    fn irq_pending(&self) -> bool {
        self.keyboard.irq() || self.midi.irq()
    }

    fn receive_byte(&mut self, channel: u32, value: u8) {
        match channel {
            0 => self.keyboard.receive(value),
            1 => self.midi.receive(value),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn received_byte_sets_rdrf_and_reads_back() {
        let mut acia = AciaPair::new();
        acia.keyboard.receive(0x39);
        assert_eq!(acia.read_byte(0x00) & STATUS_RDRF, STATUS_RDRF);
        assert_eq!(acia.read_byte(0x02), 0x39);
        assert_eq!(acia.read_byte(0x00) & STATUS_RDRF, 0, "queue drained");
    }

    #[test]
    fn irq_requires_receive_interrupt_enable() {
        let mut acia = AciaPair::new();
        acia.keyboard.receive(0x01);
        assert!(!acia.irq_pending());
        acia.write_byte(0x00, 0x80);
        assert!(acia.irq_pending());
    }

    #[test]
    fn transmit_is_always_empty() {
        let mut acia = AciaPair::new();
        assert_eq!(acia.read_byte(0x04) & STATUS_TDRE, STATUS_TDRE);
        acia.write_byte(0x06, 0x42);
        assert_eq!(acia.midi.take_transmitted(), Some(0x42));
    }
}
