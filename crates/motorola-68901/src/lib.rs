//! MFP 68901 Multi-Function Peripheral.
//!
//! The ST's interrupt controller: 16 prioritised sources behind
//! enable/pending/in-service/mask register pairs, four timers, and an
//! 8-bit GPIP port. Sits at $FFFA01 on odd bytes only.
//!
//! # Register map (register index = odd offset / 2)
//!
//! | Reg | Name  | Reg | Name  |
//! |-----|-------|-----|-------|
//! | 0   | GPIP  | 12  | TACR  |
//! | 1   | AER   | 13  | TBCR  |
//! | 2   | DDR   | 14  | TCDCR |
//! | 3   | IERA  | 15  | TADR  |
//! | 4   | IERB  | 16  | TBDR  |
//! | 5   | IPRA  | 17  | TCDR  |
//! | 6   | IPRB  | 18  | TDDR  |
//! | 7   | ISRA  | 19  | SCR   |
//! | 8   | ISRB  | 20  | UCR   |
//! | 9   | IMRA  | 21  | RSR   |
//! | 10  | IMRB  | 22  | TSR   |
//! | 11  | VR    | 23  | UDR   |
//!
//! Channel numbers (15 highest priority): GPIP7=15, GPIP6=14, Timer A=13,
//! receiver full=12, receiver error=11, transmitter empty=10, transmitter
//! error=9, Timer B=8, GPIP5=7, GPIP4=6, Timer C=5, Timer D=4, GPIP3..0=3..0.
//!
//! The timer clock is the MFP's own 2.4576 MHz crystal; `clock(cycles)`
//! takes consumed CPU cycles (8 MHz) and converts through a fractional
//! accumulator.

use emu_core::{InterfaceVersion, IoModule};

/// Timer A underflow channel.
pub const CHANNEL_TIMER_A: u8 = 13;
/// Timer B underflow channel.
pub const CHANNEL_TIMER_B: u8 = 8;
/// Timer C underflow channel.
pub const CHANNEL_TIMER_C: u8 = 5;
/// Timer D underflow channel.
pub const CHANNEL_TIMER_D: u8 = 4;
/// ACIA interrupt line (GPIP 4, active low).
pub const CHANNEL_ACIA: u8 = 6;

/// MFP timer clock in Hz.
pub const TIMER_CLOCK_HZ: u32 = 2_457_600;
/// CPU clock the cycle conversion assumes.
pub const CPU_CLOCK_HZ: u32 = 8_000_000;

/// One of the four timers.
#[derive(Debug, Clone, Copy, Default)]
struct Timer {
    /// Control value: 0 stopped, 1-7 prescale select, 8+ event modes.
    control: u8,
    /// Data register as written (reload value; 0 counts as 256).
    data: u8,
    /// Live down-counter.
    counter: u8,
    /// Prescaler down-counter.
    prescale: u16,
}

impl Timer {
    const PRESCALE: [u16; 8] = [0, 4, 10, 16, 50, 64, 100, 200];

    fn reload(&self) -> u8 {
        self.data
    }

    /// Advance by one timer-clock tick. True on underflow.
    fn tick(&mut self) -> bool {
        let div = Self::PRESCALE[(self.control & 7) as usize];
        if div == 0 {
            return false;
        }
        self.prescale += 1;
        if self.prescale < div {
            return false;
        }
        self.prescale = 0;
        self.counter = self.counter.wrapping_sub(1);
        if self.counter == 0 {
            self.counter = self.reload();
            true
        } else {
            false
        }
    }
}

/// The MFP 68901.
#[derive(Debug, Clone, Default)]
pub struct Mfp68901 {
    /// GPIP input levels as last driven by the machine.
    gpip_in: u8,
    /// GPIP output latch.
    gpip_out: u8,
    /// Active-edge register: 1 = interrupt on rising edge.
    aer: u8,
    /// Data direction: 1 = output.
    ddr: u8,
    /// Enable, pending, in-service, mask: one bit per channel, bit 15 =
    /// channel 15.
    ier: u16,
    ipr: u16,
    isr: u16,
    imr: u16,
    /// Vector register: top nybble of the supplied vector; bit 3 selects
    /// software end-of-interrupt mode.
    vr: u8,
    timers: [Timer; 4],
    /// Fractional accumulator for the 8 MHz -> 2.4576 MHz conversion.
    clock_acc: u32,
}

impl Mfp68901 {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise a pending interrupt on `channel` if it is enabled.
    pub fn request(&mut self, channel: u8) {
        let bit = 1u16 << channel;
        if self.ier & bit != 0 {
            self.ipr |= bit;
        }
    }

    /// Drive one GPIP input line; the configured edge raises the
    /// corresponding channel.
    pub fn set_gpip_line(&mut self, line: u8, level: bool) {
        let bit = 1u8 << line;
        let old = self.gpip_in & bit != 0;
        if level {
            self.gpip_in |= bit;
        } else {
            self.gpip_in &= !bit;
        }
        let rising = self.aer & bit != 0;
        if old != level && level == rising {
            if let Some(channel) = Self::gpip_channel(line) {
                self.request(channel);
            }
        }
    }

    fn gpip_channel(line: u8) -> Option<u8> {
        match line {
            0..=3 => Some(line),
            4 => Some(6),
            5 => Some(7),
            6 => Some(14),
            7 => Some(15),
            _ => None,
        }
    }

    /// Highest pending channel that the mask lets through and that
    /// outranks every in-service channel.
    fn best_pending(&self) -> Option<u8> {
        let requestable = self.ipr & self.imr;
        if requestable == 0 {
            return None;
        }
        let best = 15 - requestable.leading_zeros() as u8;
        if self.isr != 0 {
            let in_service = 15 - self.isr.leading_zeros() as u8;
            if best <= in_service {
                return None;
            }
        }
        Some(best)
    }

    /// Timer data register readback: the live counter.
    fn timer_data(&self, t: usize) -> u8 {
        self.timers[t].counter
    }

    fn write_timer_data(&mut self, t: usize, value: u8) {
        self.timers[t].data = value;
        if self.timers[t].control & 7 == 0 {
            // Stopped timers load the counter immediately
            self.timers[t].counter = value;
        }
    }

    fn timer_underflow_channel(t: usize) -> u8 {
        match t {
            0 => CHANNEL_TIMER_A,
            1 => CHANNEL_TIMER_B,
            2 => CHANNEL_TIMER_C,
            _ => CHANNEL_TIMER_D,
        }
    }

    fn read_register(&mut self, reg: u8) -> u8 {
        match reg {
            0 => (self.gpip_in & !self.ddr) | (self.gpip_out & self.ddr),
            1 => self.aer,
            2 => self.ddr,
            3 => (self.ier >> 8) as u8,
            4 => self.ier as u8,
            5 => (self.ipr >> 8) as u8,
            6 => self.ipr as u8,
            7 => (self.isr >> 8) as u8,
            8 => self.isr as u8,
            9 => (self.imr >> 8) as u8,
            10 => self.imr as u8,
            11 => self.vr,
            12 => self.timers[0].control,
            13 => self.timers[1].control,
            14 => (self.timers[2].control & 7) << 4 | (self.timers[3].control & 7),
            15..=18 => self.timer_data((reg - 15) as usize),
            // Serial registers are not modelled; transmitter reads empty
            22 => 0x80,
            _ => 0,
        }
    }

    fn write_register(&mut self, reg: u8, value: u8) {
        match reg {
            0 => self.gpip_out = value,
            1 => self.aer = value,
            2 => self.ddr = value,
            3 => {
                self.ier = (self.ier & 0x00FF) | u16::from(value) << 8;
                // Disabling a channel also drops its pending bit
                self.ipr &= self.ier;
            }
            4 => {
                self.ier = (self.ier & 0xFF00) | u16::from(value);
                self.ipr &= self.ier;
            }
            // IPR/ISR writes clear where a zero is written
            5 => self.ipr &= u16::from(value) << 8 | 0x00FF,
            6 => self.ipr &= 0xFF00 | u16::from(value),
            7 => self.isr &= u16::from(value) << 8 | 0x00FF,
            8 => self.isr &= 0xFF00 | u16::from(value),
            9 => self.imr = (self.imr & 0x00FF) | u16::from(value) << 8,
            10 => self.imr = (self.imr & 0xFF00) | u16::from(value),
            11 => self.vr = value,
            12 => self.timers[0].control = value & 0x0F,
            13 => self.timers[1].control = value & 0x0F,
            14 => {
                self.timers[2].control = (value >> 4) & 7;
                self.timers[3].control = value & 7;
            }
            15..=18 => self.write_timer_data((reg - 15) as usize, value),
            _ => {}
        }
    }
}

impl IoModule for Mfp68901 {
    fn name(&self) -> &'static str {
        "mfp68901"
    }

    fn version(&self) -> InterfaceVersion {
        InterfaceVersion::new(1, 2)
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn read_byte(&mut self, offset: u32) -> u8 {
        // The MFP sits on the low byte of the bus: odd offsets only
        if offset & 1 == 0 {
            return 0xFF;
        }
        let reg = (offset >> 1) as u8;
        if reg < 24 { self.read_register(reg) } else { 0xFF }
    }

    fn write_byte(&mut self, offset: u32, value: u8) {
        if offset & 1 == 0 {
            return;
        }
        let reg = (offset >> 1) as u8;
        if reg < 24 {
            self.write_register(reg, value);
        }
    }

    fn clock(&mut self, cycles: u32) {
        // 8 MHz CPU cycles to 2.4576 MHz timer ticks: x 192 / 625
        self.clock_acc += cycles * 192;
        let mut ticks = self.clock_acc / 625;
        self.clock_acc %= 625;
        while ticks > 0 {
            for t in 0..4 {
                if self.timers[t].tick() {
                    self.request(Self::timer_underflow_channel(t));
                }
            }
            ticks -= 1;
        }
    }

    fn irq_pending(&self) -> bool {
        self.best_pending().is_some()
    }

    fn set_input_line(&mut self, line: u8, level: bool) {
        self.set_gpip_line(line, level);
    }

    /// Interrupt acknowledge: supply `(VR & $F0) | channel` and retire the
    /// pending bit. Software end-of-interrupt mode parks the channel in
    /// ISR until the handler clears it.
    fn irq_vector(&mut self) -> Option<u8> {
        let channel = self.best_pending()?;
        let bit = 1u16 << channel;
        self.ipr &= !bit;
        if self.vr & 0x08 != 0 {
            self.isr |= bit;
        }
        Some((self.vr & 0xF0) | channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Registers are on odd bytes; index 2*reg+1.
    fn write_reg(mfp: &mut Mfp68901, reg: u8, value: u8) {
        mfp.write_byte(u32::from(reg) * 2 + 1, value);
    }

    fn read_reg(mfp: &mut Mfp68901, reg: u8) -> u8 {
        mfp.read_byte(u32::from(reg) * 2 + 1)
    }

    fn enabled_timer_a(data: u8, control: u8) -> Mfp68901 {
        let mut mfp = Mfp68901::new();
        write_reg(&mut mfp, 3, 0x20); // IERA: Timer A
        write_reg(&mut mfp, 9, 0x20); // IMRA: Timer A
        write_reg(&mut mfp, 15, data); // TADR
        write_reg(&mut mfp, 12, control); // TACR
        mfp
    }

    #[test]
    fn even_offsets_float() {
        let mut mfp = Mfp68901::new();
        assert_eq!(mfp.read_byte(0), 0xFF);
        assert_eq!(mfp.read_byte(6), 0xFF);
    }

    #[test]
    fn timer_a_underflow_raises_pending() {
        // Reload 1, prescale /4: underflow every 4 timer ticks
        let mut mfp = enabled_timer_a(1, 1);
        // 100 CPU cycles is ~30 timer ticks, enough for several underflows
        mfp.clock(100);
        assert!(mfp.irq_pending());
        assert_eq!(read_reg(&mut mfp, 5) & 0x20, 0x20, "IPRA bit set");
    }

    #[test]
    fn disabled_timer_never_pends() {
        let mut mfp = enabled_timer_a(1, 0);
        mfp.clock(10_000);
        assert!(!mfp.irq_pending());
    }

    #[test]
    fn masked_channel_does_not_request() {
        let mut mfp = enabled_timer_a(1, 1);
        write_reg(&mut mfp, 9, 0x00); // mask Timer A out
        mfp.clock(100);
        assert!(!mfp.irq_pending(), "pending but masked");
        assert_eq!(read_reg(&mut mfp, 5) & 0x20, 0x20, "IPRA still latched");
    }

    #[test]
    fn vector_combines_base_and_channel() {
        let mut mfp = enabled_timer_a(1, 1);
        write_reg(&mut mfp, 11, 0x40); // VR base $40, auto EOI
        mfp.clock(100);
        assert_eq!(mfp.irq_vector(), Some(0x40 | 13));
        assert!(!mfp.irq_pending(), "acknowledge clears pending");
    }

    #[test]
    fn software_eoi_blocks_lower_channels_until_cleared() {
        let mut mfp = enabled_timer_a(1, 1);
        write_reg(&mut mfp, 11, 0x48); // VR base $40, software EOI
        mfp.clock(100);
        assert_eq!(mfp.irq_vector(), Some(0x40 | 13));
        // Timer A is now in service; a new Timer A underflow cannot
        // re-request until ISR is cleared
        mfp.clock(100);
        assert!(!mfp.irq_pending());
        write_reg(&mut mfp, 7, 0x00); // clear ISRA
        assert!(mfp.irq_pending());
    }

    #[test]
    fn gpip_edge_uses_aer() {
        let mut mfp = Mfp68901::new();
        write_reg(&mut mfp, 3, 0x40); // IERA bit 6 = channel 14 = GPIP6
        write_reg(&mut mfp, 9, 0x40);
        // AER bit clear: falling edge active
        mfp.set_gpip_line(6, true);
        assert!(!mfp.irq_pending());
        mfp.set_gpip_line(6, false);
        assert!(mfp.irq_pending());
    }

    #[test]
    fn timer_counter_reads_back_live_value() {
        let mut mfp = enabled_timer_a(100, 1);
        mfp.clock(40); // ~12 timer ticks, /4 prescale = 3 counts
        let counter = read_reg(&mut mfp, 15);
        assert!(counter < 100, "counter moved, read {counter}");
    }

    #[test]
    fn writing_zero_to_ipr_clears() {
        let mut mfp = enabled_timer_a(1, 1);
        mfp.clock(100);
        assert!(mfp.irq_pending());
        write_reg(&mut mfp, 5, 0x00);
        assert!(!mfp.irq_pending());
    }
}
