//! GLUE: the ST's address decoder and interrupt arbiter, reduced here to
//! the part the CPU can observe: scanline timing and the single
//! prioritised interrupt level on its IPL pins.
//!
//! HBL asserts level 2 for one clock call at each line rollover, VBL
//! level 4 at each frame rollover, and an MFP request rides in at level
//! 6. The reported level is the maximum of the active sources; the
//! machine forwards changes to the CPU's `set_irq`, which is the only
//! back-edge from peripherals to the CPU.
//!
//! PAL: 313 lines of 512 cycles at 8 MHz (50.05 Hz). NTSC: 263 lines of
//! 508 cycles (59.92 Hz).

/// HBL autovector level.
pub const LEVEL_HBL: u8 = 2;
/// VBL autovector level.
pub const LEVEL_VBL: u8 = 4;
/// MFP device-vectored level.
pub const LEVEL_MFP: u8 = 6;

/// Frame geometry for one video standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    lines_per_frame: u32,
    cycles_per_line: u32,
}

const PAL: Geometry = Geometry {
    lines_per_frame: 313,
    cycles_per_line: 512,
};

const NTSC: Geometry = Geometry {
    lines_per_frame: 263,
    cycles_per_line: 508,
};

/// The GLUE timing and interrupt state.
#[derive(Debug, Clone)]
pub struct Glue {
    geometry: Geometry,
    /// Cycle within the current scanline.
    line_cycle: u32,
    /// Current scanline.
    scanline: u32,
    frames: u64,
    /// Edges asserted by the most recent `clock` call.
    hbl: bool,
    vbl: bool,
    mfp: bool,
    /// Last level reported, for at-most-once-per-change delivery.
    last_level: u8,
}

impl Glue {
    #[must_use]
    pub fn new(pal: bool) -> Self {
        Self {
            geometry: if pal { PAL } else { NTSC },
            line_cycle: 0,
            scanline: 0,
            frames: 0,
            hbl: false,
            vbl: false,
            mfp: false,
            last_level: 0,
        }
    }

    pub fn reset(&mut self) {
        let geometry = self.geometry;
        *self = Self {
            geometry,
            ..Self::new(true)
        };
    }

    /// Cycles in one full frame.
    #[must_use]
    pub fn cycles_per_frame(&self) -> u32 {
        self.geometry.lines_per_frame * self.geometry.cycles_per_line
    }

    #[must_use]
    pub fn scanline(&self) -> u32 {
        self.scanline
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Current aggregated level (0 = none).
    #[must_use]
    pub fn level(&self) -> u8 {
        if self.mfp {
            LEVEL_MFP
        } else if self.vbl {
            LEVEL_VBL
        } else if self.hbl {
            LEVEL_HBL
        } else {
            0
        }
    }

    /// Advance by `cycles` consumed CPU cycles with the MFP's request
    /// line sampled at `mfp_pending`. Returns the aggregated level when
    /// it changed, so the caller drives `cpu.set_irq` at most once per
    /// change.
    pub fn clock(&mut self, cycles: u32, mfp_pending: bool) -> Option<u8> {
        // Edges from the previous call have been delivered
        self.hbl = false;
        self.vbl = false;
        self.mfp = mfp_pending;

        self.line_cycle += cycles;
        while self.line_cycle >= self.geometry.cycles_per_line {
            self.line_cycle -= self.geometry.cycles_per_line;
            self.scanline += 1;
            self.hbl = true;
            if self.scanline >= self.geometry.lines_per_frame {
                self.scanline = 0;
                self.frames += 1;
                self.vbl = true;
            }
        }

        let level = self.level();
        if level == self.last_level {
            None
        } else {
            self.last_level = level;
            Some(level)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_rollover_asserts_hbl() {
        let mut glue = Glue::new(true);
        assert_eq!(glue.clock(511, false), None);
        assert_eq!(glue.clock(1, false), Some(LEVEL_HBL));
        assert_eq!(glue.scanline(), 1);
    }

    #[test]
    fn hbl_clears_on_the_next_clock() {
        let mut glue = Glue::new(true);
        glue.clock(512, false);
        assert_eq!(glue.clock(4, false), Some(0), "edge withdrawn");
    }

    #[test]
    fn frame_rollover_asserts_vbl_over_hbl() {
        let mut glue = Glue::new(true);
        let frame = glue.cycles_per_frame();
        assert_eq!(glue.clock(frame, false), Some(LEVEL_VBL));
        assert_eq!(glue.frame_count(), 1);
        assert_eq!(glue.scanline(), 0);
    }

    #[test]
    fn mfp_wins_over_everything() {
        let mut glue = Glue::new(true);
        assert_eq!(glue.clock(512, true), Some(LEVEL_MFP));
    }

    #[test]
    fn no_change_is_reported_once() {
        let mut glue = Glue::new(true);
        assert_eq!(glue.clock(4, true), Some(LEVEL_MFP));
        assert_eq!(glue.clock(4, true), None, "level already delivered");
        assert_eq!(glue.clock(4, false), Some(0));
    }

    #[test]
    fn ntsc_geometry() {
        let glue = Glue::new(false);
        assert_eq!(glue.cycles_per_frame(), 263 * 508);
    }

    #[test]
    fn pal_frame_is_160256_cycles() {
        let glue = Glue::new(true);
        assert_eq!(glue.cycles_per_frame(), 313 * 512);
    }
}
