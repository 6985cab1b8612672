
//! Pitch envelope generator
//!
//! Unlike the amplitude envelope, the pitch envelope is a distinct 4-stage
//! state machine with its own rate/level tables: rates are non-linear
//! (`pitchenv_rate`) and levels are signed, centered on 0 (`pitchenv_tab`),
//! since pitch deviation can go either direction from the operator's base
//! frequency. One instance is shared by every operator in a note (only
//! ratio-mode operators apply it; fixed-frequency operators ignore it).

/// Non-linear rate table: input rate 0-99 maps to a coarser 0-103 step size
/// before being multiplied by the per-sample-rate `unit_`.
const PITCHENV_RATE: [i32; 100] = [
    1, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13, 14, 14, 15, 16, 16, 17, 18, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28,
    30, 31, 33, 34, 36, 37, 38, 39, 41, 42, 44, 46, 47, 49, 51, 53, 54, 56, 58,
    60, 62, 64, 66, 68, 70, 72, 74, 76, 79, 82, 85, 88, 91, 94, 98, 102, 106,
    110, 115, 120, 125, 130, 135, 141, 147, 153, 159, 165, 171, 178, 185, 193,
    202, 211, 232, 243, 254, 255,
];

/// Signed pitch deviation table: input level 0-99 maps to a value roughly in
/// `[-128, 127]`, later shifted to Q24 octaves.
const PITCHENV_TAB: [i32; 100] = [
    -128, -116, -104, -95, -85, -76, -68, -61, -56, -52, -49, -46, -43, -41,
    -39, -37, -35, -33, -32, -31, -30, -29, -28, -27, -26, -25, -24, -23, -22,
    -21, -20, -19, -18, -17, -16, -15, -14, -13, -12, -11, -10, -9, -8, -7, -6,
    -5, -4, -3, -2, -1, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
    16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34,
    35, 38, 40, 43, 46, 49, 53, 58, 65, 73, 82, 92, 103, 115, 127,
];

/// Pitch envelope generator
#[derive(Clone, Debug)]
pub struct PitchEnv {
    rates: [i32; 4],
    levels: [i32; 4],
    ix: usize,
    level: i32,
    target_level: i32,
    rising: bool,
    inc: i32,
    down: bool,
    /// Per-sample-rate scale applied to `PITCHENV_RATE` entries, set once by
    /// `init`. Matches the reference derivation
    /// `unit_ = N * (1<<24) / (21.3 * sample_rate) + 0.5`.
    unit: f64,
}

impl Default for PitchEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl PitchEnv {
    /// Create a new pitch envelope
    pub fn new() -> Self {
        Self {
            rates: [0; 4],
            levels: [0; 4],
            ix: 0,
            level: 0,
            target_level: 0,
            rising: false,
            inc: 0,
            down: true,
            unit: Self::unit_for(44_100.0),
        }
    }

    fn unit_for(sample_rate: f64) -> f64 {
        const N: f64 = 64.0;
        N * (1u64 << 24) as f64 / (21.3 * sample_rate) + 0.5
    }

    /// Initialize pitch envelope with raw patch rates/levels (0-99 each) and
    /// the engine's current sample rate.
    pub fn init(&mut self, rates: &[i32; 4], levels: &[i32; 4], sample_rate: f64) {
        self.rates = *rates;
        self.levels = *levels;
        self.unit = Self::unit_for(sample_rate);
        self.level = PITCHENV_TAB[levels[3].clamp(0, 99) as usize] << 19;
        self.down = true;
        self.advance(0);
    }

    fn advance(&mut self, newix: usize) {
        self.ix = newix;
        if self.ix < 4 {
            let target_level = PITCHENV_TAB[self.levels[self.ix].clamp(0, 99) as usize] << 19;
            self.target_level = target_level;
            self.rising = target_level > self.level;

            let rate = self.rates[self.ix].clamp(0, 99) as usize;
            self.inc = (PITCHENV_RATE[rate] as f64 * self.unit) as i32;
        }
    }

    /// Advance the envelope by one block and return the current pitch
    /// deviation, in Q24 octaves (same units as `dx7note::osc_freq`).
    pub fn get_sample(&mut self) -> i32 {
        if self.ix < 4 {
            if self.rising {
                self.level += self.inc;
                if self.level >= self.target_level {
                    self.level = self.target_level;
                    self.advance(self.ix + 1);
                }
            } else {
                self.level -= self.inc;
                if self.level <= self.target_level {
                    self.level = self.target_level;
                    self.advance(self.ix + 1);
                }
            }
        }
        self.level >> 5
    }

    /// Handle key down/up events: down transitions through stages 0-2,
    /// key up (release) jumps straight to stage 3.
    pub fn keydown(&mut self, down: bool) {
        if down != self.down {
            self.down = down;
            self.advance(if down { 0 } else { 3 });
        }
    }

    /// Current envelope stage (0-3), matching `Env::get_position`'s
    /// convention of `>= 4` meaning fully settled.
    pub fn get_position(&self) -> i32 {
        self.ix as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitchenv_creation() {
        let pitchenv = PitchEnv::new();
        assert_eq!(pitchenv.get_position(), 0);
    }

    #[test]
    fn test_pitchenv_init_flat_is_near_zero() {
        let mut pitchenv = PitchEnv::new();
        let rates = [50, 50, 50, 50];
        let levels = [50, 50, 50, 50];
        pitchenv.init(&rates, &levels, 44_100.0);
        let sample = pitchenv.get_sample();
        assert!(sample.abs() < (1 << 16));
    }

    #[test]
    fn test_pitchenv_rises_toward_positive_level() {
        let mut pitchenv = PitchEnv::new();
        let rates = [99, 99, 99, 99];
        let levels = [99, 99, 50, 50];
        pitchenv.init(&rates, &levels, 44_100.0);
        let mut last = i32::MIN;
        for _ in 0..200 {
            last = pitchenv.get_sample();
        }
        assert!(last > 0);
    }

    #[test]
    fn test_pitchenv_keydown_release_reaches_stage_three() {
        let mut pitchenv = PitchEnv::new();
        let rates = [99, 99, 99, 99];
        let levels = [50, 50, 50, 10];
        pitchenv.init(&rates, &levels, 44_100.0);
        pitchenv.keydown(false);
        assert_eq!(pitchenv.get_position(), 3);
    }
}
