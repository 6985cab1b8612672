
//! Frequency lookup table for MIDI note to phase increment conversion
//!
//! Converts a Q24 logarithmic frequency (`1 << 24` per octave) to a Q24
//! phase increment. Unlike `Sin`/`Exp2`/`Tanh`, this table depends on the
//! sample rate, so it is held behind a `RwLock` rather than a one-shot
//! `LazyLock`: `init` can be called again if the host changes sample rate
//! mid-run.

use std::sync::{LazyLock, RwLock};

const N_SAMPLES: usize = 4096;
const LG_N_SAMPLES: i32 = 12;
/// The table is built around logfreq = MAX_LOGFREQ_INT octaves (an
/// arbitrarily chosen anchor far above audio frequencies, matching the
/// reference implementation's convention of keeping lookup values away from
/// subnormal precision loss); real logfreq values are shifted back down to
/// their true octave by `lookup_logfreq`.
const MAX_LOGFREQ_INT: i32 = 16;

const LOGFREQ_BASE: i32 = 50_857_777; // (1<<24) * (log2(440) - 69/12), MIDI note 0 reference
const LOGFREQ_STEP: i32 = (1 << 24) / 12; // one semitone in Q24 octaves

fn build(sample_rate: f64) -> Vec<i32> {
    let y_start = (1u64 << (24 + MAX_LOGFREQ_INT)) as f64 / sample_rate;
    let inc = 2.0_f64.powf(1.0 / N_SAMPLES as f64);

    let mut lut = vec![0i32; N_SAMPLES + 1];
    let mut y = y_start;
    for slot in lut.iter_mut() {
        *slot = (y + 0.5).floor() as i32;
        y *= inc;
    }
    lut
}

static LUT: LazyLock<RwLock<Vec<i32>>> = LazyLock::new(|| RwLock::new(build(44_100.0)));

/// Frequency lookup table
pub struct FreqLut;

impl FreqLut {
    /// (Re)build the lookup table for a given sample rate. Safe to call more
    /// than once; a later call replaces the table built by an earlier one.
    pub fn init(sample_rate: f64) {
        let mut lut = LUT.write().expect("freqlut lock poisoned");
        *lut = build(sample_rate);
    }

    /// Convert a Q24 logarithmic frequency (`1 << 24` per octave, absolute —
    /// same convention as `dx7note::osc_freq`) to a Q24 phase increment.
    pub fn lookup_logfreq(logfreq: i32) -> i32 {
        let lut = LUT.read().expect("freqlut lock poisoned");

        let frac = logfreq & 0xff_ffff;
        let ix = (frac >> (24 - LG_N_SAMPLES)) as usize;
        let y0 = lut[ix];
        let y1 = lut[ix + 1];
        let dx = frac & ((1 << (24 - LG_N_SAMPLES)) - 1);
        let scaled_dx = dx >> (24 - LG_N_SAMPLES - 8);
        let interp = y0 + (((y1 - y0) * scaled_dx) >> 8);

        // The table was built around MAX_LOGFREQ_INT octaves; shift the
        // interpolated value down (or up) to the octave logfreq actually asks for.
        let octave = logfreq >> 24;
        let shift = MAX_LOGFREQ_INT - octave;
        if shift <= 0 {
            let widened = (interp as i64) << (-shift).min(30);
            widened.clamp(0, i32::MAX as i64) as i32
        } else if shift >= 31 {
            0
        } else {
            interp >> shift
        }
    }

    /// Convert MIDI note to phase increment
    ///
    /// # Arguments
    /// * `midinote` - MIDI note number (0-127)
    ///
    /// # Returns
    /// Phase increment value for the given note
    pub fn lookup(midinote: u8) -> u32 {
        let logfreq = LOGFREQ_BASE + LOGFREQ_STEP * (midinote as i32);
        Self::lookup_logfreq(logfreq) as u32
    }

    /// Convert MIDI note with fine tuning to phase increment
    ///
    /// # Arguments
    /// * `midinote` - Base MIDI note number (0-127)
    /// * `fine_tune` - Fine tuning in cents (-100 to +100)
    ///
    /// # Returns
    /// Phase increment value for the tuned note
    pub fn lookup_fine(midinote: u8, fine_tune: i16) -> u32 {
        let fine_adjust = ((fine_tune as i32) * LOGFREQ_STEP) / 1200; // cents -> Q24 octaves
        let logfreq = LOGFREQ_BASE + LOGFREQ_STEP * (midinote as i32) + fine_adjust;
        Self::lookup_logfreq(logfreq) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freqlut_lookup() {
        FreqLut::init(44100.0);

        // A4 (440 Hz) is MIDI note 69
        let phase_inc = FreqLut::lookup(69);
        assert!(phase_inc > 0);

        // Higher notes should have higher phase increments
        let high_note = FreqLut::lookup(81); // A5 (880 Hz)
        assert!(high_note > phase_inc);

        // A5 is one octave above A4: phase increment should double.
        assert!((high_note as i64 - 2 * phase_inc as i64).abs() < (phase_inc as i64) / 100);

        // Test the fine tuning function
        let fine_tuned = FreqLut::lookup_fine(69, 50); // 50 cents sharp
        assert!(fine_tuned > phase_inc);
    }

    #[test]
    fn test_freqlut_matches_expected_hz() {
        FreqLut::init(44100.0);
        let phase_inc = FreqLut::lookup(69) as f64;
        // phase_inc / 2^24 * sample_rate should equal 440 Hz
        let hz = phase_inc / (1u64 << 24) as f64 * 44100.0;
        assert!((hz - 440.0).abs() < 1.0);
    }

    #[test]
    fn test_freqlut_reinit_changes_table() {
        FreqLut::init(44100.0);
        let at_44k = FreqLut::lookup(69);
        FreqLut::init(48000.0);
        let at_48k = FreqLut::lookup(69);
        assert!(at_48k < at_44k);
        FreqLut::init(44100.0);
    }
}
