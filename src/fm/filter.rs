
//! Output filter: DC blocker, gain stage, and a 4-pole resonant lowpass
//! with tanh-based saturation, applied to the mixed note output before it
//! leaves the engine.
//!
//! The lowpass is a transposed-direct-form-II topology-preserving (TPT)
//! ladder filter with Newton-Raphson-corrected resonance feedback, the same
//! family used in the Oberheim-style analog filter emulations this design
//! is grounded on. Cutoff and resonance are both logarithmically scaled so a
//! linear 0.0-1.0 parameter sweep tracks how an analog filter's controls
//! actually feel.

use super::tanh::Tanh;

fn logsc(param: f32, min: f32, max: f32) -> f32 {
    (param.clamp(0.0, 1.0) * 9.0 + 1.0).log10() * (max - min) + min
}

/// One-pole topology-preserving filter stage (used for the brightness and
/// damping stages, which don't need feedback correction).
#[inline]
fn tptpc(state: &mut f32, input: f32, cutoff: f32) -> f32 {
    let v = (input - *state) * cutoff / (1.0 + cutoff);
    let result = v + *state;
    *state = result + v;
    result
}

/// Same as `tptpc` but pre-warps `cutoff` from a normalized 0-1 frequency
/// into the filter's internal coefficient space.
#[inline]
fn tptlpupw(state: &mut f32, input: f32, cutoff: f32, sr_inv: f32) -> f32 {
    let warped = (cutoff * sr_inv * std::f32::consts::PI).tan();
    tptpc(state, input, warped)
}

/// Newton-Raphson corrected combine for the resonant 4-pole ladder: folds
/// the nonlinear feedback path (`g`) into a single estimate of the next
/// ladder input given the current sample and loop gain.
#[inline]
fn nr24(sample: f32, g: f32, lpc: f32) -> f32 {
    let mut y = sample;
    for _ in 0..2 {
        let residual = y + g * y.tanh() * lpc - sample;
        let deriv = 1.0 + g * lpc * (1.0 - y.tanh().powi(2));
        y -= residual / deriv.max(1e-6);
    }
    y
}

/// Output filter state, one instance shared across all voices since the
/// mixed output is a single stereo-summed signal.
#[derive(Clone, Debug)]
pub struct OutputFilter {
    sample_rate: f64,

    // DC blocker state
    dc_id: f32,
    dc_od: f32,

    // Brightness / pre-filter stage
    bright_state: f32,
    pre_state: f32,

    // 4-pole ladder state
    s1: f32,
    s2: f32,
    s3: f32,
    s4: f32,

    /// Overall output gain, 0.0 mutes entirely (and skips the filter math)
    pub gain: f32,
    /// Normalized cutoff, 0.0-1.0
    pub cutoff: f32,
    /// Normalized resonance, 0.0-1.0
    pub resonance: f32,
    /// Normalized filter-mode mix, selects among the four ladder taps
    pub mode_mix: f32,
}

impl OutputFilter {
    /// Create a new filter at the given sample rate, with a transparent
    /// (fully open, no resonance) default response.
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            dc_id: 0.0,
            dc_od: 0.0,
            bright_state: 0.0,
            pre_state: 0.0,
            s1: 0.0,
            s2: 0.0,
            s3: 0.0,
            s4: 0.0,
            gain: 1.0,
            cutoff: 1.0,
            resonance: 0.0,
            mode_mix: 0.0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    /// Process a block in place. Samples are expected in the engine's
    /// working format: the 24-bit-range fixed point produced by the voice
    /// mix (full scale `1 << 23`), converted to `f32` in `[-1.0, 1.0]`
    /// internally and converted back on exit.
    pub fn process(&mut self, work: &mut [i32]) {
        if self.gain <= 0.0 {
            work.fill(0);
            return;
        }

        let sr_inv = (1.0 / self.sample_rate) as f32;
        let dc_r = 1.0 - 126.0 / self.sample_rate as f32;

        let raw: Vec<f32> = work.iter().map(|&s| s as f32 / (1i64 << 23) as f32).collect();
        let mut floats = raw.clone();

        // One-pole DC blocker: y[i] = x[i] - x[i-1] + R*y[i-1], carrying the
        // last raw input and filtered output across block boundaries.
        for i in 0..floats.len() {
            let prev_raw = if i == 0 { self.dc_id } else { raw[i - 1] };
            let prev_out = if i == 0 { self.dc_od } else { floats[i - 1] };
            floats[i] = raw[i] - prev_raw + dc_r * prev_out;
        }
        self.dc_id = *raw.last().unwrap_or(&0.0);
        self.dc_od = *floats.last().unwrap_or(&0.0);

        let cutoff_norm = logsc(self.cutoff, 60.0, 19_000.0);
        let r_cutoff = (cutoff_norm * sr_inv * std::f32::consts::PI).tan();
        let r_reso = 0.991 - logsc(1.0 - self.resonance, 0.0, 0.991);
        let r24 = 3.5 * r_reso;
        let lpc = r_cutoff / (1.0 + r_cutoff);
        let g = r24;

        for sample in floats.iter_mut() {
            let mut s = *sample;
            s -= 0.45 * tptlpupw(&mut self.pre_state, s, 15.0, sr_inv);
            s = tptpc(&mut self.bright_state, s, 0.4);

            let y0 = nr24(s, g, lpc);

            // First ladder stage, with the feedback-path state itself
            // soft-clipped through the tanh table rather than raw atanf.
            let v1 = (y0 - self.s1) * lpc;
            let y1 = v1 + self.s1;
            self.s1 = Tanh::lookup_f32((y1 + v1) * 0.0876) / 0.0876;

            let y2 = tptpc(&mut self.s2, y1, r_cutoff);
            let y3 = tptpc(&mut self.s3, y2, r_cutoff);
            let y4 = tptpc(&mut self.s4, y3, r_cutoff);

            let mmt = self.mode_mix.clamp(0.0, 1.0) * 3.0;
            let mmch = mmt as i32;
            let frac = mmt - mmch as f32;
            let taps = [y1, y2, y3, y4];
            let a = taps[mmch.min(2) as usize];
            let b = taps[(mmch + 1).min(3) as usize];
            let mc = a + (b - a) * frac;

            *sample = mc * (1.0 + r24 * 0.45) * self.gain;
        }

        for (slot, f) in work.iter_mut().zip(floats.iter()) {
            let clamped = f.clamp(-1.0, 1.0);
            *slot = (clamped * (1i64 << 23) as f32) as i32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_passes_signal_when_wide_open() {
        let mut filter = OutputFilter::new(48_000.0);
        filter.cutoff = 1.0;
        filter.resonance = 0.0;
        let mut work = vec![1 << 20; 64];
        filter.process(&mut work);
        assert!(work.iter().any(|&s| s != 0));
    }

    #[test]
    fn test_filter_zero_gain_mutes() {
        let mut filter = OutputFilter::new(48_000.0);
        filter.gain = 0.0;
        let mut work = vec![1 << 20; 64];
        filter.process(&mut work);
        assert!(work.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_filter_does_not_blow_up_with_high_resonance() {
        let mut filter = OutputFilter::new(48_000.0);
        filter.cutoff = 0.5;
        filter.resonance = 0.99;
        let mut work = vec![1 << 22; 64];
        for _ in 0..20 {
            filter.process(&mut work);
            for &s in &work {
                assert!(s.unsigned_abs() < (1 << 30));
            }
        }
    }

    #[test]
    fn test_filter_dc_blocker_removes_constant_offset() {
        let mut filter = OutputFilter::new(48_000.0);
        filter.cutoff = 1.0;
        let mut peak = 0i32;
        for _ in 0..200 {
            let mut work = vec![1 << 18; 64];
            filter.process(&mut work);
            peak = work[63];
        }
        // After settling, a constant input should be suppressed toward zero.
        assert!(peak.unsigned_abs() < (1 << 17));
    }
}
