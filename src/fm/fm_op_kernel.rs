
//! FM operator kernel - the core of FM synthesis
//!
//! This module implements the basic building blocks of FM synthesis:
//! - Basic FM operators (with modulation input)
//! - Pure sine wave generators (no modulation)
//! - Feedback operators (self-modulation)

use super::{constants::*, sin::Sin};

/// Parameters for FM operator computation
#[derive(Clone, Debug)]
pub struct FmOpParams {
    pub level_in: i32,  // Input level (from envelope)
    pub gain_out: i32,  // Output gain (computed)
    pub freq: i32,      // Frequency (phase increment)
    pub phase: i32,     // Current phase
}

/// FM operator kernel - provides the core FM synthesis algorithms
pub struct FmOpKernel;

impl FmOpKernel {
    /// Compute FM operator with modulation input
    ///
    /// This is the basic FM operator that takes a modulation input and produces
    /// a modulated sine wave output. The gain linearly interpolates from gain1 to gain2
    /// over the N samples.
    ///
    /// # Arguments
    /// * `output` - Output buffer (N samples)
    /// * `input` - Modulation input buffer (N samples)
    /// * `phase0` - Starting phase
    /// * `freq` - Frequency (phase increment per sample)
    /// * `gain1` - Starting gain
    /// * `gain2` - Ending gain
    /// * `add` - Whether to add to existing output or replace
    pub fn compute(
        output: &mut [i32],
        input: &[i32],
        phase0: i32,
        freq: i32,
        gain1: i32,
        gain2: i32,
        add: bool,
    ) {
        assert_eq!(output.len(), N);
        assert_eq!(input.len(), N);

        let dgain = (gain2 - gain1 + ((N >> 1) as i32)) >> LG_N;
        let mut gain = gain1;
        let mut phase = phase0;

        if add {
            for i in 0..N {
                gain += dgain;
                let y = Sin::lookup(phase + input[i]);
                let y1 = ((y as i64) * (gain as i64)) >> 24;
                output[i] += y1 as i32;
                phase += freq;
            }
        } else {
            for i in 0..N {
                gain += dgain;
                let y = Sin::lookup(phase + input[i]);
                let y1 = ((y as i64) * (gain as i64)) >> 24;
                output[i] = y1 as i32;
                phase += freq;
            }
        }
    }

    /// Compute pure sine wave (no modulation input)
    ///
    /// This generates a pure sine wave with no frequency modulation input.
    /// Used for carriers and oscillators that don't need modulation.
    ///
    /// # Arguments
    /// * `output` - Output buffer (N samples)
    /// * `phase0` - Starting phase
    /// * `freq` - Frequency (phase increment per sample)
    /// * `gain1` - Starting gain
    /// * `gain2` - Ending gain
    /// * `add` - Whether to add to existing output or replace
    pub fn compute_pure(
        output: &mut [i32],
        phase0: i32,
        freq: i32,
        gain1: i32,
        gain2: i32,
        add: bool,
    ) {
        assert_eq!(output.len(), N);


        let dgain = (gain2 - gain1 + ((N >> 1) as i32)) >> LG_N;
        let mut gain = gain1;
        let mut phase = phase0;

        if add {
            for i in 0..N {
                gain += dgain;
                let y = Sin::lookup(phase);
                let y1 = ((y as i64) * (gain as i64)) >> 24;
                output[i] += y1 as i32;
                phase += freq;
            }
        } else {
            for i in 0..N {
                gain += dgain;
                let y = Sin::lookup(phase);
                let y1 = ((y as i64) * (gain as i64)) >> 24;
                output[i] = y1 as i32;
                phase += freq;
            }
        }
    }

    /// Compute FM operator with feedback
    ///
    /// This implements self-modulation (feedback) where the operator's output
    /// modulates its own frequency. This creates rich harmonic content and is
    /// essential for many classic FM sounds.
    ///
    /// # Arguments
    /// * `output` - Output buffer (N samples)
    /// * `phase0` - Starting phase
    /// * `freq` - Frequency (phase increment per sample)
    /// * `gain1` - Starting gain
    /// * `gain2` - Ending gain
    /// * `fb_buf` - Feedback buffer [y0, y1] (modified in-place)
    /// * `fb_shift` - Feedback amount (right shift amount)
    /// * `add` - Whether to add to existing output or replace
    pub fn compute_fb(
        output: &mut [i32],
        phase0: i32,
        freq: i32,
        gain1: i32,
        gain2: i32,
        fb_buf: &mut [i32; 2],
        fb_shift: i32,
        add: bool,
    ) {
        assert_eq!(output.len(), N);

        let dgain = (gain2 - gain1 + ((N >> 1) as i32)) >> LG_N;
        let mut gain = gain1;
        let mut phase = phase0;
        let mut y0 = fb_buf[0];
        let mut y = fb_buf[1];

        if add {
            for i in 0..N {
                gain += dgain;
                let shift_amount = (fb_shift + 1).min(31); // Clamp to prevent overflow
                let scaled_fb = (y0 + y) >> shift_amount;
                y0 = y;
                y = Sin::lookup(phase + scaled_fb);
                y = (((y as i64) * (gain as i64)) >> 24) as i32;
                output[i] += y as i32;
                phase += freq;
            }
        } else {
            for i in 0..N {
                gain += dgain;
                let shift_amount = (fb_shift + 1).min(31); // Clamp to prevent overflow
                let scaled_fb = (y0 + y) >> shift_amount;
                y0 = y;
                y = Sin::lookup(phase + scaled_fb);
                y = (((y as i64) * (gain as i64)) >> 24) as i32;
                output[i] = y as i32;
                phase += freq;
            }
        }

        fb_buf[0] = y0;
        fb_buf[1] = y;
    }

    /// Convenience method to zero a buffer
    pub fn zero_buffer(buffer: &mut [i32]) {
        buffer.fill(0);
    }

    /// Convenience method to scale a buffer by a gain value
    pub fn scale_buffer(buffer: &mut [i32], gain: i32) {
        for sample in buffer.iter_mut() {
            *sample = (((*sample as i64) * (gain as i64)) >> 24) as i32;
        }
    }
}

