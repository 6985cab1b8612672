//! The 155-byte unpacked voice patch: the canonical in-memory form every
//! other module (`dx7note`, `sysex`) reads and writes. A raw `[u8; 155]`
//! would work just as well for the DSP path, but a named struct makes the
//! field layout self-documenting and gives the SYSEX codec a single
//! source of truth to pack/unpack against.

use serde::{Deserialize, Serialize};

/// Number of operators in a voice.
pub const NUM_OPERATORS: usize = 6;

/// Unpacked voice size in bytes (the §3 "canonical unpacked form").
pub const UNPACKED_VOICE_SIZE: usize = 155;

/// One operator's 21 bytes of the unpacked voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorPatch {
    /// EG rates R1..R4, 0-99.
    pub eg_rate: [u8; 4],
    /// EG levels L1..L4, 0-99.
    pub eg_level: [u8; 4],
    /// Keyboard level-scaling breakpoint (MIDI note, 0-99 internal units).
    pub break_point: u8,
    /// Left-of-breakpoint scaling depth, 0-99.
    pub left_depth: u8,
    /// Right-of-breakpoint scaling depth, 0-99.
    pub right_depth: u8,
    /// Left curve: 0=-lin, 1=-exp, 2=+exp, 3=+lin.
    pub left_curve: u8,
    /// Right curve, same encoding as `left_curve`.
    pub right_curve: u8,
    /// Rate scaling, 0-7.
    pub rate_scale: u8,
    /// Amplitude-modulation sensitivity, 0-3.
    pub amp_mod_sens: u8,
    /// Key-velocity sensitivity, 0-7.
    pub key_vel_sens: u8,
    /// Output level, 0-99.
    pub output_level: u8,
    /// Oscillator mode: 0=ratio, 1=fixed Hz.
    pub osc_mode: u8,
    /// Coarse frequency, 0-31.
    pub freq_coarse: u8,
    /// Fine frequency, 0-99.
    pub freq_fine: u8,
    /// Detune, 0-14 (center 7).
    pub detune: u8,
}

impl Default for OperatorPatch {
    fn default() -> Self {
        Self {
            eg_rate: [99, 99, 99, 99],
            eg_level: [99, 99, 99, 0],
            break_point: 0,
            left_depth: 0,
            right_depth: 0,
            left_curve: 0,
            right_curve: 0,
            rate_scale: 0,
            amp_mod_sens: 0,
            key_vel_sens: 0,
            output_level: 99,
            osc_mode: 0,
            freq_coarse: 1,
            freq_fine: 0,
            detune: 7,
        }
    }
}

/// Global (non-operator) patch bytes, §3 "Global (bytes 126..154)".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalPatch {
    /// Pitch EG rates R1..R4.
    pub pitch_eg_rate: [u8; 4],
    /// Pitch EG levels L1..L4.
    pub pitch_eg_level: [u8; 4],
    /// Algorithm, 0-31.
    pub algorithm: u8,
    /// Feedback, 0-7.
    pub feedback: u8,
    /// Oscillator key-sync, 0/1.
    pub osc_key_sync: u8,
    /// LFO speed, 0-99.
    pub lfo_speed: u8,
    /// LFO delay, 0-99.
    pub lfo_delay: u8,
    /// LFO pitch-mod depth, 0-99.
    pub lfo_pitch_mod_depth: u8,
    /// LFO amp-mod depth, 0-99.
    pub lfo_amp_mod_depth: u8,
    /// LFO key sync, 0/1.
    pub lfo_sync: u8,
    /// LFO waveform, 0-5.
    pub lfo_waveform: u8,
    /// LFO pitch-mod sensitivity, 0-7.
    pub lfo_pitch_mod_sens: u8,
    /// Transpose, 0-48 (24 = no shift).
    pub transpose: u8,
    /// 10-character ASCII voice name.
    pub name: [u8; 10],
}

impl Default for GlobalPatch {
    fn default() -> Self {
        Self {
            pitch_eg_rate: [99, 99, 99, 99],
            pitch_eg_level: [50, 50, 50, 50],
            algorithm: 0,
            feedback: 0,
            osc_key_sync: 1,
            lfo_speed: 35,
            lfo_delay: 0,
            lfo_pitch_mod_depth: 0,
            lfo_amp_mod_depth: 0,
            lfo_sync: 1,
            lfo_waveform: 0,
            lfo_pitch_mod_sens: 3,
            transpose: 24,
            name: *b"INIT VOICE",
        }
    }
}

/// The canonical unpacked voice patch: 6 operators plus globals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// Per-operator parameter blocks, in processing order (op 0..5).
    pub operators: [OperatorPatch; NUM_OPERATORS],
    /// Voice-wide parameters.
    pub global: GlobalPatch,
}

impl Default for Patch {
    fn default() -> Self {
        Self {
            operators: [OperatorPatch::default(); NUM_OPERATORS],
            global: GlobalPatch::default(),
        }
    }
}

impl Patch {
    /// The classic "INIT VOICE": single carrier on operator 0 (algorithm 0
    /// routes every operator in series into a single carrier chain; with
    /// operators 1-5 left at their default full-sustain envelope this is
    /// effectively a plain sine, matching the DX7's factory init voice).
    pub fn init_voice() -> Self {
        Self::default()
    }

    /// Voice name as a trimmed `String`.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.global.name)
            .trim_end()
            .to_string()
    }
}
