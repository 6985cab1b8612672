
//! DX7 Note - represents a single playing note in the synthesizer
//!
//! This is the main synthesis unit that combines all the FM operators,
//! envelopes, and modulation to produce the final audio output.

use super::{
    constants::{LG_N, N},
    controllers::ModulationState,
    env::Env,
    exp2::Exp2,
    fm_op_kernel::FmOpKernel,
    freqlut::FreqLut,
    patch::Patch,
    pitchenv::PitchEnv,
    porta::Porta,
};
use log::trace;

/// Velocity lookup table (from C++ dx7note.cc)
const VELOCITY_DATA: [u8; 64] = [
    0, 70, 86, 97, 106, 114, 121, 126, 132, 138, 142, 148, 152, 156, 160, 163,
    166, 170, 173, 174, 178, 181, 184, 186, 189, 190, 194, 196, 198, 200, 202,
    205, 206, 209, 211, 214, 216, 218, 220, 222, 224, 225, 227, 229, 230, 232,
    233, 235, 237, 238, 240, 241, 242, 243, 244, 246, 246, 248, 249, 250, 251,
    252, 253, 254
];

/// Exponential scale data for curve scaling (from C++ dx7note.cc)
const EXP_SCALE_DATA: [u8; 33] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 11, 14, 16, 19, 23, 27, 33, 39, 47, 56, 66,
    80, 94, 110, 126, 142, 158, 174, 190, 206, 222, 238, 250
];

/// Scale velocity according to DX7 velocity sensitivity (exact C++ port)
fn scale_velocity(velocity: i32, sensitivity: i32) -> i32 {
    let clamped_vel = velocity.clamp(0, 127);
    let vel_value = VELOCITY_DATA[(clamped_vel >> 1) as usize] as i32 - 239;
    ((sensitivity * vel_value + 7) >> 3) << 4
}

/// Scale rate according to keyboard rate scaling (exact C++ port)
fn scale_rate(midinote: i32, sensitivity: i32) -> i32 {
    let x = (midinote / 3 - 7).clamp(0, 31);
    (sensitivity * x) >> 3
}

/// Scale curve according to exponential or linear scaling (exact C++ port)
fn scale_curve(group: i32, depth: i32, curve: i32) -> i32 {
    let scale = if curve == 0 || curve == 3 {
        (group * depth * 329) >> 12
    } else {
        let raw_exp = EXP_SCALE_DATA[group.clamp(0, 32) as usize] as i32;
        (raw_exp * depth * 329) >> 15
    };

    if curve < 2 {
        -scale
    } else {
        scale
    }
}

/// Scale level according to keyboard level scaling (exact C++ port)
fn scale_level(midinote: i32, break_pt: i32, left_depth: i32, right_depth: i32,
               left_curve: i32, right_curve: i32) -> i32 {
    let offset = midinote - break_pt - 17;
    if offset >= 0 {
        scale_curve((offset + 1) / 3, right_depth, right_curve)
    } else {
        scale_curve(-(offset - 1) / 3, left_depth, left_curve)
    }
}

/// Scale output level according to DX7 lookup table (exact C++ port)
fn scale_out_level(outlevel: i32) -> i32 {
    const LEVELLUT: [i32; 20] = [
        0, 5, 9, 13, 17, 20, 23, 25, 27, 29, 31, 33, 35, 37, 39, 41, 42, 43, 45, 46
    ];

    if outlevel >= 20 {
        28 + outlevel
    } else {
        LEVELLUT[outlevel as usize]
    }
}

/// Coarse frequency multiplier table (from C++ dx7note.cc)
const COARSE_MUL: [i32; 32] = [
    -16777216, 0, 16777216, 26591258, 33554432, 38955489, 43368474, 47099600,
    50331648, 53182516, 55732705, 58039632, 60145690, 62083076, 63876816,
    65546747, 67108864, 68576247, 69959732, 71268397, 72509921, 73690858,
    74816848, 75892776, 76922906, 77910978, 78860292, 79773775, 80654032,
    81503396, 82323963, 83117622
];

/// Calculate oscillator frequency using DX7 logarithmic system (exact C++ port)
pub(crate) fn osc_freq(midinote: i32, mode: i32, coarse: i32, fine: i32, detune: i32) -> i32 {
    let mut logfreq = if mode == 0 {
        // Ratio mode: anchored at MIDI note 0, matching Dexed's
        // StandardTuning::midinote_to_logfreq.
        let base = 50857777; // (1 << 24) * (log(440) / log(2) - 69/12)
        let step = (1 << 24) / 12; // 1398101
        base + step * midinote
    } else {
        // Fixed frequency mode: ((1 << 24) * log(10) / log(2) * .01) << 3
        (4458616 * ((coarse & 3) * 100 + fine)) >> 3
    };

    if mode == 0 {
        logfreq += COARSE_MUL[(coarse & 31) as usize];

        if fine != 0 {
            // (1 << 24) / log(2) ~= 24204406
            let fine_adjust = (24204406.0 * (1.0 + 0.01 * fine as f64).ln()) as i32;
            logfreq += fine_adjust;
        }

        if detune != 7 {
            logfreq += 13457 * (detune - 7);
        }
    } else if detune > 7 {
        logfreq += 13457 * (detune - 7);
    }

    logfreq
}

/// FM operator routing flags (from C++ fm_core.h)
#[allow(dead_code)]
pub mod operator_flags {
    pub const OUT_BUS_ONE: u8 = 1 << 0;
    pub const OUT_BUS_TWO: u8 = 1 << 1;
    pub const OUT_BUS_ADD: u8 = 1 << 2;
    pub const IN_BUS_ONE: u8 = 1 << 4;
    pub const IN_BUS_TWO: u8 = 1 << 5;
    pub const FB_IN: u8 = 1 << 6;
    pub const FB_OUT: u8 = 1 << 7;
}

/// DX7 FM Algorithm definition (32 algorithms, 6 operators each)
#[derive(Clone, Debug)]
pub struct FmAlgorithm {
    pub ops: [u8; 6],
}

/// DX7 algorithm definitions (from C++ fm_core.cc)
pub const ALGORITHMS: [FmAlgorithm; 32] = [
    FmAlgorithm { ops: [0xc1, 0x11, 0x11, 0x14, 0x01, 0x14] }, // 1
    FmAlgorithm { ops: [0x01, 0x11, 0x11, 0x14, 0xc1, 0x14] }, // 2
    FmAlgorithm { ops: [0xc1, 0x11, 0x14, 0x01, 0x11, 0x14] }, // 3
    FmAlgorithm { ops: [0xc1, 0x11, 0x94, 0x01, 0x11, 0x14] }, // 4
    FmAlgorithm { ops: [0xc1, 0x14, 0x01, 0x14, 0x01, 0x14] }, // 5
    FmAlgorithm { ops: [0xc1, 0x94, 0x01, 0x14, 0x01, 0x14] }, // 6
    FmAlgorithm { ops: [0xc1, 0x11, 0x05, 0x14, 0x01, 0x14] }, // 7
    FmAlgorithm { ops: [0x01, 0x11, 0xc5, 0x14, 0x01, 0x14] }, // 8
    FmAlgorithm { ops: [0x01, 0x11, 0x05, 0x14, 0xc1, 0x14] }, // 9
    FmAlgorithm { ops: [0x01, 0x05, 0x14, 0xc1, 0x11, 0x14] }, // 10
    FmAlgorithm { ops: [0xc1, 0x05, 0x14, 0x01, 0x11, 0x14] }, // 11
    FmAlgorithm { ops: [0x01, 0x05, 0x05, 0x14, 0xc1, 0x14] }, // 12
    FmAlgorithm { ops: [0xc1, 0x05, 0x05, 0x14, 0x01, 0x14] }, // 13
    FmAlgorithm { ops: [0xc1, 0x05, 0x11, 0x14, 0x01, 0x14] }, // 14
    FmAlgorithm { ops: [0x01, 0x05, 0x11, 0x14, 0xc1, 0x14] }, // 15
    FmAlgorithm { ops: [0xc1, 0x11, 0x02, 0x25, 0x05, 0x14] }, // 16
    FmAlgorithm { ops: [0x01, 0x11, 0x02, 0x25, 0xc5, 0x14] }, // 17
    FmAlgorithm { ops: [0x01, 0x11, 0x11, 0xc5, 0x05, 0x14] }, // 18
    FmAlgorithm { ops: [0xc1, 0x14, 0x14, 0x01, 0x11, 0x14] }, // 19
    FmAlgorithm { ops: [0x01, 0x05, 0x14, 0xc1, 0x14, 0x14] }, // 20
    FmAlgorithm { ops: [0x01, 0x14, 0x14, 0xc1, 0x14, 0x14] }, // 21
    FmAlgorithm { ops: [0xc1, 0x14, 0x14, 0x14, 0x01, 0x14] }, // 22
    FmAlgorithm { ops: [0xc1, 0x14, 0x14, 0x01, 0x14, 0x04] }, // 23
    FmAlgorithm { ops: [0xc1, 0x14, 0x14, 0x14, 0x04, 0x04] }, // 24
    FmAlgorithm { ops: [0xc1, 0x14, 0x14, 0x04, 0x04, 0x04] }, // 25
    FmAlgorithm { ops: [0xc1, 0x05, 0x14, 0x01, 0x14, 0x04] }, // 26
    FmAlgorithm { ops: [0x01, 0x05, 0x14, 0xc1, 0x14, 0x04] }, // 27
    FmAlgorithm { ops: [0x04, 0xc1, 0x05, 0x14, 0x01, 0x14] }, // 28
    FmAlgorithm { ops: [0xc1, 0x05, 0x14, 0x04, 0x01, 0x14] }, // 29
    FmAlgorithm { ops: [0x04, 0xc1, 0x05, 0x14, 0x04, 0x04] }, // 30
    FmAlgorithm { ops: [0xc1, 0x04, 0x04, 0x04, 0x04, 0x04] }, // 31
    FmAlgorithm { ops: [0xc1, 0x04, 0x04, 0x04, 0x04, 0x04] }, // 32
];

/// State of a single DX7 note
#[derive(Clone, Debug)]
pub struct Dx7Note {
    /// The 6 FM operators (DX7 has 6 operators)
    pub operators: [FmOperator; 6],

    /// MIDI note number
    pub note: u8,

    /// MIDI velocity
    pub velocity: u8,

    /// Current algorithm (determines operator routing)
    pub algorithm: u8,

    /// Note is currently playing (key is down or still releasing)
    pub active: bool,

    /// Feedback buffers for self-modulating operators
    pub fb_buf: [i32; 2],

    /// Feedback shift amount (controls feedback level)
    pub fb_shift: i32,

    /// Global pitch envelope, shared by every operator in ratio mode
    pub pitch_env: PitchEnv,

    /// Portamento glide toward this note's base pitch; driven by the
    /// allocator for mono-mode transfers, left idle (snapping instantly)
    /// otherwise.
    pub porta: Porta,

    /// Timestamp this note was struck, for oldest-voice stealing.
    pub key_pressed_timer: u64,

    /// Resolution flavor applied to the per-block gain quantization.
    pub engine_type: super::constants::EngineType,

    /// Intermediate buses for operator routing
    bus_buffers: [[i32; N]; 2], // bus 1 and bus 2
}

/// Individual FM operator within a DX7 note
#[derive(Clone, Debug)]
pub struct FmOperator {
    /// Amplitude envelope
    pub env: Env,

    /// Current phase
    pub phase: i32,

    /// Frequency (phase increment)
    pub freq: i32,

    /// Output level
    pub level: i32,

    /// Previous gain output (for interpolation, like C++ param.gain_out)
    pub gain_out: i32,

    /// Feedback buffer for self-modulation
    pub fb_buf: [i32; 2],

    /// Whether this operator is enabled in the current patch (distinct
    /// from the live per-operator mute bitmap in `Controllers`).
    pub enabled: bool,

    /// Oscillator mode: 0 = ratio (tracks keyboard/pitch env), 1 = fixed Hz
    pub mode: i32,

    /// Base logarithmic frequency (Q24, one octave = `1 << 24`) from
    /// `osc_freq`, before the per-block pitch envelope/bend offset
    pub logfreq_base: i32,
}

impl Default for FmOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl FmOperator {
    /// Create a new FM operator
    pub fn new() -> Self {
        Self {
            env: Env::new(),
            phase: 0,
            freq: 0,
            level: 0,
            gain_out: 0,
            fb_buf: [0; 2],
            enabled: true,
            mode: 0,
            logfreq_base: 0,
        }
    }

    /// Handle key events
    pub fn keydown(&mut self, down: bool) {
        self.env.keydown(down);
    }
}

impl Default for Dx7Note {
    fn default() -> Self {
        Self::new()
    }
}

impl Dx7Note {
    /// Create a new DX7 note
    pub fn new() -> Self {
        Self {
            operators: Default::default(),
            note: 60,
            velocity: 64,
            algorithm: 0,
            active: false,
            fb_buf: [0; 2],
            fb_shift: 16,
            pitch_env: PitchEnv::new(),
            porta: Porta::new(44_100.0),
            key_pressed_timer: 0,
            engine_type: super::constants::EngineType::default(),
            bus_buffers: [[0; N]; 2],
        }
    }

    /// Initialize note with MIDI parameters
    pub fn init(&mut self, note: u8, velocity: u8) {
        self.note = note;
        self.velocity = velocity;
        self.active = true;

        for op in &mut self.operators {
            op.keydown(true);
        }
        self.pitch_env.keydown(true);
    }

    /// Release the note (key up). Kept as a separate name from
    /// `release` so the allocator's call sites read as note-on/note-off
    /// symmetrically.
    pub fn keyup(&mut self) {
        self.release();
    }

    /// Release the note (key up)
    pub fn release(&mut self) {
        for op in &mut self.operators {
            op.keydown(false);
        }
        self.pitch_env.keydown(false);
    }

    /// Check if note is still sounding
    pub fn is_active(&self) -> bool {
        self.active && self.operators.iter().any(|op| op.env.get_position() < 4)
    }

    /// Re-trigger a still-active voice in place for "refresh" mono mode:
    /// runs a fresh `init` without resetting operator phase, matching the
    /// synth's legato-retrigger behavior.
    pub fn refresh(&mut self, note: u8, velocity: u8) {
        self.note = note;
        self.velocity = velocity;
        self.active = true;
        for op in &mut self.operators {
            op.keydown(true);
        }
        self.pitch_env.keydown(true);
    }

    /// Copy this note's running envelope/phase state into `other`, for a
    /// mono-mode voice transfer where the new note continues the old
    /// voice's amplitude trajectory rather than re-striking from zero.
    pub fn transfer_state(&self, other: &mut Dx7Note) {
        for (dst, src) in other.operators.iter_mut().zip(self.operators.iter()) {
            dst.env = src.env.clone();
            dst.phase = src.phase;
            dst.gain_out = src.gain_out;
        }
        other.pitch_env = self.pitch_env.clone();
        other.fb_buf = self.fb_buf;
    }

    /// Transfer this note's portamento glide position/target to `other`,
    /// so a mono-mode legato transition continues gliding rather than
    /// resetting to the new note.
    pub fn transfer_portamento(&self, other: &mut Dx7Note) {
        other.porta = self.porta.clone();
    }

    /// Process note for N samples and add to output buffer. Implements
    /// DX7 algorithm routing, LFO pitch/amp modulation, controller
    /// sidechain modulation, and per-operator mute.
    pub fn process(
        &mut self,
        output: &mut [i32],
        lfo_pitch_mod: i32,
        lfo_amp_mod: i32,
        modulation: &ModulationState,
        pitch_bend_semitones: f32,
        operator_enable: u8,
    ) {
        if !self.is_active() {
            return;
        }

        let algorithm_index = (self.algorithm as usize) % 32;
        let alg = &ALGORITHMS[algorithm_index];

        self.bus_buffers[0].fill(0);
        self.bus_buffers[1].fill(0);
        output.fill(0);

        let mut has_contents = [true, false, false]; // [output, bus1, bus2]

        // Combine the voice pitch EG, the LFO's pitch modulation (scaled by
        // the controller sidechain, e.g. mod wheel routed to pitch), and
        // pitch bend/portamento glide into one Q24 log-frequency offset
        // applied to every ratio-mode operator.
        let pitch_mod = self.pitch_env.get_sample()
            + ((lfo_pitch_mod as f32 * modulation.pitch_mod) as i32);
        let bend_offset = (pitch_bend_semitones * ((1 << 24) as f32 / 12.0)) as i32;
        let porta_offset = self.porta.get_pitch();

        for op in &mut self.operators {
            if op.mode == 0 {
                op.freq =
                    FreqLut::lookup_logfreq(op.logfreq_base + pitch_mod + bend_offset + porta_offset);
            }
        }

        // Amp modulation (LFO tremolo + controller sidechain) scales the
        // post-envelope gain uniformly; computed once per block as a Q24
        // multiplier applied via `Exp2`-domain shift isn't warranted here,
        // so we fold it into the envelope gain directly as a linear trim.
        let amp_trim = 1.0 - (lfo_amp_mod as f32 / (1 << 24) as f32) * modulation.amp_mod;
        let amp_trim = amp_trim.clamp(0.0, 1.0);

        for op_idx in 0..6 {
            let flags = alg.ops[op_idx];
            let mut add = (flags & operator_flags::OUT_BUS_ADD) != 0;
            let inbus = (flags >> 4) & 3;
            let outbus = flags & 3;

            let outptr = match outbus {
                0 => output.as_mut_ptr(),
                1 => self.bus_buffers[0].as_mut_ptr(),
                2 => self.bus_buffers[1].as_mut_ptr(),
                _ => continue,
            };

            let muted = !self.operators[op_idx].enabled || (operator_enable & (1 << op_idx)) == 0;

            let env_level = self.operators[op_idx].env.get_sample();
            let level_offset = 14 * (1 << 24);
            let mut exp2_input = env_level.saturating_sub(level_offset);
            let quant_bits = self.engine_type.gain_quantize_bits();
            if quant_bits > 0 {
                exp2_input &= !((1 << quant_bits) - 1);
            }
            let gain1 = self.operators[op_idx].gain_out;
            let gain2 = if muted {
                0
            } else {
                (Exp2::lookup(exp2_input) as f32 * amp_trim) as i32
            };
            self.operators[op_idx].gain_out = gain2;

            if gain1 >= 1120 || gain2 >= 1120 {
                if !has_contents[outbus as usize] {
                    add = false;
                }

                let output_slice = unsafe { std::slice::from_raw_parts_mut(outptr, N) };

                if inbus == 0 || !has_contents[inbus as usize] {
                    if (flags & 0xc0) == 0xc0 && self.fb_shift < 16 {
                        FmOpKernel::compute_fb(
                            output_slice,
                            self.operators[op_idx].phase,
                            self.operators[op_idx].freq,
                            gain1,
                            gain2,
                            &mut self.fb_buf,
                            self.fb_shift,
                            add,
                        );
                    } else {
                        FmOpKernel::compute_pure(
                            output_slice,
                            self.operators[op_idx].phase,
                            self.operators[op_idx].freq,
                            gain1,
                            gain2,
                            add,
                        );
                    }
                } else {
                    let input_slice = match inbus {
                        1 => &self.bus_buffers[0],
                        2 => &self.bus_buffers[1],
                        _ => {
                            self.operators[op_idx].phase = self.operators[op_idx]
                                .phase
                                .wrapping_add(self.operators[op_idx].freq << LG_N);
                            continue;
                        }
                    };

                    FmOpKernel::compute(
                        output_slice,
                        input_slice,
                        self.operators[op_idx].phase,
                        self.operators[op_idx].freq,
                        gain1,
                        gain2,
                        add,
                    );
                }

                has_contents[outbus as usize] = true;
            } else if !add {
                has_contents[outbus as usize] = false;
            }

            self.operators[op_idx].phase = self.operators[op_idx]
                .phase
                .wrapping_add(self.operators[op_idx].freq << LG_N);
        }
    }

    /// Set algorithm (1-based input, stored 0-based internally; clamped
    /// to the 32 valid algorithms).
    pub fn set_algorithm(&mut self, algorithm: u8) {
        self.algorithm = algorithm.min(31);
    }

    /// Apply a decoded [`Patch`] to this note at the given sample rate,
    /// computing every operator's envelope, base frequency, and the
    /// shared pitch envelope.
    pub fn apply_patch(&mut self, patch: &Patch, sample_rate: f64) {
        self.algorithm = patch.global.algorithm.min(31);

        let feedback = patch.global.feedback;
        self.fb_shift = if feedback != 0 {
            8 - (feedback & 7) as i32
        } else {
            16
        };

        FreqLut::init(sample_rate);

        for (i, op) in self.operators.iter_mut().enumerate() {
            op.enabled = true;
            let p = &patch.operators[i];

            let rates = [
                p.eg_rate[0] as i32,
                p.eg_rate[1] as i32,
                p.eg_rate[2] as i32,
                p.eg_rate[3] as i32,
            ];
            let levels = [
                p.eg_level[0] as i32,
                p.eg_level[1] as i32,
                p.eg_level[2] as i32,
                p.eg_level[3] as i32,
            ];

            let mut outlevel = scale_out_level(p.output_level as i32);
            let level_scaling = scale_level(
                self.note as i32,
                p.break_point as i32,
                p.left_depth as i32,
                p.right_depth as i32,
                p.left_curve as i32,
                p.right_curve as i32,
            );
            outlevel += level_scaling;
            outlevel = outlevel.min(127);
            outlevel <<= 5;
            outlevel += scale_velocity(self.velocity as i32, p.key_vel_sens as i32);
            outlevel = outlevel.max(0);

            let rate_scaling = scale_rate(self.note as i32, p.rate_scale as i32);
            let scaled_outlevel = outlevel.clamp(0, 20000);

            op.env.init(&rates, &levels, scaled_outlevel, rate_scaling);

            op.mode = p.osc_mode as i32;
            op.logfreq_base = osc_freq(
                self.note as i32,
                p.osc_mode as i32,
                p.freq_coarse as i32,
                p.freq_fine as i32,
                p.detune as i32,
            );
            op.freq = FreqLut::lookup_logfreq(op.logfreq_base);
            op.level = (p.output_level as i32) << 7;
        }

        let pitch_rates = [
            patch.global.pitch_eg_rate[0] as i32,
            patch.global.pitch_eg_rate[1] as i32,
            patch.global.pitch_eg_rate[2] as i32,
            patch.global.pitch_eg_rate[3] as i32,
        ];
        let pitch_levels = [
            patch.global.pitch_eg_level[0] as i32,
            patch.global.pitch_eg_level[1] as i32,
            patch.global.pitch_eg_level[2] as i32,
            patch.global.pitch_eg_level[3] as i32,
        ];
        self.pitch_env.init(&pitch_rates, &pitch_levels, sample_rate);

        trace!(
            "applied patch '{}' note={} velocity={} algorithm={}",
            patch.name(),
            self.note,
            self.velocity,
            self.algorithm
        );
    }
}
