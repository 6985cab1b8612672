
//! MIDI controllers for DX7 synthesis
//!
//! This module manages MIDI controller values including pitch bend,
//! modulation wheel, breath controller, and aftertouch.

use serde::{Deserialize, Serialize};

/// Bitmap target for a modulation-wheel-style assignment: which synthesis
/// parameters a physical controller (mod wheel, foot, breath, aftertouch)
/// is routed to. Bit 0 = pitch, bit 1 = amplitude, bit 2 = EG bias.
pub mod assign_target {
    pub const PITCH: u8 = 1 << 0;
    pub const AMP: u8 = 1 << 1;
    pub const EG_BIAS: u8 = 1 << 2;
}

/// Range and routing for one physical modulation source (mod wheel, foot
/// controller, breath controller, or aftertouch).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ControllerAssign {
    /// Depth, 0-99, scaling how far the controller pushes its targets
    pub range: u8,
    /// Bitmap of [`assign_target`] flags this controller modulates
    pub target: u8,
    /// Polarity/curve mode, 0-2 (0 = unipolar, 1 = bipolar, 2 = bipolar
    /// inverted). Only affects the sign of the scaled contribution.
    pub mode: u8,
}

impl Default for ControllerAssign {
    fn default() -> Self {
        Self { range: 0, target: 0, mode: 0 }
    }
}

impl ControllerAssign {
    fn scaled(&self, raw: u8, bit: u8) -> f32 {
        if self.target & bit == 0 {
            0.0
        } else {
            let depth = (raw as f32 / 127.0) * (self.range as f32 / 99.0);
            match self.mode {
                1 => depth * 2.0 - (self.range as f32 / 99.0), // bipolar, centered at raw=64
                2 => -depth,
                _ => depth,
            }
        }
    }
}

/// Combined modulation produced by [`Controllers::refresh`]: the sum of
/// every physical controller's contribution to each synthesis target,
/// each in `[0.0, 1.0]` (clamped after summing).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ModulationState {
    /// Combined pitch modulation depth
    pub pitch_mod: f32,
    /// Combined amplitude modulation depth
    pub amp_mod: f32,
    /// Combined envelope-bias modulation depth
    pub eg_mod: f32,
}

/// MIDI controller values
///
/// Stores the current values of various MIDI controllers that affect
/// synthesis parameters. All values are stored in their native MIDI
/// ranges but can be scaled for synthesis use.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Controllers {
    /// Pitch bend value (0x0000 - 0x3FFF, center = 0x2000)
    pub pitch_bend: u16,

    /// Modulation wheel (0-127)
    pub mod_wheel: u8,

    /// Breath controller (0-127)
    pub breath: u8,

    /// Channel aftertouch (0-127)
    pub aftertouch: u8,

    /// Foot controller (0-127)
    pub foot: u8,

    /// Expression controller (0-127)
    pub expression: u8,

    /// Volume (0-127)
    pub volume: u8,

    /// Mod wheel range/target assignment
    pub mod_wheel_assign: ControllerAssign,
    /// Foot controller range/target assignment
    pub foot_assign: ControllerAssign,
    /// Breath controller range/target assignment
    pub breath_assign: ControllerAssign,
    /// Aftertouch range/target assignment
    pub aftertouch_assign: ControllerAssign,

    /// Pitch bend range, in semitones (0-12).
    pub pitch_bend_range: u8,
    /// Pitch bend step, in semitones (0 = continuous, 1-12 quantizes the
    /// bent pitch to that many semitones).
    pub pitch_bend_step: u8,

    /// Master fine tune, in cents (-99..=99 stored as an offset from 100).
    pub master_tune_cents: i8,

    /// Portamento enabled.
    pub portamento_enabled: bool,
    /// Portamento time, 0-127 (CC5 raw value, distinct from the voice
    /// patch's own glissando rate so it can be changed live).
    pub portamento_time: u8,
    /// Glissando mode: true snaps to the nearest semitone during the
    /// glide rather than sweeping continuously.
    pub glissando: bool,

    /// Per-operator enable bitmap, bit N = operator N audible. All 1s by
    /// default (all six operators enabled).
    pub operator_enable: u8,
}

impl Controllers {
    /// Create new controllers with default values
    pub fn new() -> Self {
        Self {
            pitch_bend: 0x2000, // Center position
            mod_wheel: 0,
            breath: 0,
            aftertouch: 0,
            foot: 0,
            expression: 127,
            volume: 100,
            mod_wheel_assign: ControllerAssign { range: 99, target: assign_target::PITCH, mode: 0 },
            foot_assign: ControllerAssign::default(),
            breath_assign: ControllerAssign::default(),
            aftertouch_assign: ControllerAssign::default(),
            pitch_bend_range: 2,
            pitch_bend_step: 0,
            master_tune_cents: 0,
            portamento_enabled: false,
            portamento_time: 0,
            glissando: false,
            operator_enable: 0x3f,
        }
    }

    /// Set the pitch bend range (semitones, 0-12) and quantization step
    /// (0 = continuous glide, 1-12 = snap to that many semitones).
    pub fn set_pitch_bend_range(&mut self, range: u8, step: u8) {
        self.pitch_bend_range = range.min(12);
        self.pitch_bend_step = step.min(12);
    }

    /// Set the master fine tune, in cents (-99..=99).
    pub fn set_master_tune_cents(&mut self, cents: i8) {
        self.master_tune_cents = cents.clamp(-99, 99);
    }

    /// Set the live portamento enable flag, CC time, and glissando mode.
    pub fn set_portamento(&mut self, enabled: bool, time: u8, glissando: bool) {
        self.portamento_enabled = enabled;
        self.portamento_time = time & 0x7f;
        self.glissando = glissando;
    }

    /// Enable or disable an individual operator (0-5) in the audible mix.
    pub fn set_operator_enable(&mut self, operator: usize, enabled: bool) {
        if operator >= 6 {
            return;
        }
        if enabled {
            self.operator_enable |= 1 << operator;
        } else {
            self.operator_enable &= !(1 << operator);
        }
    }

    /// Whether operator `index` (0-5) is currently enabled.
    pub fn is_operator_enabled(&self, index: usize) -> bool {
        index < 6 && (self.operator_enable & (1 << index)) != 0
    }

    /// Assign a physical controller's range and target bitmap.
    pub fn set_mod_wheel_assign(&mut self, range: u8, target: u8) {
        self.mod_wheel_assign.range = range.min(99);
        self.mod_wheel_assign.target = target;
    }

    /// Assign the foot controller's range and target bitmap.
    pub fn set_foot_assign(&mut self, range: u8, target: u8) {
        self.foot_assign.range = range.min(99);
        self.foot_assign.target = target;
    }

    /// Assign the breath controller's range and target bitmap.
    pub fn set_breath_assign(&mut self, range: u8, target: u8) {
        self.breath_assign.range = range.min(99);
        self.breath_assign.target = target;
    }

    /// Assign the aftertouch controller's range and target bitmap.
    pub fn set_aftertouch_assign(&mut self, range: u8, target: u8) {
        self.aftertouch_assign.range = range.min(99);
        self.aftertouch_assign.target = target;
    }

    /// Set a physical controller's polarity/curve mode (0-2).
    pub fn set_mod_wheel_mode(&mut self, mode: u8) {
        self.mod_wheel_assign.mode = mode.min(2);
    }

    /// Set the foot controller's polarity/curve mode (0-2).
    pub fn set_foot_mode(&mut self, mode: u8) {
        self.foot_assign.mode = mode.min(2);
    }

    /// Set the breath controller's polarity/curve mode (0-2).
    pub fn set_breath_mode(&mut self, mode: u8) {
        self.breath_assign.mode = mode.min(2);
    }

    /// Set the aftertouch controller's polarity/curve mode (0-2).
    pub fn set_aftertouch_mode(&mut self, mode: u8) {
        self.aftertouch_assign.mode = mode.min(2);
    }

    /// Recompute combined modulation depths from every assigned physical
    /// controller's current value, summing and clamping each target.
    pub fn refresh(&self) -> ModulationState {
        let sources = [
            (self.mod_wheel, self.mod_wheel_assign),
            (self.foot, self.foot_assign),
            (self.breath, self.breath_assign),
            (self.aftertouch, self.aftertouch_assign),
        ];

        let mut state = ModulationState::default();
        for (raw, assign) in sources {
            state.pitch_mod += assign.scaled(raw, assign_target::PITCH);
            state.amp_mod += assign.scaled(raw, assign_target::AMP);
            state.eg_mod += assign.scaled(raw, assign_target::EG_BIAS);
        }
        state.pitch_mod = state.pitch_mod.clamp(0.0, 1.0);
        state.amp_mod = state.amp_mod.clamp(0.0, 1.0);
        state.eg_mod = state.eg_mod.clamp(0.0, 1.0);
        state
    }

    /// Reset all controllers to their default values
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Set pitch bend value
    ///
    /// # Arguments
    /// * `value` - 14-bit pitch bend value (0x0000-0x3FFF)
    pub fn set_pitch_bend(&mut self, value: u16) {
        self.pitch_bend = value & 0x3FFF;
    }

    /// Get pitch bend as signed value (-8192 to +8191)
    pub fn get_pitch_bend_signed(&self) -> i16 {
        (self.pitch_bend as i16) - 0x2000
    }

    /// Set modulation wheel
    pub fn set_mod_wheel(&mut self, value: u8) {
        self.mod_wheel = value & 0x7F;
    }

    /// Set breath controller
    pub fn set_breath(&mut self, value: u8) {
        self.breath = value & 0x7F;
    }

    /// Set aftertouch
    pub fn set_aftertouch(&mut self, value: u8) {
        self.aftertouch = value & 0x7F;
    }

    /// Set foot controller
    pub fn set_foot(&mut self, value: u8) {
        self.foot = value & 0x7F;
    }

    /// Set expression
    pub fn set_expression(&mut self, value: u8) {
        self.expression = value & 0x7F;
    }

    /// Set volume
    pub fn set_volume(&mut self, value: u8) {
        self.volume = value & 0x7F;
    }

    /// Get modulation amount (0.0 - 1.0)
    pub fn get_mod_amount(&self) -> f32 {
        self.mod_wheel as f32 / 127.0
    }

    /// Get breath amount (0.0 - 1.0)
    pub fn get_breath_amount(&self) -> f32 {
        self.breath as f32 / 127.0
    }

    /// Get aftertouch amount (0.0 - 1.0)
    pub fn get_aftertouch_amount(&self) -> f32 {
        self.aftertouch as f32 / 127.0
    }

    /// Get foot controller amount (0.0 - 1.0)
    pub fn get_foot_amount(&self) -> f32 {
        self.foot as f32 / 127.0
    }

    /// Get expression amount (0.0 - 1.0)
    pub fn get_expression_amount(&self) -> f32 {
        self.expression as f32 / 127.0
    }

    /// Get volume amount (0.0 - 1.0)
    pub fn get_volume_amount(&self) -> f32 {
        self.volume as f32 / 127.0
    }

    /// Get pitch bend in semitones
    ///
    /// # Arguments
    /// * `range` - Pitch bend range in semitones (typically 2.0)
    pub fn get_pitch_bend_semitones(&self, range: f32) -> f32 {
        let signed = self.get_pitch_bend_signed() as f32;
        (signed / 8192.0) * range
    }

    /// Pitch bend in semitones, using the stored range and quantization
    /// step (§4.7): a step of 0 glides continuously, a step of N snaps
    /// the result to the nearest multiple of N semitones.
    pub fn get_pitch_bend_quantized(&self) -> f32 {
        let raw = self.get_pitch_bend_semitones(self.pitch_bend_range as f32);
        if self.pitch_bend_step == 0 {
            raw
        } else {
            let step = self.pitch_bend_step as f32;
            (raw / step).round() * step
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controllers_creation() {
        let controllers = Controllers::new();
        assert_eq!(controllers.pitch_bend, 0x2000);
        assert_eq!(controllers.mod_wheel, 0);
        assert_eq!(controllers.volume, 100);
        assert_eq!(controllers.expression, 127);
    }

    #[test]
    fn test_pitch_bend() {
        let mut controllers = Controllers::new();

        // Test setting pitch bend
        controllers.set_pitch_bend(0x3000);
        assert_eq!(controllers.pitch_bend, 0x3000);

        // Test signed conversion
        assert_eq!(controllers.get_pitch_bend_signed(), 0x1000);

        // Test center position
        controllers.set_pitch_bend(0x2000);
        assert_eq!(controllers.get_pitch_bend_signed(), 0);

        // Test negative
        controllers.set_pitch_bend(0x1000);
        assert_eq!(controllers.get_pitch_bend_signed(), -0x1000);
    }

    #[test]
    fn test_controller_amounts() {
        let mut controllers = Controllers::new();

        controllers.set_mod_wheel(64);
        assert!((controllers.get_mod_amount() - 0.504).abs() < 0.01);

        controllers.set_breath(127);
        assert_eq!(controllers.get_breath_amount(), 1.0);

        controllers.set_aftertouch(0);
        assert_eq!(controllers.get_aftertouch_amount(), 0.0);
    }

    #[test]
    fn test_pitch_bend_semitones() {
        let mut controllers = Controllers::new();

        // Test maximum up bend (+2 semitones)
        controllers.set_pitch_bend(0x3FFF);
        let semitones = controllers.get_pitch_bend_semitones(2.0);
        assert!((semitones - 2.0).abs() < 0.01);

        // Test maximum down bend (-2 semitones)
        controllers.set_pitch_bend(0x0000);
        let semitones = controllers.get_pitch_bend_semitones(2.0);
        assert!((semitones + 2.0).abs() < 0.01);

        // Test center (0 semitones)
        controllers.set_pitch_bend(0x2000);
        let semitones = controllers.get_pitch_bend_semitones(2.0);
        assert!(semitones.abs() < 0.01);
    }

    #[test]
    fn test_reset() {
        let mut controllers = Controllers::new();

        // Modify some values
        controllers.set_mod_wheel(100);
        controllers.set_pitch_bend(0x3000);
        controllers.set_volume(50);

        // Reset
        controllers.reset();

        // Should be back to defaults
        assert_eq!(controllers.pitch_bend, 0x2000);
        assert_eq!(controllers.mod_wheel, 0);
        assert_eq!(controllers.volume, 100);
    }

    #[test]
    fn test_value_masking() {
        let mut controllers = Controllers::new();

        // Test that values are properly masked
        controllers.set_mod_wheel(0xFF); // Should mask to 0x7F
        assert_eq!(controllers.mod_wheel, 0x7F);

        controllers.set_pitch_bend(0xFFFF); // Should mask to 0x3FFF
        assert_eq!(controllers.pitch_bend, 0x3FFF);
    }

    #[test]
    fn test_refresh_default_mod_wheel_targets_pitch() {
        let mut controllers = Controllers::new();
        controllers.set_mod_wheel(127);
        let state = controllers.refresh();
        assert!(state.pitch_mod > 0.9);
        assert_eq!(state.amp_mod, 0.0);
    }

    #[test]
    fn test_refresh_breath_unassigned_by_default() {
        let mut controllers = Controllers::new();
        controllers.set_breath(127);
        let state = controllers.refresh();
        assert_eq!(state.pitch_mod, 0.0);
        assert_eq!(state.amp_mod, 0.0);
        assert_eq!(state.eg_mod, 0.0);
    }

    #[test]
    fn test_refresh_combines_multiple_sources_on_same_target() {
        let mut controllers = Controllers::new();
        controllers.set_mod_wheel(127);
        controllers.set_breath_assign(99, assign_target::PITCH);
        controllers.set_breath(127);
        let state = controllers.refresh();
        assert!(state.pitch_mod >= 1.0); // clamped, both sources contribute
    }

    #[test]
    fn test_assign_range_scales_contribution() {
        let mut controllers = Controllers::new();
        controllers.set_mod_wheel_assign(50, assign_target::AMP);
        controllers.set_mod_wheel(127);
        let half_range = controllers.refresh().amp_mod;

        controllers.set_mod_wheel_assign(99, assign_target::AMP);
        let full_range = controllers.refresh().amp_mod;

        assert!(half_range < full_range);
    }

    #[test]
    fn test_pitch_bend_quantized_snaps_to_step() {
        let mut controllers = Controllers::new();
        controllers.set_pitch_bend_range(12, 1);
        controllers.set_pitch_bend(0x3FFF);
        let q = controllers.get_pitch_bend_quantized();
        assert!((q - q.round()).abs() < 1e-4);
    }

    #[test]
    fn test_pitch_bend_quantized_continuous_by_default() {
        let mut controllers = Controllers::new();
        controllers.set_pitch_bend_range(2, 0);
        controllers.set_pitch_bend(0x2800);
        let continuous = controllers.get_pitch_bend_quantized();
        assert!(continuous > 0.0 && continuous < 2.0);
    }

    #[test]
    fn test_operator_enable_defaults_all_on() {
        let controllers = Controllers::new();
        for i in 0..6 {
            assert!(controllers.is_operator_enabled(i));
        }
    }

    #[test]
    fn test_operator_enable_toggle() {
        let mut controllers = Controllers::new();
        controllers.set_operator_enable(2, false);
        assert!(!controllers.is_operator_enabled(2));
        assert!(controllers.is_operator_enabled(0));
        controllers.set_operator_enable(2, true);
        assert!(controllers.is_operator_enabled(2));
    }

    #[test]
    fn test_portamento_settings() {
        let mut controllers = Controllers::new();
        controllers.set_portamento(true, 64, true);
        assert!(controllers.portamento_enabled);
        assert_eq!(controllers.portamento_time, 64);
        assert!(controllers.glissando);
    }
}