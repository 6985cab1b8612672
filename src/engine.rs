//! Engine facade: the public, thread-safe entry point wrapping the voice
//! [`Allocator`]. MIDI-ish events (note on/off, control change, pitch
//! bend, SYSEX) are pushed from any thread through a lock-free SPSC ring;
//! `render` drains them and renders audio on the realtime thread without
//! ever allocating, locking, or blocking.

use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};

use crate::error::EngineError;
use crate::fm::constants::N;
use crate::fm::patch::Patch;
use crate::fm::sysex::{self, SysexVoiceData};
use crate::fm::Allocator;

/// Default size of the event intake ring. Generous relative to any
/// plausible MIDI burst between two render calls.
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Engine construction parameters.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Audio sample rate, in Hz.
    pub sample_rate: f64,
    /// Maximum simultaneous voices.
    pub max_voices: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            max_voices: 16,
        }
    }
}

/// A single queued control event, pushed from a producer thread and
/// drained on the render thread at the top of each `render` call.
#[derive(Clone, Debug)]
enum EngineEvent {
    NoteOn { note: u8, velocity: u8, channel: u8 },
    NoteOff { note: u8, channel: u8 },
    ControlChange { controller: u8, value: u8, channel: u8 },
    PitchBend { value: u16 },
    ChannelPressure { value: u8 },
    LoadPatch(Box<Patch>),
    Panic,
}

/// A lightweight, cloneable handle producer threads use to queue events
/// for a running [`Engine`], without touching its render state directly.
pub struct EngineHandle {
    producer: HeapProd<EngineEvent>,
}

impl EngineHandle {
    fn push(&mut self, event: EngineEvent) -> Result<(), EngineError> {
        self.producer.try_push(event).map_err(|_| EngineError::QueueFull)
    }

    /// Queue a MIDI note-on.
    pub fn note_on(&mut self, note: u8, velocity: u8, channel: u8) -> Result<(), EngineError> {
        self.push(EngineEvent::NoteOn { note, velocity, channel })
    }

    /// Queue a MIDI note-off.
    pub fn note_off(&mut self, note: u8, channel: u8) -> Result<(), EngineError> {
        self.push(EngineEvent::NoteOff { note, channel })
    }

    /// Queue a MIDI control-change message.
    pub fn control_change(&mut self, controller: u8, value: u8, channel: u8) -> Result<(), EngineError> {
        self.push(EngineEvent::ControlChange { controller, value, channel })
    }

    /// Queue a 14-bit pitch-bend value (0x0000-0x3FFF, center 0x2000).
    pub fn pitch_bend(&mut self, value: u16) -> Result<(), EngineError> {
        self.push(EngineEvent::PitchBend { value })
    }

    /// Queue a channel (monophonic) aftertouch value.
    pub fn channel_pressure(&mut self, value: u8) -> Result<(), EngineError> {
        self.push(EngineEvent::ChannelPressure { value })
    }

    /// Queue a decoded patch to become the active voice parameters.
    pub fn load_patch(&mut self, patch: Patch) -> Result<(), EngineError> {
        self.push(EngineEvent::LoadPatch(Box::new(patch)))
    }

    /// Decode a raw SYSEX message and queue the resulting patch. Bank
    /// dumps queue their first voice; use [`sysex::parse_sysex_message`]
    /// directly to access every voice in a bank.
    pub fn load_sysex(&mut self, message: &[u8]) -> Result<(), EngineError> {
        match sysex::parse_sysex_message(message)? {
            SysexVoiceData::Voice(patch) => self.push(EngineEvent::LoadPatch(patch)),
            SysexVoiceData::Bank(mut patches) => {
                let first = patches.drain(..1).next().ok_or(EngineError::MalformedSysex(
                    "bank contained no voices",
                ))?;
                self.push(EngineEvent::LoadPatch(Box::new(first)))
            }
        }
    }

    /// Queue an all-notes-off panic.
    pub fn panic(&mut self) -> Result<(), EngineError> {
        self.push(EngineEvent::Panic)
    }
}

/// The realtime-thread side of the engine: owns the voice pool and
/// renders audio.
pub struct Engine {
    allocator: Allocator,
    consumer: HeapCons<EngineEvent>,
    pending_pitch_bend_range: u8,
    sample_rate: f64,
    /// Count of `render` calls whose wall-clock time exceeded the
    /// real-time budget for the samples produced (§7 `XRun`). Incremented,
    /// never surfaced as an error: rendering still completes and produces
    /// output every time.
    xrun_count: u64,
}

impl Engine {
    /// Construct a new engine and its cross-thread control handle.
    pub fn new(config: EngineConfig) -> (Self, EngineHandle) {
        let ring = HeapRb::<EngineEvent>::new(EVENT_QUEUE_CAPACITY);
        let (producer, consumer) = ring.split();

        let mut allocator = Allocator::new(config.max_voices.max(1));
        allocator.init_sample_rate(config.sample_rate);
        allocator.load_patch(Patch::init_voice());

        (
            Self {
                allocator,
                consumer,
                pending_pitch_bend_range: 2,
                sample_rate: config.sample_rate,
                xrun_count: 0,
            },
            EngineHandle { producer },
        )
    }

    /// Drain queued events and apply them to the voice pool. Called at
    /// the top of every `render`; safe to call standalone for tests.
    fn drain_events(&mut self) {
        while let Some(event) = self.consumer.try_pop() {
            match event {
                EngineEvent::NoteOn { note, velocity, channel } => {
                    self.allocator.note_on(note, velocity, channel);
                }
                EngineEvent::NoteOff { note, channel } => {
                    self.allocator.note_off(note, channel);
                }
                EngineEvent::ControlChange { controller, value, channel } => {
                    self.apply_control_change(controller, value, channel);
                }
                EngineEvent::PitchBend { value } => {
                    self.allocator.controllers_mut().set_pitch_bend(value);
                }
                EngineEvent::ChannelPressure { value } => {
                    self.allocator.controllers_mut().set_aftertouch(value);
                }
                EngineEvent::LoadPatch(patch) => {
                    self.allocator.load_patch(*patch);
                }
                EngineEvent::Panic => {
                    self.allocator.all_notes_off();
                }
            }
        }
    }

    fn apply_control_change(&mut self, controller: u8, value: u8, _channel: u8) {
        let controllers = self.allocator.controllers_mut();
        match controller {
            1 => controllers.set_mod_wheel(value),
            2 => controllers.set_breath(value),
            4 => controllers.set_foot(value),
            7 => controllers.set_volume(value),
            11 => controllers.set_expression(value),
            64 => self.allocator.set_sustain(value >= 64),
            65 => {
                let time = controllers.portamento_time;
                let glissando = controllers.glissando;
                controllers.set_portamento(value >= 64, time, glissando);
            }
            5 => {
                let enabled = controllers.portamento_enabled;
                let glissando = controllers.glissando;
                controllers.set_portamento(enabled, value, glissando);
            }
            120 | 123 => self.allocator.all_notes_off(),
            126 => self.allocator.set_mono_mode(true),
            127 => self.allocator.set_mono_mode(false),
            _ => {}
        }
    }

    /// Render one block of `N`-sample-multiple audio into `output`, as
    /// i32 Q8.24 fixed-point samples (matching the rest of the DSP path).
    /// `output.len()` must be a multiple of `N`.
    pub fn render(&mut self, output: &mut [i32]) {
        let started = std::time::Instant::now();
        self.drain_events();
        for block in output.chunks_mut(N) {
            if block.len() == N {
                self.allocator.process(block);
            } else {
                let mut scratch = [0i32; N];
                self.allocator.process(&mut scratch);
                block.copy_from_slice(&scratch[..block.len()]);
            }
        }
        self.check_xrun(output.len(), started);
    }

    /// Real-time budget for `n_samples` at the engine's sample rate; a
    /// `render` call taking longer than this is an XRun.
    fn check_xrun(&mut self, n_samples: usize, started: std::time::Instant) {
        let budget = std::time::Duration::from_secs_f64(n_samples as f64 / self.sample_rate);
        if started.elapsed() > budget {
            self.xrun_count += 1;
        }
    }

    /// Number of `render` calls so far that exceeded their real-time budget.
    /// Monotonically increasing; never resets on its own.
    pub fn xrun_count(&self) -> u64 {
        self.xrun_count
    }

    /// Render one block directly to `f32` samples in `[-1.0, 1.0]`.
    pub fn render_f32(&mut self, output: &mut [f32]) {
        let started = std::time::Instant::now();
        self.drain_events();
        let mut scratch = [0i32; N];
        for block in output.chunks_mut(N) {
            self.allocator.process(&mut scratch);
            crate::wav_writer::i32_to_f32_samples(&scratch[..block.len()], block);
        }
        self.check_xrun(output.len(), started);
    }

    /// Set pitch bend range (semitones, 0-12) and quantization step.
    pub fn set_pitch_bend_range(&mut self, range: u8, step: u8) {
        self.pending_pitch_bend_range = range;
        self.allocator.controllers_mut().set_pitch_bend_range(range, step);
    }

    /// Resize the voice pool (0..32). Releases all currently-sounding
    /// voices, same as the reference engine's `maxNotes` runtime knob.
    pub fn set_max_voices(&mut self, max_voices: usize) {
        self.allocator.set_max_voices(max_voices);
    }

    /// Set the output filter's normalized cutoff (0.0-1.0).
    pub fn set_filter_cutoff(&mut self, cutoff: f32) {
        self.allocator.set_filter_cutoff(cutoff);
    }

    /// Set the output filter's normalized resonance (0.0-1.0).
    pub fn set_filter_resonance(&mut self, resonance: f32) {
        self.allocator.set_filter_resonance(resonance);
    }

    /// Set the output filter's mode mix, selecting among the ladder's
    /// four taps (0.0 = 4-pole lowpass .. 1.0 = 1-pole).
    pub fn set_filter_mode_mix(&mut self, mode_mix: f32) {
        self.allocator.set_filter_mode_mix(mode_mix);
    }

    /// Set overall output gain. `0.0` mutes the engine entirely.
    pub fn set_gain(&mut self, gain: f32) {
        self.allocator.set_gain(gain);
    }

    /// Switch between polyphonic and last-note-priority monophonic mode.
    /// Also reachable live via CC 126/127 through [`EngineHandle::control_change`].
    pub fn set_mono_mode(&mut self, mono: bool) {
        self.allocator.set_mono_mode(mono);
    }

    /// Enable or disable in-place retrigger of sustained notes.
    pub fn set_refresh_mode(&mut self, refresh: bool) {
        self.allocator.set_refresh_mode(refresh);
    }

    /// Set master fine tune, in cents/100 (-99..99; out-of-range clamps).
    pub fn set_master_tune(&mut self, cents: i8) {
        self.allocator.controllers_mut().set_master_tune_cents(cents);
    }

    /// Select the resolution flavor (0=Modern, 1=Mark-I, 2=OPL).
    pub fn set_engine_type(&mut self, engine_type: u8) {
        self.allocator.set_engine_type(engine_type);
    }

    /// Number of voices currently producing sound.
    pub fn active_voice_count(&self) -> usize {
        self.allocator.active_voice_count()
    }

    /// Directly apply a decoded patch (non-realtime-safe convenience for
    /// tests and offline rendering; prefer [`EngineHandle::load_patch`]
    /// from a producer thread when the engine is running live).
    pub fn load_patch_now(&mut self, patch: Patch) {
        self.allocator.load_patch(patch);
    }

    /// Directly trigger a note (non-realtime-safe convenience, see
    /// [`Engine::load_patch_now`]).
    pub fn note_on_now(&mut self, note: u8, velocity: u8, channel: u8) {
        self.allocator.note_on(note, velocity, channel);
    }

    /// Directly release a note (non-realtime-safe convenience, see
    /// [`Engine::load_patch_now`]).
    pub fn note_off_now(&mut self, note: u8, channel: u8) {
        self.allocator.note_off(note, channel);
    }

    /// Directly panic-release every voice (non-realtime-safe convenience,
    /// see [`Engine::load_patch_now`]).
    pub fn panic_now(&mut self) {
        self.allocator.all_notes_off();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_creation_has_no_active_voices() {
        let (engine, _handle) = Engine::new(EngineConfig::default());
        assert_eq!(engine.active_voice_count(), 0);
    }

    #[test]
    fn test_note_on_through_handle_renders_audio() {
        let (mut engine, mut handle) = Engine::new(EngineConfig::default());
        handle.note_on(69, 100, 0).unwrap();

        let mut out = [0i32; N * 4];
        engine.render(&mut out);
        assert!(out.iter().any(|&s| s != 0));
    }

    #[test]
    fn test_panic_silences_all_voices() {
        let (mut engine, mut handle) = Engine::new(EngineConfig::default());
        handle.note_on(60, 100, 0).unwrap();
        handle.note_on(64, 100, 0).unwrap();
        let mut out = [0i32; N];
        engine.render(&mut out);

        handle.panic().unwrap();
        // Drain the panic and allow envelopes to decay to inactive.
        for _ in 0..2000 {
            engine.render(&mut out);
        }
        assert_eq!(engine.active_voice_count(), 0);
    }

    #[test]
    fn test_render_f32_stays_in_range() {
        let (mut engine, mut handle) = Engine::new(EngineConfig::default());
        handle.note_on(69, 127, 0).unwrap();

        let mut out = vec![0.0f32; N * 8];
        engine.render_f32(&mut out);
        assert!(out.iter().all(|&s| s >= -1.0 && s <= 1.0));
    }

    #[test]
    fn test_filter_cutoff_attenuates_high_frequency_content() {
        let (mut engine, mut handle) = Engine::new(EngineConfig::default());
        handle.note_on(96, 127, 0).unwrap();

        engine.set_filter_cutoff(1.0);
        let mut open = [0i32; N * 4];
        engine.render(&mut open);
        let open_peak = open.iter().map(|&s| s.unsigned_abs()).max().unwrap_or(0);

        let (mut engine2, mut handle2) = Engine::new(EngineConfig::default());
        handle2.note_on(96, 127, 0).unwrap();
        engine2.set_filter_cutoff(0.0);
        let mut closed = [0i32; N * 4];
        engine2.render(&mut closed);
        let closed_peak = closed.iter().map(|&s| s.unsigned_abs()).max().unwrap_or(0);

        assert!(closed_peak <= open_peak);
    }

    #[test]
    fn test_gain_zero_mutes_output() {
        let (mut engine, mut handle) = Engine::new(EngineConfig::default());
        handle.note_on(60, 100, 0).unwrap();
        engine.set_gain(0.0);

        let mut out = [0i32; N * 2];
        engine.render(&mut out);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_set_max_voices_resizes_pool() {
        let (mut engine, mut handle) = Engine::new(EngineConfig::default());
        handle.note_on(60, 100, 0).unwrap();
        engine.render(&mut [0i32; N]);

        engine.set_max_voices(4);
        assert_eq!(engine.active_voice_count(), 0);
    }

    #[test]
    fn test_sysex_handle_loads_patch() {
        use crate::fm::sysex::build_voice_message;

        let (mut engine, mut handle) = Engine::new(EngineConfig::default());
        let mut patch = Patch::init_voice();
        patch.global.algorithm = 10;
        let msg = build_voice_message(&patch, 0);
        handle.load_sysex(&msg).unwrap();

        handle.note_on(60, 100, 0).unwrap();
        let mut out = [0i32; N];
        engine.render(&mut out);
    }
}
