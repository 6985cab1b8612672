//! Voice allocator: manages a fixed pool of [`Dx7Note`]s, deciding which
//! voice serves each incoming note-on, handling polyphonic stealing, mono
//! mode (with legato transfer), sustain pedal hold-over, and the
//! "refresh" in-place retrigger mode.

use super::{
    controllers::Controllers,
    dx7note::Dx7Note,
    filter::OutputFilter,
    lfo::Lfo,
    patch::Patch,
};

/// One pooled voice plus its MIDI routing/bookkeeping state.
#[derive(Clone, Debug)]
struct PoolVoice {
    note: Dx7Note,
    midi_note: u8,
    midi_channel: u8,
    /// True once a note-off has been received but the voice is being
    /// held by the sustain pedal.
    held_by_sustain: bool,
    /// True while the key is physically down (distinct from sustain).
    key_down: bool,
}

impl PoolVoice {
    fn new() -> Self {
        Self {
            note: Dx7Note::new(),
            midi_note: 0,
            midi_channel: 0,
            held_by_sustain: false,
            key_down: false,
        }
    }

    fn is_free(&self) -> bool {
        !self.note.is_active()
    }
}

/// Polyphonic voice allocator and pool.
#[derive(Clone, Debug)]
pub struct Allocator {
    voices: Vec<PoolVoice>,
    lfo: Lfo,
    controllers: Controllers,
    patch: Patch,
    sample_rate: f64,
    filter: OutputFilter,

    /// Monotonic counter, stamped on every note-on, used both as the
    /// "oldest voice" stealing key and as each voice's
    /// `key_pressed_timer`.
    note_counter: u64,

    /// Round-robin cursor into `voices`, advanced on every allocation so
    /// that repeated stealing doesn't always hit the same voice first.
    next_voice: usize,

    /// Mono mode: at most one voice sounds; new notes transfer the
    /// previous voice's envelope/phase state (legato) instead of
    /// re-striking.
    mono_mode: bool,

    /// Refresh mode: a repeated note-on for an already-sounding note
    /// re-triggers that same voice in place rather than allocating a new
    /// one (avoids the small click/phase-reset of a full re-strike).
    refresh_mode: bool,

    /// Sustain pedal state (CC64 >= 64).
    sustain: bool,

    /// Keys currently held, most-recent-last, for mono-mode note
    /// priority on release (last-note priority).
    held_notes: Vec<(u8, u8)>, // (note, channel)

    /// Resolution flavor (Modern/Mark-I/OPL), applied to every voice.
    engine_type: super::constants::EngineType,
}

impl Allocator {
    /// Create a new allocator with `max_voices` pooled voices.
    pub fn new(max_voices: usize) -> Self {
        let voices = (0..max_voices.max(1)).map(|_| PoolVoice::new()).collect();
        Self {
            voices,
            lfo: Lfo::new(),
            controllers: Controllers::new(),
            patch: Patch::init_voice(),
            sample_rate: 44_100.0,
            filter: OutputFilter::new(44_100.0),
            note_counter: 0,
            next_voice: 0,
            mono_mode: false,
            refresh_mode: false,
            sustain: false,
            held_notes: Vec::new(),
            engine_type: super::constants::EngineType::default(),
        }
    }

    /// Initialize sample-rate-dependent global tables.
    pub fn init_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        Lfo::init(sample_rate);
        super::env::Env::init_sr(sample_rate);
        self.filter.set_sample_rate(sample_rate);
        for voice in &mut self.voices {
            voice.note.porta.set_sample_rate(sample_rate);
        }
    }

    /// Set the output filter's normalized cutoff (0.0-1.0, log-scaled
    /// 60-19000 Hz internally). `1.0` is fully open (bypass-equivalent).
    pub fn set_filter_cutoff(&mut self, cutoff: f32) {
        self.filter.cutoff = cutoff.clamp(0.0, 1.0);
    }

    /// Set the output filter's normalized resonance (0.0-1.0).
    pub fn set_filter_resonance(&mut self, resonance: f32) {
        self.filter.resonance = resonance.clamp(0.0, 1.0);
    }

    /// Set the output filter's mode mix (0.0 = 4-pole lowpass, 1.0 =
    /// 1-pole), selecting among the ladder's four taps.
    pub fn set_filter_mode_mix(&mut self, mode_mix: f32) {
        self.filter.mode_mix = mode_mix.clamp(0.0, 1.0);
    }

    /// Set overall output gain. `0.0` mutes the engine entirely.
    pub fn set_gain(&mut self, gain: f32) {
        self.filter.gain = gain.max(0.0);
    }

    /// Load a new voice patch, applying it to every pooled voice so the
    /// next note-on (and any currently-sounding voice) uses it, and
    /// re-arming the shared LFO from the patch's LFO block.
    pub fn load_patch(&mut self, patch: Patch) {
        self.patch = patch;
        for voice in &mut self.voices {
            voice.note.apply_patch(&self.patch, self.sample_rate);
        }
        let g = &self.patch.global;
        self.set_lfo_params(&[
            g.lfo_speed,
            g.lfo_delay,
            g.lfo_pitch_mod_depth,
            g.lfo_amp_mod_depth,
            g.lfo_sync,
            g.lfo_waveform,
        ]);
    }

    /// Enable or disable mono mode.
    pub fn set_mono_mode(&mut self, mono: bool) {
        self.mono_mode = mono;
    }

    /// Resize the voice pool (0..32 in practice). Releases every
    /// currently-sounding voice, since the pool is rebuilt from scratch.
    pub fn set_max_voices(&mut self, max_voices: usize) {
        let max_voices = max_voices.max(1);
        self.voices = (0..max_voices).map(|_| PoolVoice::new()).collect();
        for voice in &mut self.voices {
            voice.note.engine_type = self.engine_type;
        }
        self.next_voice = 0;
        self.held_notes.clear();
    }

    /// Enable or disable refresh (in-place retrigger) mode.
    pub fn set_refresh_mode(&mut self, refresh: bool) {
        self.refresh_mode = refresh;
    }

    /// Select the resolution flavor (0=Modern, 1=Mark-I, 2=OPL; out-of-range
    /// clamps to OPL per the §7 `OutOfRange` policy), applied immediately to
    /// every pooled voice and to every voice allocated afterward.
    pub fn set_engine_type(&mut self, engine_type: u8) {
        self.engine_type = super::constants::EngineType::from_u8(engine_type);
        for voice in &mut self.voices {
            voice.note.engine_type = self.engine_type;
        }
    }

    fn find_free_voice(&self) -> Option<usize> {
        let n = self.voices.len();
        (0..n)
            .map(|i| (self.next_voice + i) % n)
            .find(|&i| self.voices[i].is_free())
    }

    fn find_oldest_voice(&self) -> usize {
        self.voices
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| v.note.key_pressed_timer)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn find_voice_playing(&self, note: u8, channel: u8) -> Option<usize> {
        self.voices
            .iter()
            .position(|v| v.midi_note == note && v.midi_channel == channel && v.note.is_active())
    }

    /// Handle a MIDI note-on.
    pub fn note_on(&mut self, note: u8, velocity: u8, channel: u8) {
        if velocity == 0 {
            self.note_off(note, channel);
            return;
        }

        self.note_counter += 1;
        self.held_notes.retain(|&(n, c)| !(n == note && c == channel));
        self.held_notes.push((note, channel));

        if self.mono_mode {
            self.mono_note_on(note, velocity, channel);
            return;
        }

        if self.refresh_mode {
            if let Some(idx) = self.find_voice_playing(note, channel) {
                let v = &mut self.voices[idx];
                v.note.refresh(note, velocity);
                v.note.key_pressed_timer = self.note_counter;
                v.key_down = true;
                v.held_by_sustain = false;
                return;
            }
        }

        let idx = self.find_free_voice().unwrap_or_else(|| self.find_oldest_voice());
        self.next_voice = (idx + 1) % self.voices.len();

        let v = &mut self.voices[idx];
        v.midi_note = note;
        v.midi_channel = channel;
        v.key_down = true;
        v.held_by_sustain = false;
        v.note.note = note;
        v.note.engine_type = self.engine_type;
        v.note.apply_patch(&self.patch, self.sample_rate);
        v.note.init(note, velocity);
        v.note.key_pressed_timer = self.note_counter;
        v.note.porta.set_enabled(self.controllers.portamento_enabled);
        v.note.porta.set_rate(self.controllers.portamento_time);
        v.note.porta.set_glissando(self.controllers.glissando);
    }

    /// Mono mode note-on: a single always-active voice (index 0) is
    /// retriggered or legato-transferred to the new pitch.
    fn mono_note_on(&mut self, note: u8, velocity: u8, channel: u8) {
        let idx = 0usize;
        let was_active = self.voices[idx].note.is_active();
        self.voices[idx].midi_note = note;
        self.voices[idx].midi_channel = channel;
        self.voices[idx].key_down = true;
        self.voices[idx].held_by_sustain = false;

        if was_active {
            // Legato: a new note arrives while the previous one is still
            // sounding. Build the new voice state in a scratch note, then
            // transfer envelope/phase/portamento across so the amplitude
            // trajectory and glide continue rather than re-striking.
            let mut scratch = Dx7Note::new();
            scratch.note = note;
            scratch.engine_type = self.engine_type;
            scratch.apply_patch(&self.patch, self.sample_rate);
            scratch.init(note, velocity);

            self.voices[idx].note.transfer_state(&mut scratch);
            self.voices[idx].note.transfer_portamento(&mut scratch);
            scratch.porta.set_enabled(self.controllers.portamento_enabled);
            scratch.porta.set_rate(self.controllers.portamento_time);
            scratch.porta.set_glissando(self.controllers.glissando);
            scratch.porta.set_target(scratch.operators[0].logfreq_base);
            scratch.key_pressed_timer = self.note_counter;
            self.voices[idx].note = scratch;
        } else {
            self.voices[idx].note.engine_type = self.engine_type;
            self.voices[idx].note.apply_patch(&self.patch, self.sample_rate);
            self.voices[idx].note.init(note, velocity);
            self.voices[idx].note.key_pressed_timer = self.note_counter;
            self.voices[idx]
                .note
                .porta
                .set_enabled(self.controllers.portamento_enabled);
            self.voices[idx].note.porta.set_rate(self.controllers.portamento_time);
            self.voices[idx].note.porta.set_glissando(self.controllers.glissando);
            self.voices[idx]
                .note
                .porta
                .reset(self.voices[idx].note.operators[0].logfreq_base);
        }
    }

    /// Handle a MIDI note-off.
    pub fn note_off(&mut self, note: u8, channel: u8) {
        self.held_notes.retain(|&(n, c)| !(n == note && c == channel));

        if self.mono_mode {
            if let Some(&(prev_note, prev_channel)) = self.held_notes.last() {
                // Last-note priority: fall back to the previous held key.
                self.mono_note_on(prev_note, self.voices[0].note.velocity, prev_channel);
            } else if self.voices[0].midi_note == note && self.voices[0].midi_channel == channel {
                self.voices[0].key_down = false;
                if !self.sustain {
                    self.voices[0].note.keyup();
                } else {
                    self.voices[0].held_by_sustain = true;
                }
            }
            return;
        }

        for voice in &mut self.voices {
            if voice.midi_note == note && voice.midi_channel == channel && voice.note.is_active() {
                voice.key_down = false;
                if self.sustain {
                    voice.held_by_sustain = true;
                } else {
                    voice.note.keyup();
                }
            }
        }
    }

    /// Sustain pedal (CC64). Raising it releases any voice that's no
    /// longer key-down but was being held.
    pub fn set_sustain(&mut self, down: bool) {
        self.sustain = down;
        if !down {
            for voice in &mut self.voices {
                if voice.held_by_sustain && !voice.key_down {
                    voice.held_by_sustain = false;
                    voice.note.keyup();
                }
            }
        }
    }

    /// Immediately release every voice (MIDI panic / all-notes-off).
    pub fn all_notes_off(&mut self) {
        for voice in &mut self.voices {
            voice.key_down = false;
            voice.held_by_sustain = false;
            voice.note.keyup();
        }
        self.held_notes.clear();
    }

    /// Number of voices currently producing sound.
    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.note.is_active()).count()
    }

    /// Mutable access to the shared controllers (pitch bend, mod wheel,
    /// sustain, portamento settings, operator-enable bitmap, ...).
    pub fn controllers_mut(&mut self) -> &mut Controllers {
        &mut self.controllers
    }

    /// Read-only access to the shared controllers.
    pub fn controllers(&self) -> &Controllers {
        &self.controllers
    }

    /// Set the LFO's patch-derived parameters
    /// (`[speed, delay, pmd, amd, sync, waveform]`).
    pub fn set_lfo_params(&mut self, params: &[u8; 6]) {
        self.lfo.reset(params);
    }

    /// Mix every active voice into `output` (length `N`), applying the
    /// shared LFO, controller modulation sidechain, pitch bend, and the
    /// live per-operator mute bitmap, then applying master volume and
    /// hard-clamping to the 24-bit sample range.
    pub fn process(&mut self, output: &mut [i32]) {
        output.fill(0);

        let lfo_sample = self.lfo.get_sample();
        let lfo_delay = self.lfo.get_delay();
        let lfo_raw = ((lfo_sample as i64 * lfo_delay as i64) >> 24) as i32;

        // The shared LFO produces one raw modulation sample per block; the
        // patch's PMD/AMD (0-99) independently scale how much of it reaches
        // pitch vs. amplitude, matching the DX7's two separate depth knobs
        // on a single LFO.
        let pmd = self.patch.global.lfo_pitch_mod_depth as i64;
        let amd = self.patch.global.lfo_amp_mod_depth as i64;
        let lfo_pitch_mod = ((lfo_raw as i64 * pmd) / 99) as i32;
        let lfo_amp_mod = ((lfo_raw as i64 * amd) / 99) as i32;
        let modulation = self.controllers.refresh();
        // Master tune is expressed in cents (1/100 semitone); fold it into
        // the same per-block semitone offset pitch bend rides on.
        let master_tune_semitones = self.controllers.master_tune_cents as f32 / 100.0;
        let pitch_bend_semitones =
            self.controllers.get_pitch_bend_quantized() + master_tune_semitones;
        let operator_enable = self.controllers.operator_enable;

        let mut scratch = [0i32; super::constants::N];
        for voice in &mut self.voices {
            if voice.note.is_active() {
                voice.note.process(
                    &mut scratch,
                    lfo_pitch_mod,
                    lfo_amp_mod,
                    &modulation,
                    pitch_bend_semitones,
                    operator_enable,
                );
                for (o, s) in output.iter_mut().zip(scratch.iter()) {
                    *o += *s;
                }
            }
        }

        let volume = self.controllers.get_volume_amount();
        for sample in output.iter_mut() {
            *sample = (*sample as f32 * volume) as i32;
        }

        self.filter.process(output);

        for sample in output.iter_mut() {
            *sample = (*sample).clamp(-(1 << 23), (1 << 23) - 1);
        }
    }
}
