//! End-to-end tests against the public `Engine`/`EngineHandle` API.

use dx7engine::engine::{Engine, EngineConfig};
use dx7engine::fm::constants::N;
use dx7engine::fm::patch::Patch;
use dx7engine::fm::sysex::{build_voice_message, pack_voice, unpack_voice};

fn config() -> EngineConfig {
    EngineConfig {
        sample_rate: 44_100.0,
        max_voices: 8,
    }
}

#[test]
fn silence_with_no_notes() {
    let (mut engine, _handle) = Engine::new(config());
    let mut out = [0i32; N * 4];
    engine.render(&mut out);
    assert!(out.iter().all(|&s| s == 0));
    assert_eq!(engine.active_voice_count(), 0);
}

#[test]
fn a4_init_voice_produces_nonzero_output() {
    let (mut engine, mut handle) = Engine::new(config());
    handle.note_on(69, 100, 0).unwrap();

    let mut out = [0i32; N * 8];
    engine.render(&mut out);
    assert!(out.iter().any(|&s| s != 0));
}

#[test]
fn velocity_zero_note_on_behaves_as_note_off() {
    let (mut engine, mut handle) = Engine::new(config());
    handle.note_on(60, 100, 0).unwrap();
    let mut out = [0i32; N];
    engine.render(&mut out);
    assert_eq!(engine.active_voice_count(), 1);

    handle.note_on(60, 0, 0).unwrap();
    engine.render(&mut out);
    // Releasing starts the envelope's release stage; it may take several
    // blocks to reach full silence, but it must not still read as a
    // freshly struck note.
    for _ in 0..4000 {
        engine.render(&mut out);
    }
    assert_eq!(engine.active_voice_count(), 0);
}

#[test]
fn voice_stealing_bounds_polyphony() {
    let (mut engine, mut handle) = Engine::new(EngineConfig {
        sample_rate: 44_100.0,
        max_voices: 2,
    });
    handle.note_on(60, 100, 0).unwrap();
    handle.note_on(64, 100, 0).unwrap();
    handle.note_on(67, 100, 0).unwrap();

    let mut out = [0i32; N];
    engine.render(&mut out);
    assert!(engine.active_voice_count() <= 2);
}

#[test]
fn panic_silences_every_voice_eventually() {
    let (mut engine, mut handle) = Engine::new(config());
    handle.note_on(60, 100, 0).unwrap();
    handle.note_on(64, 100, 0).unwrap();
    handle.note_on(67, 100, 0).unwrap();

    let mut out = [0i32; N];
    engine.render(&mut out);
    assert!(engine.active_voice_count() > 0);

    handle.panic().unwrap();
    for _ in 0..4000 {
        engine.render(&mut out);
    }
    assert_eq!(engine.active_voice_count(), 0);
}

#[test]
fn sysex_voice_round_trips_through_the_wire_format() {
    let mut patch = Patch::init_voice();
    patch.global.algorithm = 4;
    patch.global.feedback = 3;
    patch.operators[0].output_level = 80;

    let packed = pack_voice(&patch);
    let unpacked = unpack_voice(&packed).unwrap();
    assert_eq!(unpacked, patch);

    let message = build_voice_message(&patch, 0);
    assert_eq!(message[0], 0xF0);
    assert_eq!(*message.last().unwrap(), 0xF7);
}

#[test]
fn loading_a_sysex_patch_through_the_handle_changes_the_sound() {
    let (mut engine, mut handle) = Engine::new(config());

    let mut bright = Patch::init_voice();
    bright.operators[0].output_level = 99;
    handle.load_sysex(&build_voice_message(&bright, 0)).unwrap();
    handle.note_on(69, 100, 0).unwrap();

    let mut loud = [0i32; N * 4];
    engine.render(&mut loud);

    let loud_peak = loud.iter().map(|&s| s.unsigned_abs()).max().unwrap_or(0);
    assert!(loud_peak > 0);
}

#[test]
fn master_tune_shifts_pitch_without_silencing_the_note() {
    const BLOCKS: usize = 140; // ~0.2s at 44.1kHz, long enough for the
                                // zero-crossing count to diverge clearly.

    let (mut untuned, mut h1) = Engine::new(config());
    h1.note_on(69, 100, 0).unwrap();
    let mut untuned_out = [0i32; N * BLOCKS];
    untuned.render(&mut untuned_out);

    let (mut tuned, mut h2) = Engine::new(config());
    tuned.set_master_tune(90); // +90 cents, within -99..99
    h2.note_on(69, 100, 0).unwrap();
    let mut tuned_out = [0i32; N * BLOCKS];
    tuned.render(&mut tuned_out);

    // Both should still produce sound; the detuned render's zero-crossing
    // count should differ from the reference since the pitch moved.
    let zero_crossings = |buf: &[i32]| {
        buf.windows(2)
            .filter(|w| (w[0] >= 0) != (w[1] >= 0))
            .count()
    };
    assert!(untuned_out.iter().any(|&s| s != 0));
    assert!(tuned_out.iter().any(|&s| s != 0));
    assert_ne!(zero_crossings(&untuned_out), zero_crossings(&tuned_out));
}

#[test]
fn engine_type_changes_quantization_without_silencing_the_note() {
    for flavor in [0u8, 1, 2] {
        let (mut engine, mut handle) = Engine::new(config());
        engine.set_engine_type(flavor);
        handle.note_on(69, 100, 0).unwrap();
        let mut out = [0i32; N * 8];
        engine.render(&mut out);
        assert!(out.iter().any(|&s| s != 0), "flavor {flavor} produced silence");
    }
}

#[test]
fn xrun_count_starts_at_zero_and_normal_rendering_stays_within_budget() {
    let (mut engine, mut handle) = Engine::new(config());
    assert_eq!(engine.xrun_count(), 0);
    handle.note_on(69, 100, 0).unwrap();
    let mut out = [0i32; N * 32];
    engine.render(&mut out);
    // A few dozen blocks of plain DSP work should never exceed the
    // wall-clock budget for 32 * N samples at 44.1kHz on any real machine.
    assert_eq!(engine.xrun_count(), 0);
}

#[test]
fn refresh_mode_retriggers_in_place_without_stealing_a_voice() {
    let (mut engine, mut handle) = Engine::new(config());
    engine.set_refresh_mode(true);
    handle.note_on(60, 100, 0).unwrap();
    let mut out = [0i32; N * 4];
    engine.render(&mut out);
    assert_eq!(engine.active_voice_count(), 1);

    // Re-striking the same note under refresh mode should retrigger the
    // existing voice rather than allocate a second one.
    handle.note_on(60, 100, 0).unwrap();
    engine.render(&mut out);
    assert_eq!(engine.active_voice_count(), 1);
}
