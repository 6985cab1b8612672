//! Demo CLI: render a single note from a patch (SYSEX voice dump or the
//! built-in init voice) to a WAV file.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use dx7engine::engine::{Engine, EngineConfig};
use dx7engine::fm::patch::Patch;
use dx7engine::fm::sysex::{self, SysexVoiceData};
use dx7engine::wav_writer::WavOutput;

/// Render a DX7-style voice patch to a WAV file.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to a SYSEX voice or bank dump (.syx). Omit to use the init voice.
    #[arg(long)]
    sysex_file: Option<String>,

    /// Index of the voice to use within a bank dump.
    #[arg(long, default_value_t = 0)]
    patch: usize,

    /// MIDI note number to render (60 = C4, 69 = A4).
    #[arg(long, default_value_t = 69)]
    midi_note: u8,

    /// MIDI velocity (1-127).
    #[arg(long, default_value_t = 100)]
    velocity: u8,

    /// Note-on duration, in seconds, before releasing the key.
    #[arg(long, default_value_t = 1.0)]
    note_length: f64,

    /// Output sample rate, in Hz.
    #[arg(long, default_value_t = 44100)]
    sample_rate: u32,

    /// Silence duration (microseconds) after release before stopping.
    #[arg(long, default_value_t = 100_000)]
    silence_threshold_us: u32,

    /// Output WAV file path.
    #[arg(long, default_value = "out.wav")]
    output_file: String,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn validate_args(args: &Args) -> Result<()> {
    if let Some(path) = &args.sysex_file {
        if !Path::new(path).exists() {
            return Err(anyhow!("sysex file not found: {}", path));
        }
    }
    if args.velocity == 0 {
        return Err(anyhow!("velocity must be 1-127"));
    }
    if args.note_length <= 0.0 {
        return Err(anyhow!("note-length must be positive"));
    }
    if args.sample_rate < 8000 {
        return Err(anyhow!("sample-rate is implausibly low: {}", args.sample_rate));
    }
    if let Some(parent) = Path::new(&args.output_file).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(anyhow!("output directory does not exist: {}", parent.display()));
        }
    }
    Ok(())
}

fn load_patch(args: &Args) -> Result<Patch> {
    let Some(path) = &args.sysex_file else {
        return Ok(Patch::init_voice());
    };

    let data = std::fs::read(path).with_context(|| format!("reading {}", path))?;
    match sysex::parse_sysex_message(&data)? {
        SysexVoiceData::Voice(patch) => Ok(*patch),
        SysexVoiceData::Bank(patches) => patches
            .into_iter()
            .nth(args.patch)
            .ok_or_else(|| anyhow!("patch index {} out of range for a 32-voice bank", args.patch)),
    }
}

fn note_name(midi_note: u8) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    let octave = (midi_note as i32 / 12) - 1;
    format!("{}{}", NAMES[midi_note as usize % 12], octave)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    validate_args(&args)?;

    let patch = load_patch(&args)?;
    log::info!(
        "rendering patch '{}' at note {} ({})",
        patch.name(),
        args.midi_note,
        note_name(args.midi_note)
    );

    let (mut engine, _handle) = Engine::new(EngineConfig {
        sample_rate: args.sample_rate as f64,
        max_voices: 1,
    });
    engine.load_patch_now(patch);
    engine.note_on_now(args.midi_note, args.velocity, 0);

    let mut wav = WavOutput::new(&args.output_file, args.sample_rate, args.silence_threshold_us)?;

    const CHUNK: usize = 1024;
    let mut i32_buf = [0i32; CHUNK];
    let mut f32_buf = [0.0f32; CHUNK];

    let note_on_samples = (args.note_length * args.sample_rate as f64) as usize;
    let mut rendered = 0usize;
    let mut released = false;

    loop {
        if !released && rendered >= note_on_samples {
            engine.note_off_now(args.midi_note, 0);
            released = true;
        }

        engine.render(&mut i32_buf);
        dx7engine::wav_writer::i32_to_f32_samples(&i32_buf, &mut f32_buf);
        rendered += CHUNK;

        if wav.write_samples(&f32_buf)? && released {
            break;
        }

        // Safety limit: never render more than 30 seconds of audio.
        if rendered > args.sample_rate as usize * 30 {
            break;
        }
    }

    wav.finalize()?;
    log::info!("wrote {}", args.output_file);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_name() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(69), "A4");
        assert_eq!(note_name(21), "A0");
    }

    #[test]
    fn test_validate_args_rejects_zero_velocity() {
        let args = Args {
            sysex_file: None,
            patch: 0,
            midi_note: 60,
            velocity: 0,
            note_length: 1.0,
            sample_rate: 44100,
            silence_threshold_us: 100_000,
            output_file: "out.wav".into(),
            verbose: false,
        };
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_rejects_missing_sysex_file() {
        let args = Args {
            sysex_file: Some("/no/such/file.syx".into()),
            patch: 0,
            midi_note: 60,
            velocity: 100,
            note_length: 1.0,
            sample_rate: 44100,
            silence_threshold_us: 100_000,
            output_file: "out.wav".into(),
            verbose: false,
        };
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_accepts_defaults() {
        let args = Args {
            sysex_file: None,
            patch: 0,
            midi_note: 69,
            velocity: 100,
            note_length: 1.0,
            sample_rate: 44100,
            silence_threshold_us: 100_000,
            output_file: "out.wav".into(),
            verbose: false,
        };
        assert!(validate_args(&args).is_ok());
    }
}
