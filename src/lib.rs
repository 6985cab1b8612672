//! Polyphonic, DX7-compatible six-operator FM synthesis engine.
//!
//! The DSP core (`fm`) is a fixed-point port in the spirit of the Dexed
//! DX7 emulator: phase accumulators, logarithmic envelopes, and lookup
//! tables for sine/exp2/tanh keep the hot path free of floating-point
//! transcendental calls. [`engine::Engine`] wraps the voice pool
//! (`fm::Allocator`) behind a lock-free event queue so MIDI input from
//! any thread can drive realtime audio rendering without blocking it.

#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod fm;
pub mod wav_writer;

pub use engine::{Engine, EngineConfig, EngineHandle};
pub use error::EngineError;
pub use fm::patch::Patch;
