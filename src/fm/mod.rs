//! Six-operator FM synthesis core.
//!
//! This module tree is split along the same lines as the reference Dexed
//! engine it is grounded on: fixed-point math tables (`sin`, `exp2`, `tanh`,
//! `freqlut`), per-operator DSP (`fm_op_kernel`, `env`, `pitchenv`), a
//! per-voice note object (`dx7note`), the voice pool that allocates and
//! steals voices (`allocator`), and the SYSEX codec (`sysex`).

pub mod allocator;
pub mod constants;
pub mod controllers;
pub mod dx7note;
pub mod env;
pub mod exp2;
pub mod filter;
pub mod fm_op_kernel;
pub mod freqlut;
pub mod lfo;
pub mod patch;
pub mod pitchenv;
pub mod porta;
pub mod sin;
pub mod sysex;
pub mod tanh;

pub use allocator::Allocator;
pub use constants::{max, min, N};
pub use freqlut::FreqLut;
pub use patch::Patch;
