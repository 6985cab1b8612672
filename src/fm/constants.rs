
//! Core constants for the FM synthesis engine

/// Log base 2 of the block size for processing
pub const LG_N: usize = 6;

/// Block size for audio processing (64 samples)
pub const N: usize = 1 << LG_N;

/// Memory barrier for synchronization
#[inline]
pub fn synth_memory_barrier() {
    #[cfg(feature = "std")]
    {
        use std::sync::atomic::{compiler_fence, Ordering};
        compiler_fence(Ordering::SeqCst);
    }
}

/// Selects which historical DX7 resolution flavor the engine emulates.
///
/// Dexed exposes this as a runtime-selectable compatibility knob
/// (`DexedEngineResolution` in the reference implementation); the three
/// flavors trade gain-quantization precision for period-hardware fidelity.
/// Only the amplitude path is affected — phase/frequency math stays at
/// full Q24 precision in every mode, since the reference's per-flavor
/// branch lives in a part of the engine (`fm_core.cc`) outside the
/// portion of the source this crate was grounded on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EngineType {
    /// Full Q24 gain precision (the default used throughout this crate).
    #[default]
    Modern,
    /// Coarser gain quantization approximating the original 1980s DAC/DSP
    /// path.
    MarkI,
    /// Coarsest quantization, approximating Yamaha OPL-family chips.
    Opl,
}

impl EngineType {
    /// Map a runtime config value (0..2) to a flavor, clamping out-of-range
    /// input to `Opl` rather than rejecting it (§7 `OutOfRange` policy).
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => EngineType::Modern,
            1 => EngineType::MarkI,
            _ => EngineType::Opl,
        }
    }

    /// Number of low bits of a Q24 exponent input to discard before the
    /// `Exp2` lookup, coarsening gain resolution for period-accurate modes.
    pub fn gain_quantize_bits(self) -> u32 {
        match self {
            EngineType::Modern => 0,
            EngineType::MarkI => 8,
            EngineType::Opl => 12,
        }
    }
}

/// Quantized envelope rate conversion
#[inline]
pub const fn qer(n: i32, b: i32) -> f32 {
    (n as f32) / ((1 << b) as f32)
}

/// Utility functions for min/max (Rust std provides these, but keeping for consistency)
#[inline]
pub fn min<T: PartialOrd>(a: T, b: T) -> T {
    if a < b { a } else { b }
}

#[inline]
pub fn max<T: PartialOrd>(a: T, b: T) -> T {
    if a > b { a } else { b }
}