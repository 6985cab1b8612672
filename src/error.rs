//! Engine-local error types.
//!
//! Every error the engine can report is local and non-fatal: the audio
//! thread never panics and never aborts on malformed input. SYSEX rejects
//! bad data outright (no patch mutation); everything else clamps to the
//! nearest valid value and keeps going.

use thiserror::Error;

/// Errors the engine can report from its public API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A SYSEX payload's length didn't match the 128- or 155-byte voice
    /// contract (or, for a bank dump, the 4096-byte contract).
    #[error("bad patch size: expected {expected} bytes, got {actual}")]
    BadPatchSize {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// A SYSEX voice dump's 7-bit checksum didn't match the trailing
    /// checksum byte.
    #[error("bad sysex checksum: expected 0x{expected:02x}, got 0x{actual:02x}")]
    BadChecksum {
        /// Checksum the message claimed.
        expected: u8,
        /// Checksum actually computed over the payload.
        actual: u8,
    },

    /// The SYSEX message wrapper (`F0 43 0n ...`) was malformed: wrong
    /// manufacturer ID, missing terminator, or an unrecognized format byte.
    #[error("malformed sysex message: {0}")]
    MalformedSysex(&'static str),

    /// The event intake ring was full; the event was dropped rather than
    /// blocking the producer.
    #[error("event queue full, event dropped")]
    QueueFull,
}
