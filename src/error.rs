//! Error types for the synth's fallible init/parameter surface.
//!
//! Render itself never fails (see the module docs on [`crate::synth::Synth`]);
//! only construction-time and parameter-setting operations can be rejected.

use std::fmt;

/// A failure reported by one of the synth's fallible setters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthError {
    /// The supplied ROM image failed validation.
    BadRom { reason: &'static str },
    /// An unrecognized parameter code was supplied.
    BadParameter { code: u32 },
    /// The operation requires state that hasn't been established yet
    /// (e.g. rendering before a ROM has been bound).
    BadState { reason: &'static str },
}

impl fmt::Display for SynthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthError::BadRom { reason } => write!(f, "bad ROM image: {reason}"),
            SynthError::BadParameter { code } => write!(f, "unrecognized parameter code: {code:#x}"),
            SynthError::BadState { reason } => write!(f, "bad synth state: {reason}"),
        }
    }
}

impl std::error::Error for SynthError {}

impl From<crate::rom::RomError> for SynthError {
    fn from(err: crate::rom::RomError) -> Self {
        match err {
            crate::rom::RomError::WrongSize { .. } => SynthError::BadRom {
                reason: "ROM image must be exactly 2 MiB",
            },
        }
    }
}

/// Convenience alias for the synth's fallible operations.
pub type SynthResult<T> = Result<T, SynthError>;
