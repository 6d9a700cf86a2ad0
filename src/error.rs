//! Error types for the compiler and the artifact parser.
//!
//! Every fatal condition is a typed variant: a failed compile returns one of
//! these instead of a partial artifact. Timing-consistency problems (a repeat
//! period that is not a whole number of samples, a repeat shorter than the
//! stability threshold) are not errors; they are reported through `log`.

use pyo3::exceptions::PyValueError;
use pyo3::PyErr;
use thiserror::Error;

/// Fatal errors raised while configuring, recording or compiling a sequence.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("invalid hardware configuration: {0}")]
    InvalidConfig(String),

    #[error("channel group '{group}' has no profile named '{name}'")]
    UnknownProfile { group: String, name: String },

    #[error("no channel group named '{0}' is registered")]
    UnknownGroup(String),

    #[error("channel group '{0}' is already registered")]
    DuplicateGroup(String),

    #[error(
        "profile '{profile}' of group '{group}' has {found} bits, \
        but the group drives {expected} channels"
    )]
    ProfileWidthMismatch {
        group: String,
        profile: String,
        expected: usize,
        found: usize,
    },

    #[error("channel {channel} is out of range for a card with {num_channels} channels")]
    ChannelIndexOutOfRange { channel: usize, num_channels: usize },

    #[error("transition time {0} cannot be quantized to a sample index")]
    InvalidTime(f64),

    #[error(
        "repeat region starting at {second_t0} overlaps the region {first_t0}..{first_tf}"
    )]
    OverlappingRepeatRegions {
        first_t0: f64,
        first_tf: f64,
        second_t0: f64,
    },

    #[error(transparent)]
    Replay(#[from] ParseError),
}

pub type Result<T, E = CompileError> = std::result::Result<T, E>;

impl From<CompileError> for PyErr {
    fn from(err: CompileError) -> Self {
        PyValueError::new_err(err.to_string())
    }
}

/// Errors raised while reading a script or an artifact back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("script does not start with a 'script <name>' line")]
    MissingStart,

    #[error("script is not terminated by 'end script'")]
    MissingEnd,

    #[error("line {line}: cannot parse instruction '{text}'")]
    UnknownInstruction { line: usize, text: String },

    #[error("script references waveform '{0}' which is not defined")]
    UnknownWaveform(String),

    #[error("waveform '{name}' has {len} samples, fewer than one alignment quantum ({quantum})")]
    ShortWaveform { name: String, len: usize, quantum: u64 },
}
