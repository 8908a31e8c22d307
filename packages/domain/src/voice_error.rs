//! Unified error for the scheduler and its collaborators.
use crate::PlaybackState;
use thiserror::Error;

/// Top-level error covering synthesis, playback and prediction.
#[derive(Debug, Clone, Error)]
pub enum VoiceError {
    /// The synthesis engine rejected or failed a request.
    #[error("synthesis: {0}")]
    Synthesis(String),
    /// Configuration-related failure reason.
    #[error("configuration: {0}")]
    Configuration(String),
    /// Reading or writing persisted predictor samples failed.
    #[error("storage: {0}")]
    Storage(String),
    /// The audio output device could not be opened or driven.
    #[error("audio output: {0}")]
    AudioOutput(String),
    /// Synthesized audio could not be decoded.
    #[error("audio decode: {0}")]
    AudioDecode(String),
    /// `start_playback` was called while the driver was not stopped.
    #[error("playback already active (state: {state})")]
    PlaybackAlreadyActive { state: PlaybackState },
    /// A regression fit was requested before enough samples existed.
    #[error("insufficient samples: have {count}, need {required}")]
    InsufficientSamples { count: usize, required: usize },
    /// Every sample shares the same x, so no line can be fitted.
    #[error("degenerate samples: zero variance in x")]
    DegenerateSamples,
}
