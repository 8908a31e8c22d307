//! # Adaptive Voice Domain
//!
//! Shared domain objects for the adaptive-voice scheduler.
//!
//! These are plain value types: the jobs the planner produces, the
//! generations the tracker holds, the samples the predictors learn from,
//! and the single error type every fallible operation returns. Keeping
//! them here lets collaborators (engines, outputs, stores) be written
//! against the types without pulling in the tokio runtime.

pub mod audio_format;
pub mod generation;
pub mod playback_state;
pub mod sample;
pub mod synthesis_job;
pub mod voice_error;

pub use audio_format::AudioFormat;
pub use generation::{Generation, GenerationId, GenerationOutcome};
pub use playback_state::PlaybackState;
pub use sample::Sample;
pub use synthesis_job::{OffsetRange, SynthesisJob};
pub use voice_error::VoiceError;

/// Prelude module containing commonly used types.
pub mod prelude {
    pub use crate::{
        AudioFormat, Generation, GenerationId, GenerationOutcome, OffsetRange, PlaybackState,
        Sample, SynthesisJob, VoiceError,
    };
}
