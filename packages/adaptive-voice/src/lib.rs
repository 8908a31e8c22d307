//! # Adaptive Voice
//!
//! Adaptive queue scheduler that turns streamed text into gapless speech.
//!
//! Text arrives token by token from an upstream source. The scheduler learns
//! how long the synthesis engine takes to answer and how long the audio it
//! returns plays for, then sends the largest sentence or paragraph units it
//! can while still having audio back before playback runs dry.
//!
//! ## Usage Pattern
//!
//! ```ignore
//! use adaptive_voice::prelude::*;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(OpenAiSpeechEngine::from_env(OpenAiSpeechConfig::default())?);
//! let tts = AdaptiveQueueTts::builder(engine, Arc::new(RodioOutput::new()))
//!     .store(Arc::new(JsonFileSampleStore::open("predictor-history")?))
//!     .build()?;
//!
//! tts.prepare().await?;
//! for token in ["Hello ", "world. ", "How are ", "you?"] {
//!     tts.speak(token, false).await;
//! }
//! tts.flush(true).await;
//! ```

pub mod config;
pub mod dispatch;
pub mod duration;
pub mod engine;
pub mod events;
pub mod playback;
pub mod predictor;
pub mod queue;
pub mod sample_store;
pub mod segmentation;
pub mod session;
pub mod tracker;

pub use adaptive_voice_domain::{
    AudioFormat, Generation, GenerationId, GenerationOutcome, OffsetRange, PlaybackState, Sample,
    SynthesisJob, VoiceError,
};
pub use config::SchedulerConfig;
pub use duration::{DurationProbe, SymphoniaDurationProbe};
pub use engine::{BoxFuture, SynthesisEngine};
pub use events::{EventBus, EventKind, SchedulerEvent, next_event};
pub use playback::{AudioOutput, PlaybackDriver, Progress};
pub use predictor::{PredictorConfig, RegressionPredictor};
pub use queue::{QueuePlanner, QueueState};
pub use sample_store::{JsonFileSampleStore, MemorySampleStore, SampleStore};
pub use segmentation::{Candidate, Segmenter, Trailing};
pub use session::{AdaptiveQueueTts, AdaptiveQueueTtsBuilder};
pub use tracker::{GenerationTracker, TrackedSummary};

#[cfg(feature = "openai")]
pub use engine::{OpenAiSpeechConfig, OpenAiSpeechEngine};
#[cfg(feature = "rodio-output")]
pub use playback::RodioOutput;

/// Prelude module containing commonly used types.
pub mod prelude {
    pub use crate::{
        AdaptiveQueueTts, AudioOutput, DurationProbe, JsonFileSampleStore, MemorySampleStore,
        PlaybackState, SampleStore, SchedulerConfig, SchedulerEvent, SynthesisEngine, VoiceError,
    };

    #[cfg(feature = "openai")]
    pub use crate::{OpenAiSpeechConfig, OpenAiSpeechEngine};
    #[cfg(feature = "rodio-output")]
    pub use crate::RodioOutput;
}
