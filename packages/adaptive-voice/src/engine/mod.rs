//! Speech synthesis collaborators.

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "openai")]
pub use openai::{OpenAiSpeechConfig, OpenAiSpeechEngine};

use adaptive_voice_domain::VoiceError;
use std::future::Future;
use std::pin::Pin;

/// Type alias for boxed future returned by collaborators.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Turns text into encoded audio.
///
/// A failure fails only the job that made the call; the scheduler never
/// retries at this layer.
pub trait SynthesisEngine: Send + Sync {
    fn synthesize<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<u8>, VoiceError>>;
}
