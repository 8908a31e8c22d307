//! Dispatched synthesis jobs tracked from pending to resolved.

use crate::OffsetRange;
use std::cmp::Ordering;
use std::fmt;

/// Identity of a tracked generation. Unique for the lifetime of a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenerationId(pub u64);

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Where a generation is in its life.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// Dispatched, engine has not answered yet.
    Pending,
    /// Engine answered; `duration_secs` is 0 when the audio could not be probed.
    Ready { audio: Vec<u8>, duration_secs: f64 },
    /// Engine failed. Playback skips the range instead of stalling on it.
    Failed { reason: String },
}

/// A dispatched job and, once the engine answers, its audio.
///
/// Equality is by `id` only. Ordering for playback is [`Generation::playback_order`].
#[derive(Debug, Clone)]
pub struct Generation {
    pub id: GenerationId,
    pub text: String,
    pub offsets: OffsetRange,
    pub outcome: GenerationOutcome,
}

impl Generation {
    pub fn pending(id: GenerationId, text: impl Into<String>, offsets: OffsetRange) -> Self {
        Self {
            id,
            text: text.into(),
            offsets,
            outcome: GenerationOutcome::Pending,
        }
    }

    /// Has audio to play.
    pub fn is_ready(&self) -> bool {
        matches!(self.outcome, GenerationOutcome::Ready { .. })
    }

    /// No longer waiting on the engine, successfully or not.
    pub fn is_resolved(&self) -> bool {
        !matches!(self.outcome, GenerationOutcome::Pending)
    }

    pub fn audio(&self) -> Option<&[u8]> {
        match &self.outcome {
            GenerationOutcome::Ready { audio, .. } => Some(audio),
            _ => None,
        }
    }

    pub fn duration_secs(&self) -> Option<f64> {
        match self.outcome {
            GenerationOutcome::Ready { duration_secs, .. } => Some(duration_secs),
            _ => None,
        }
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Total order used by the tracker; `Less` plays first.
    ///
    /// Lower offset first; on equal offsets a generation with audio beats one
    /// without; then the longer source text wins.
    pub fn playback_order(&self, other: &Self) -> Ordering {
        self.offsets
            .start
            .cmp(&other.offsets.start)
            .then_with(|| other.is_ready().cmp(&self.is_ready()))
            .then_with(|| other.char_count().cmp(&self.char_count()))
    }
}

impl PartialEq for Generation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Generation {}
