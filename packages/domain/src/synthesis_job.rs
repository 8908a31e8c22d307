//! Planned, not yet dispatched, units of synthesis.

use std::ops::Range;
use std::time::Instant;

/// Half-open interval over the session's global character-offset counter.
pub type OffsetRange = Range<usize>;

/// A unit of text the queue builder decided to synthesize, and when.
///
/// `offsets` is the join key between planning and tracking: the dispatch
/// loop hands it to the generation tracker unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisJob {
    pub text: String,
    pub dispatch_at: Instant,
    pub offsets: OffsetRange,
}

impl SynthesisJob {
    pub fn new(text: impl Into<String>, dispatch_at: Instant, offsets: OffsetRange) -> Self {
        Self {
            text: text.into(),
            dispatch_at,
            offsets,
        }
    }

    /// Text length as the predictors measure it.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}
