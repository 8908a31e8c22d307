//! Queue state and the greedy queue builder.

use crate::predictor::RegressionPredictor;
use crate::segmentation::{Segmenter, Trailing};
use crate::tracker::TrackedSummary;
use adaptive_voice_domain::SynthesisJob;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Text accepted from upstream that has not been dispatched yet, and the
/// current plan for it.
///
/// `text` starts at global offset `base_offset`. Planned jobs cover
/// consecutive prefixes of `text`; dispatching the head job consumes its
/// prefix and moves `base_offset` to the job's upper bound.
///
/// `message_ends` holds the global offsets where a flushed message stopped,
/// ascending and all above `base_offset`. No job spans one.
#[derive(Debug, Default)]
pub struct QueueState {
    epoch: u64,
    text: String,
    base_offset: usize,
    message_ends: Vec<usize>,
    pending: VecDeque<SynthesisJob>,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn base_offset(&self) -> usize {
        self.base_offset
    }

    pub fn pending(&self) -> impl Iterator<Item = &SynthesisJob> {
        self.pending.iter()
    }

    pub fn message_ends(&self) -> &[usize] {
        &self.message_ends
    }

    pub fn append(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Close the current message after its last non-whitespace character.
    /// Returns the boundary, or `None` when nothing new was accepted since
    /// the previous one.
    pub fn end_message(&mut self) -> Option<usize> {
        let end = self.base_offset + self.text.trim_end().chars().count();
        let previous = self.message_ends.last().copied().unwrap_or(self.base_offset);
        if end <= previous {
            return None;
        }
        self.message_ends.push(end);
        Some(end)
    }

    /// Swap in a new plan under a fresh epoch, returning that epoch.
    pub fn replace_plan(&mut self, jobs: Vec<SynthesisJob>) -> u64 {
        self.epoch += 1;
        self.pending = jobs.into();
        self.epoch
    }

    /// When the head job wants to go out.
    pub fn next_dispatch_at(&self) -> Option<Instant> {
        self.pending
            .front()
            .map(|job| Instant::from_std(job.dispatch_at))
    }

    /// Take the head job and drop the text it covers.
    pub fn pop_front(&mut self) -> Option<SynthesisJob> {
        let job = self.pending.pop_front()?;
        if job.offsets.start != self.base_offset {
            tracing::error!(
                job = ?job.offsets,
                base_offset = self.base_offset,
                "Planned job does not start at the queue head"
            );
        }
        let consumed = job.offsets.end.saturating_sub(self.base_offset);
        let bytes = byte_index_of_char(&self.text, consumed);
        self.text.drain(..bytes);
        self.base_offset = job.offsets.end;
        let base_offset = self.base_offset;
        self.message_ends.retain(|&end| end > base_offset);
        Some(job)
    }

    /// Forget all text and plans; offsets restart at 0 under a fresh epoch.
    pub fn reset(&mut self) -> u64 {
        self.epoch += 1;
        self.text.clear();
        self.base_offset = 0;
        self.message_ends.clear();
        self.pending.clear();
        self.epoch
    }
}

fn byte_index_of_char(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map_or(text.len(), |(index, _)| index)
}

/// Turns buffered text into timed jobs using the two predictors.
#[derive(Debug, Clone)]
pub struct QueuePlanner {
    latency: Arc<RegressionPredictor>,
    duration: Arc<RegressionPredictor>,
    segmenter: Segmenter,
    need_by_discount: f64,
}

impl QueuePlanner {
    pub fn new(
        latency: Arc<RegressionPredictor>,
        duration: Arc<RegressionPredictor>,
        segmenter: Segmenter,
        need_by_discount: f64,
    ) -> Self {
        Self {
            latency,
            duration,
            segmenter,
            need_by_discount,
        }
    }

    /// Extend the playback exhaustion time by everything already dispatched
    /// but not yet playing: known durations where audio arrived, the
    /// conservative estimate otherwise.
    pub fn need_by_time(&self, exhaustion: Instant, tracked: &[TrackedSummary]) -> Instant {
        let queued: f64 = tracked
            .iter()
            .map(|t| match t.duration_secs {
                Some(known) => known.max(0.0),
                None if t.resolved => 0.0,
                None => self.duration.conservative_low(t.chars as f64).max(0.0),
            })
            .sum();
        exhaustion + secs(queued)
    }

    /// Plan jobs for `text` (starting at global offset `base_offset`) so each
    /// is expected back from the engine before playback runs dry.
    ///
    /// Greedy: at each step the longest candidate whose conservative latency
    /// fits before `need_by` wins; the shortest is taken when none fits.
    /// Each offset in `message_ends` ends a sentence, terminator or not, and
    /// no job crosses it.
    pub fn build_queue(
        &self,
        text: &str,
        base_offset: usize,
        message_ends: &[usize],
        mut need_by: Instant,
        now: Instant,
        trailing: Trailing,
    ) -> Vec<SynthesisJob> {
        let mut jobs = Vec::new();
        let mut rest = text;
        let mut base = base_offset;

        loop {
            let candidates = match message_ends.iter().find(|&&end| end > base) {
                Some(&end) => {
                    let message = &rest[..byte_index_of_char(rest, end - base)];
                    self.segmenter.candidates(message, Trailing::Complete)
                }
                None => self.segmenter.candidates(rest, trailing),
            };
            let Some(last) = candidates.len().checked_sub(1) else {
                break;
            };
            let window = need_by.saturating_duration_since(now).as_secs_f64();

            let chosen = candidates.into_iter().enumerate().find_map(|(i, candidate)| {
                let api_secs = self
                    .latency
                    .conservative_high(candidate.text.chars().count() as f64)
                    .max(0.0);
                (api_secs < window || i == last).then_some((candidate, api_secs))
            });
            let Some((candidate, api_secs)) = chosen else {
                break;
            };

            let dispatch_at = match Duration::try_from_secs_f64(api_secs) {
                Ok(api) => need_by.checked_sub(api).unwrap_or(now).max(now),
                // Cold latency predictor: no estimate, send right away.
                Err(_) => now,
            };
            let consumed = rest[..candidate.end].chars().count();
            let offsets = base..base + consumed;
            tracing::debug!(
                text = %candidate.text,
                ?offsets,
                api_secs,
                dispatch_in_secs = dispatch_at.saturating_duration_since(now).as_secs_f64(),
                "Job planned"
            );
            jobs.push(SynthesisJob::new(
                candidate.text,
                dispatch_at.into_std(),
                offsets,
            ));

            rest = &rest[candidate.end..];
            base += consumed;
            let remaining_low = self
                .duration
                .conservative_low(rest.chars().count() as f64)
                .max(0.0);
            need_by += secs(remaining_low * self.need_by_discount);
        }

        jobs
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
