//! Dispatched generations in playback order.
//!
//! The tracker is the only place synthesis results meet playback. Dispatch
//! submits a pending generation before calling the engine, the detached
//! engine call resolves it, and the playback driver pops strictly from the
//! lowest offset. All mutations go through one lock; `new_data` wakes the
//! playback driver whenever a generation resolves.

use adaptive_voice_domain::{Generation, GenerationId, GenerationOutcome, OffsetRange};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

/// What the exhaustion estimate needs to know about a tracked generation.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedSummary {
    pub id: GenerationId,
    pub chars: usize,
    pub offsets: OffsetRange,
    /// Known audio duration once ready.
    pub duration_secs: Option<f64>,
    pub resolved: bool,
}

#[derive(Debug, Default)]
pub struct GenerationTracker {
    inner: Mutex<TrackerInner>,
    next_id: AtomicU64,
    new_data: Notify,
}

#[derive(Debug, Default)]
struct TrackerInner {
    /// Keyed by (lower bound, id); ties on lower bound are broken at read time.
    by_offset: BTreeMap<(usize, GenerationId), Generation>,
    lower_bound_of: HashMap<GenerationId, usize>,
}

impl TrackerInner {
    /// Key of the generation playback should take next.
    fn readiest_key(&self) -> Option<(usize, GenerationId)> {
        let (&(lowest, _), _) = self.by_offset.first_key_value()?;
        self.by_offset
            .range((lowest, GenerationId(0))..=(lowest, GenerationId(u64::MAX)))
            .min_by(|(_, a), (_, b)| a.playback_order(b))
            .map(|(key, _)| *key)
    }

    fn get_mut(&mut self, id: GenerationId) -> Option<&mut Generation> {
        let lower = *self.lower_bound_of.get(&id)?;
        self.by_offset.get_mut(&(lower, id))
    }
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly dispatched job as pending.
    pub fn submit(&self, text: impl Into<String>, offsets: OffsetRange) -> GenerationId {
        let id = GenerationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let generation = Generation::pending(id, text, offsets.clone());

        let mut inner = self.inner.lock();
        inner.lower_bound_of.insert(id, offsets.start);
        inner.by_offset.insert((offsets.start, id), generation);
        tracing::trace!(%id, ?offsets, "Generation submitted");
        id
    }

    /// Attach audio to a pending generation and wake playback.
    ///
    /// Returns `false`, changing nothing, when `id` is unknown (superseded or
    /// cleared) or already resolved.
    pub fn report_result(&self, id: GenerationId, audio: Vec<u8>, duration_secs: f64) -> bool {
        self.resolve(
            id,
            GenerationOutcome::Ready {
                audio,
                duration_secs,
            },
        )
    }

    /// Mark a pending generation failed so playback skips its range.
    pub fn report_failure(&self, id: GenerationId, reason: impl Into<String>) -> bool {
        self.resolve(
            id,
            GenerationOutcome::Failed {
                reason: reason.into(),
            },
        )
    }

    fn resolve(&self, id: GenerationId, outcome: GenerationOutcome) -> bool {
        {
            let mut inner = self.inner.lock();
            let Some(generation) = inner.get_mut(id) else {
                tracing::trace!(%id, "Result for untracked generation dropped");
                return false;
            };
            if generation.is_resolved() {
                tracing::debug!(%id, "Generation already resolved, ignoring report");
                return false;
            }
            generation.outcome = outcome;
        }
        self.new_data.notify_waiters();
        true
    }

    /// Has the next generation in playback order resolved? `None` when empty.
    pub fn peek_readiest(&self) -> Option<bool> {
        let inner = self.inner.lock();
        let key = inner.readiest_key()?;
        inner.by_offset.get(&key).map(Generation::is_resolved)
    }

    /// Remove and return the next generation in playback order, resolved or not.
    pub fn pop_readiest(&self) -> Option<Generation> {
        let mut inner = self.inner.lock();
        let key = inner.readiest_key()?;
        inner.lower_bound_of.remove(&key.1);
        inner.by_offset.remove(&key)
    }

    /// Drop every generation starting before `offset`.
    pub fn seek_to(&self, offset: usize) {
        let mut inner = self.inner.lock();
        let kept = inner.by_offset.split_off(&(offset, GenerationId(0)));
        let stale = std::mem::replace(&mut inner.by_offset, kept);
        for (_, id) in stale.keys() {
            inner.lower_bound_of.remove(id);
        }
        if !stale.is_empty() {
            tracing::debug!(offset, dropped = stale.len(), "Seeked past stale generations");
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_offset.clear();
        inner.lower_bound_of.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().by_offset.is_empty()
    }

    /// Everything still tracked, in offset order, without the audio payloads.
    pub fn summaries(&self) -> Vec<TrackedSummary> {
        self.inner
            .lock()
            .by_offset
            .values()
            .map(|g| TrackedSummary {
                id: g.id,
                chars: g.char_count(),
                offsets: g.offsets.clone(),
                duration_secs: g.duration_secs(),
                resolved: g.is_resolved(),
            })
            .collect()
    }

    /// Signal raised after every successful `report_*`.
    pub fn new_data(&self) -> &Notify {
        &self.new_data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn pops_in_offset_order_regardless_of_insertion_or_completion() {
        let tracker = GenerationTracker::new();
        let b = tracker.submit("bbbbbbbbbb", 10..20);
        let a = tracker.submit("aaaaaaaaaa", 0..10);
        let c = tracker.submit("cccccccccc", 20..30);

        assert!(tracker.report_result(c, vec![3], 1.0));
        assert!(tracker.report_result(a, vec![1], 1.0));
        assert!(tracker.report_result(b, vec![2], 1.0));

        let order: Vec<OffsetRange> = std::iter::from_fn(|| tracker.pop_readiest())
            .map(|g| g.offsets)
            .collect();
        assert_eq!(order, vec![0..10, 10..20, 20..30]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn peek_reflects_lowest_offset_only() {
        let tracker = GenerationTracker::new();
        assert_eq!(tracker.peek_readiest(), None);

        let first = tracker.submit("first", 0..5);
        let second = tracker.submit("second", 5..11);
        tracker.report_result(second, vec![0], 0.5);
        assert_eq!(tracker.peek_readiest(), Some(false));

        tracker.report_result(first, vec![0], 0.5);
        assert_eq!(tracker.peek_readiest(), Some(true));
    }

    #[test]
    fn equal_offsets_prefer_ready_then_longer() {
        let tracker = GenerationTracker::new();
        let long_pending = tracker.submit("A longer sentence.", 0..18);
        let short_ready = tracker.submit("A.", 0..2);
        tracker.report_result(short_ready, vec![1], 0.2);

        assert_eq!(tracker.pop_readiest().map(|g| g.id), Some(short_ready));
        assert_eq!(tracker.pop_readiest().map(|g| g.id), Some(long_pending));

        let short = tracker.submit("Hi.", 30..33);
        let long = tracker.submit("Hi. There.", 30..40);
        assert_eq!(tracker.pop_readiest().map(|g| g.id), Some(long));
        assert_eq!(tracker.pop_readiest().map(|g| g.id), Some(short));
    }

    #[test]
    fn second_report_is_rejected_and_changes_nothing() {
        let tracker = GenerationTracker::new();
        let id = tracker.submit("hello", 0..5);
        assert!(tracker.report_result(id, vec![9, 9], 1.5));
        let before = tracker.summaries();

        assert!(!tracker.report_result(id, vec![9, 9], 1.5));
        assert!(!tracker.report_failure(id, "late failure"));
        assert_eq!(tracker.summaries(), before);

        let popped = tracker.pop_readiest().expect("tracked");
        assert_eq!(popped.audio(), Some(&[9u8, 9][..]));
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let tracker = GenerationTracker::new();
        let id = tracker.submit("gone", 0..4);
        tracker.clear();
        assert!(!tracker.report_result(id, vec![1], 1.0));
        assert!(tracker.is_empty());
    }

    #[test]
    fn seek_discards_generations_before_offset() {
        let tracker = GenerationTracker::new();
        let stale = tracker.submit("old", 0..3);
        tracker.submit("older tail", 3..13);
        tracker.submit("fresh", 13..18);

        tracker.seek_to(13);
        let remaining: Vec<usize> = tracker.summaries().iter().map(|s| s.offsets.start).collect();
        assert_eq!(remaining, vec![13]);
        assert!(!tracker.report_result(stale, vec![1], 1.0));
    }

    #[test]
    fn failures_count_as_resolved() {
        let tracker = GenerationTracker::new();
        let id = tracker.submit("doomed", 0..6);
        assert!(tracker.report_failure(id, "503"));
        assert_eq!(tracker.peek_readiest(), Some(true));
        let popped = tracker.pop_readiest().expect("tracked");
        assert!(matches!(popped.outcome, GenerationOutcome::Failed { .. }));
        assert!(!popped.is_ready());
    }

    #[tokio::test]
    async fn result_wakes_waiters() {
        let tracker = Arc::new(GenerationTracker::new());
        let id = tracker.submit("ping", 0..4);

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                tracker.new_data().notified().await;
                tracker.peek_readiest()
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        tracker.report_result(id, vec![1], 0.1);

        let seen = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("woken")
            .expect("join");
        assert_eq!(seen, Some(true));
    }

    #[test]
    fn concurrent_submits_and_reports_serialize() {
        let tracker = Arc::new(GenerationTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let start = (t * 50 + i) * 10;
                        let id = tracker.submit("0123456789", start..start + 10);
                        tracker.report_result(id, vec![t as u8], 1.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }

        assert_eq!(tracker.len(), 400);
        let mut last = None;
        while let Some(g) = tracker.pop_readiest() {
            assert!(g.is_ready());
            if let Some(prev) = last {
                assert!(g.offsets.start > prev);
            }
            last = Some(g.offsets.start);
        }
    }
}
