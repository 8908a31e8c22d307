//! Scheduler events for callers that want to observe the session.

use adaptive_voice_domain::{GenerationId, OffsetRange};
use tokio::sync::broadcast;

/// Kinds of events, for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    JobsPlanned,
    SynthesisStarted,
    SynthesisCompleted,
    SynthesisFailed,
    PlaybackStarted,
    PlaybackSkipped,
    PlaybackWaiting,
}

/// Something the scheduler did.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// A replan replaced the pending job list.
    JobsPlanned {
        epoch: u64,
        jobs: usize,
        offsets: Option<OffsetRange>,
    },
    SynthesisStarted {
        id: GenerationId,
        text: String,
        offsets: OffsetRange,
    },
    SynthesisCompleted {
        id: GenerationId,
        latency_secs: f64,
        duration_secs: Option<f64>,
    },
    /// The engine call failed; playback will skip `offsets`.
    SynthesisFailed {
        id: GenerationId,
        offsets: OffsetRange,
        error: String,
    },
    PlaybackStarted {
        id: GenerationId,
        offsets: OffsetRange,
        duration_secs: f64,
    },
    PlaybackSkipped {
        id: GenerationId,
        offsets: OffsetRange,
        reason: String,
    },
    /// Nothing ready to play; waiting for the next result.
    PlaybackWaiting { next_offset: Option<usize> },
}

impl SchedulerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SchedulerEvent::JobsPlanned { .. } => EventKind::JobsPlanned,
            SchedulerEvent::SynthesisStarted { .. } => EventKind::SynthesisStarted,
            SchedulerEvent::SynthesisCompleted { .. } => EventKind::SynthesisCompleted,
            SchedulerEvent::SynthesisFailed { .. } => EventKind::SynthesisFailed,
            SchedulerEvent::PlaybackStarted { .. } => EventKind::PlaybackStarted,
            SchedulerEvent::PlaybackSkipped { .. } => EventKind::PlaybackSkipped,
            SchedulerEvent::PlaybackWaiting { .. } => EventKind::PlaybackWaiting,
        }
    }
}

/// Fan-out of [`SchedulerEvent`]s. Publishing never blocks; slow
/// subscribers see `Lagged` instead of holding the scheduler up.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SchedulerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: SchedulerEvent) {
        tracing::trace!(kind = ?event.kind(), "Scheduler event");
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Next event for a long-lived subscriber, skipping past any it fell behind
/// on. `None` once the bus is gone.
pub async fn next_event(
    receiver: &mut broadcast::Receiver<SchedulerEvent>,
) -> Option<SchedulerEvent> {
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event subscriber lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
