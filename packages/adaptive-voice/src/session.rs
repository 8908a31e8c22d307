//! The session facade upstream text sources talk to.

use crate::config::SchedulerConfig;
use crate::dispatch::Dispatcher;
use crate::duration::DurationProbe;
use crate::engine::SynthesisEngine;
use crate::events::{EventBus, SchedulerEvent};
use crate::playback::{AudioOutput, PlaybackDriver};
use crate::predictor::RegressionPredictor;
use crate::queue::{QueuePlanner, QueueState};
use crate::sample_store::{MemorySampleStore, SampleStore};
use crate::segmentation::{Segmenter, Trailing};
use crate::tracker::GenerationTracker;
use adaptive_voice_domain::{PlaybackState, VoiceError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Streams text into speech with as little silence as the predictors allow.
///
/// Text arrives in arbitrary fragments through [`speak`](Self::speak). Every
/// call replans the undispatched text: the longest sentence or paragraph
/// units that can still come back from the engine before playback runs dry
/// are scheduled for dispatch, the rest waits for more context.
pub struct AdaptiveQueueTts {
    dispatcher: Dispatcher,
    planner: QueuePlanner,
    playback: PlaybackDriver,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

pub struct AdaptiveQueueTtsBuilder {
    engine: Arc<dyn SynthesisEngine>,
    output: Arc<dyn AudioOutput>,
    probe: Option<Arc<dyn DurationProbe>>,
    store: Option<Arc<dyn SampleStore>>,
    config: SchedulerConfig,
}

impl AdaptiveQueueTtsBuilder {
    /// Defaults to [`SymphoniaDurationProbe`](crate::duration::SymphoniaDurationProbe).
    pub fn probe(mut self, probe: Arc<dyn DurationProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Where predictor history lives. Defaults to memory only.
    pub fn store(mut self, store: Arc<dyn SampleStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<AdaptiveQueueTts, VoiceError> {
        let config = self.config;
        config.validate()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemorySampleStore::new()));
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(crate::duration::SymphoniaDurationProbe::new()));

        let latency = Arc::new(RegressionPredictor::new(
            config.latency.clone(),
            config.latency_storage_key.clone(),
            store.clone(),
        ));
        let duration = Arc::new(RegressionPredictor::new(
            config.duration.clone(),
            config.duration_storage_key.clone(),
            store,
        ));

        let events = EventBus::new(config.event_capacity);
        let tracker = Arc::new(GenerationTracker::new());
        let playback = PlaybackDriver::new(tracker.clone(), self.output, events.clone());
        let planner = QueuePlanner::new(
            latency.clone(),
            duration.clone(),
            Segmenter::new(config.sentence_fallback_for_single_paragraph),
            config.need_by_discount,
        );

        Ok(AdaptiveQueueTts {
            dispatcher: Dispatcher {
                queue: Arc::new(Mutex::new(QueueState::new())),
                tracker,
                engine: self.engine,
                probe,
                latency,
                duration,
                events,
                shutdown: Arc::new(AtomicBool::new(false)),
            },
            planner,
            playback,
            dispatch_task: Mutex::new(None),
        })
    }
}

impl AdaptiveQueueTts {
    pub fn builder(
        engine: Arc<dyn SynthesisEngine>,
        output: Arc<dyn AudioOutput>,
    ) -> AdaptiveQueueTtsBuilder {
        AdaptiveQueueTtsBuilder {
            engine,
            output,
            probe: None,
            store: None,
            config: SchedulerConfig::default(),
        }
    }

    /// Take the output device and start playback from a clean state.
    pub async fn prepare(&self) -> Result<(), VoiceError> {
        self.playback.stop();
        self.playback.prepare_output()?;
        self.playback.start_playback()
    }

    /// Append `text` and replan.
    ///
    /// With `wait_until_output`, resolves once everything this call planned
    /// has played (immediately if nothing was plannable).
    pub async fn speak(&self, text: &str, wait_until_output: bool) {
        let target = self.replan(text, Trailing::AwaitTerminator);
        if let Some(offset) = target.filter(|_| wait_until_output) {
            self.playback.wait_until_played(offset).await;
        }
    }

    /// End of message: the trailing fragment is spoken as its own sentence
    /// even without a terminator, and later text never joins it.
    ///
    /// With `wait_until_output`, resolves once everything accepted so far has
    /// played.
    pub async fn flush(&self, wait_until_output: bool) {
        if let Some(end) = self.dispatcher.queue.lock().end_message() {
            tracing::debug!(end, "Message ended");
        }
        let planned = self.replan("", Trailing::Complete);
        if wait_until_output {
            let target = planned.unwrap_or_else(|| self.dispatcher.queue.lock().base_offset());
            self.playback.wait_until_played(target).await;
        }
    }

    /// Drop all pending text, silence the output and forget tracked audio.
    ///
    /// Engine calls already in flight still complete and train the
    /// predictors. Call [`prepare`](Self::prepare) before speaking again.
    pub async fn stop(&self) {
        {
            let mut queue = self.dispatcher.queue.lock();
            let epoch = queue.reset();
            tracing::debug!(epoch, "Queue reset");
        }
        if let Some(task) = self.dispatch_task.lock().take() {
            task.abort();
        }
        self.playback.stop();
        self.dispatcher.tracker.clear();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.dispatcher.events.subscribe()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn estimated_exhaustion_time(&self) -> Instant {
        self.playback.estimated_exhaustion_time(Instant::now())
    }

    pub fn latency_predictor(&self) -> &RegressionPredictor {
        &self.dispatcher.latency
    }

    pub fn duration_predictor(&self) -> &RegressionPredictor {
        &self.dispatcher.duration
    }

    pub fn tracker(&self) -> &GenerationTracker {
        &self.dispatcher.tracker
    }

    /// Text accepted but not yet dispatched.
    pub fn pending_text(&self) -> String {
        self.dispatcher.queue.lock().text().to_string()
    }

    /// Returns the upper offset of the new plan, if anything was planned.
    fn replan(&self, text: &str, trailing: Trailing) -> Option<usize> {
        let (epoch, planned) = {
            let mut queue = self.dispatcher.queue.lock();
            queue.append(text);

            let now = Instant::now();
            let exhaustion = self.playback.estimated_exhaustion_time(now);
            let need_by = self
                .planner
                .need_by_time(exhaustion, &self.dispatcher.tracker.summaries());
            let jobs = self.planner.build_queue(
                queue.text(),
                queue.base_offset(),
                queue.message_ends(),
                need_by,
                now,
                trailing,
            );
            let planned = jobs
                .first()
                .zip(jobs.last())
                .map(|(first, last)| first.offsets.start..last.offsets.end);
            let count = jobs.len();
            let epoch = queue.replace_plan(jobs);
            self.dispatcher.events.publish(SchedulerEvent::JobsPlanned {
                epoch,
                jobs: count,
                offsets: planned.clone(),
            });
            (epoch, planned)
        };

        let task = tokio::spawn(self.dispatcher.clone().run(epoch));
        if let Some(previous) = self.dispatch_task.lock().replace(task) {
            previous.abort();
        }
        planned.map(|offsets| offsets.end)
    }
}

impl Drop for AdaptiveQueueTts {
    fn drop(&mut self) {
        self.dispatcher.shutdown.store(true, Ordering::Release);
        if let Some(task) = self.dispatch_task.lock().take() {
            task.abort();
        }
        self.playback.stop();
    }
}
