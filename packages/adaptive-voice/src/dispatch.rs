//! The dispatch loop: sends planned jobs to the engine on time.
//!
//! One loop runs per queue epoch. It sleeps until the head job's dispatch
//! time, re-checks that its epoch is still current, then moves the job into
//! the tracker and fires a detached engine call. Detached calls are never
//! cancelled: whatever happens to the loop, each one feeds both predictors
//! and reports its outcome to the tracker.

use crate::duration::DurationProbe;
use crate::engine::SynthesisEngine;
use crate::events::{EventBus, SchedulerEvent};
use crate::predictor::RegressionPredictor;
use crate::queue::QueueState;
use crate::tracker::GenerationTracker;
use adaptive_voice_domain::{GenerationId, SynthesisJob};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::Instant;

#[derive(Clone)]
pub struct Dispatcher {
    pub(crate) queue: Arc<Mutex<QueueState>>,
    pub(crate) tracker: Arc<GenerationTracker>,
    pub(crate) engine: Arc<dyn SynthesisEngine>,
    pub(crate) probe: Arc<dyn DurationProbe>,
    pub(crate) latency: Arc<RegressionPredictor>,
    pub(crate) duration: Arc<RegressionPredictor>,
    pub(crate) events: EventBus,
    pub(crate) shutdown: Arc<AtomicBool>,
}

impl Dispatcher {
    /// Drain the job list planned under `epoch`, exiting as soon as it is stale.
    pub async fn run(self, epoch: u64) {
        loop {
            let dispatch_at = {
                let queue = self.queue.lock();
                if queue.epoch() != epoch {
                    tracing::trace!(epoch, current = queue.epoch(), "Stale dispatch loop exiting");
                    return;
                }
                match queue.next_dispatch_at() {
                    Some(at) => at,
                    None => return,
                }
            };

            tokio::time::sleep_until(dispatch_at).await;
            if self.shutdown.load(Ordering::Acquire) {
                tracing::trace!(epoch, "Dispatch loop shut down");
                return;
            }

            let (id, job) = {
                let mut queue = self.queue.lock();
                if queue.epoch() != epoch {
                    tracing::trace!(epoch, current = queue.epoch(), "Stale dispatch loop exiting");
                    return;
                }
                let Some(job) = queue.pop_front() else {
                    return;
                };
                // Tracked before the queue lock drops, so a replan never
                // sees the job in neither place.
                let id = self.tracker.submit(job.text.clone(), job.offsets.clone());
                (id, job)
            };

            tracing::debug!(%id, offsets = ?job.offsets, text = %job.text, "Dispatching job");
            self.events.publish(SchedulerEvent::SynthesisStarted {
                id,
                text: job.text.clone(),
                offsets: job.offsets.clone(),
            });
            tokio::spawn(self.clone().fulfil(id, job));
        }
    }

    /// One engine call, start to finish. Runs detached from the loop.
    pub async fn fulfil(self, id: GenerationId, job: SynthesisJob) {
        let chars = job.char_count() as f64;
        let started = Instant::now();

        match self.engine.synthesize(&job.text).await {
            Ok(audio) => {
                let latency_secs = started.elapsed().as_secs_f64();

                // Decoding and sample persistence block, keep them off the workers.
                let (audio, duration_secs) = {
                    let probe = self.probe.clone();
                    let latency = self.latency.clone();
                    let duration = self.duration.clone();
                    let recorded = tokio::task::spawn_blocking(move || {
                        latency.add_sample(chars, latency_secs);
                        let duration_secs = probe.duration(&audio);
                        match duration_secs {
                            Some(seconds) => duration.add_sample(chars, seconds),
                            None => tracing::warn!(%id, "Audio duration unknown, not recorded"),
                        }
                        (audio, duration_secs)
                    })
                    .await;
                    match recorded {
                        Ok(recorded) => recorded,
                        Err(e) => {
                            tracing::error!(%id, error = %e, "Recording synthesis samples failed");
                            self.tracker.report_failure(id, e.to_string());
                            self.events.publish(SchedulerEvent::SynthesisFailed {
                                id,
                                offsets: job.offsets,
                                error: e.to_string(),
                            });
                            return;
                        }
                    }
                };

                let accepted = self
                    .tracker
                    .report_result(id, audio, duration_secs.unwrap_or(0.0));
                tracing::debug!(%id, latency_secs, ?duration_secs, accepted, "Synthesis completed");
                self.events.publish(SchedulerEvent::SynthesisCompleted {
                    id,
                    latency_secs,
                    duration_secs,
                });
            }
            Err(e) => {
                tracing::error!(%id, offsets = ?job.offsets, error = %e, "Synthesis failed");
                self.tracker.report_failure(id, e.to_string());
                self.events.publish(SchedulerEvent::SynthesisFailed {
                    id,
                    offsets: job.offsets,
                    error: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BoxFuture;
    use crate::predictor::PredictorConfig;
    use crate::sample_store::{MemorySampleStore, SampleStore};
    use adaptive_voice_domain::{Sample, VoiceError};
    use std::time::Duration;

    struct SlowEcho;

    impl SynthesisEngine for SlowEcho {
        fn synthesize<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<u8>, VoiceError>> {
            Box::pin(async move {
                if text.contains("fail") {
                    return Err(VoiceError::Synthesis("scripted failure".to_string()));
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(text.as_bytes().to_vec())
            })
        }
    }

    struct BytesAsSeconds;

    impl DurationProbe for BytesAsSeconds {
        fn duration(&self, audio: &[u8]) -> Option<f64> {
            Some(audio.len() as f64 * 0.1)
        }
    }

    fn dispatcher() -> Dispatcher {
        let store = Arc::new(MemorySampleStore::new());
        Dispatcher {
            queue: Arc::new(Mutex::new(QueueState::new())),
            tracker: Arc::new(GenerationTracker::new()),
            engine: Arc::new(SlowEcho),
            probe: Arc::new(BytesAsSeconds),
            latency: Arc::new(RegressionPredictor::new(
                PredictorConfig::api_latency(),
                "latency",
                store.clone(),
            )),
            duration: Arc::new(RegressionPredictor::new(
                PredictorConfig::audio_duration(),
                "duration",
                store,
            )),
            events: EventBus::new(64),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    fn plan(dispatcher: &Dispatcher, text: &str, jobs: Vec<SynthesisJob>) -> u64 {
        let mut queue = dispatcher.queue.lock();
        queue.append(text);
        queue.replace_plan(jobs)
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_on_schedule_and_feeds_predictors() {
        let dispatcher = dispatcher();
        let now = Instant::now();
        let epoch = plan(
            &dispatcher,
            "One. Two.",
            vec![
                SynthesisJob::new("One.", now.into_std(), 0..4),
                SynthesisJob::new("Two.", (now + Duration::from_secs(3)).into_std(), 4..9),
            ],
        );

        tokio::spawn(dispatcher.clone().run(epoch));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(dispatcher.tracker.len(), 1, "second job not due yet");

        tokio::time::sleep(Duration::from_secs(5)).await;
        let summaries = dispatcher.tracker.summaries();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.resolved));
        assert_eq!(summaries[0].duration_secs, Some(0.4));
        assert_eq!(dispatcher.latency.sample_count(), 2);
        assert_eq!(dispatcher.duration.sample_count(), 2);
        assert_eq!(dispatcher.queue.lock().base_offset(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_loop_stops_but_in_flight_calls_finish() {
        let dispatcher = dispatcher();
        let now = Instant::now();
        let epoch = plan(
            &dispatcher,
            "First. Later.",
            vec![
                SynthesisJob::new("First.", now.into_std(), 0..6),
                SynthesisJob::new("Later.", (now + Duration::from_secs(2)).into_std(), 6..13),
            ],
        );
        let mut events = dispatcher.events.subscribe();
        let handle = tokio::spawn(dispatcher.clone().run(epoch));
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Replan with nothing: the old loop must not send "Later.".
        dispatcher.queue.lock().replace_plan(Vec::new());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(handle.is_finished());

        let summaries = dispatcher.tracker.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].offsets, 0..6);
        assert!(summaries[0].resolved, "in-flight call still reported");
        assert_eq!(dispatcher.latency.sample_count(), 1);

        assert!(matches!(
            events.recv().await,
            Ok(SchedulerEvent::SynthesisStarted { .. })
        ));
        assert!(matches!(
            events.recv().await,
            Ok(SchedulerEvent::SynthesisCompleted { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn engine_failure_marks_generation_failed() {
        let dispatcher = dispatcher();
        let now = Instant::now();
        let epoch = plan(
            &dispatcher,
            "This will fail.",
            vec![SynthesisJob::new("This will fail.", now.into_std(), 0..15)],
        );
        let mut events = dispatcher.events.subscribe();
        dispatcher.clone().run(epoch).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(dispatcher.tracker.peek_readiest(), Some(true));
        let generation = dispatcher.tracker.pop_readiest().expect("tracked");
        assert!(!generation.is_ready());
        assert_eq!(dispatcher.latency.sample_count(), 0);

        let _started = events.recv().await.expect("started");
        assert!(matches!(
            events.recv().await,
            Ok(SchedulerEvent::SynthesisFailed { .. })
        ));
    }

    #[derive(Default)]
    struct ThreadRecordingStore {
        save_threads: Mutex<Vec<std::thread::ThreadId>>,
    }

    impl SampleStore for ThreadRecordingStore {
        fn save(&self, _key: &str, _samples: &[Sample]) -> Result<(), VoiceError> {
            self.save_threads.lock().push(std::thread::current().id());
            Ok(())
        }

        fn load(&self, _key: &str) -> Result<Option<Vec<Sample>>, VoiceError> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn samples_are_persisted_off_the_runtime_thread() {
        let store = Arc::new(ThreadRecordingStore::default());
        let mut dispatcher = dispatcher();
        dispatcher.latency = Arc::new(RegressionPredictor::new(
            PredictorConfig::api_latency(),
            "latency",
            store.clone(),
        ));
        dispatcher.duration = Arc::new(RegressionPredictor::new(
            PredictorConfig::audio_duration(),
            "duration",
            store.clone(),
        ));
        let now = Instant::now();
        let epoch = plan(
            &dispatcher,
            "Saved.",
            vec![SynthesisJob::new("Saved.", now.into_std(), 0..6)],
        );

        dispatcher.clone().run(epoch).await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(dispatcher.tracker.summaries()[0].duration_secs.is_some());
        let runtime_thread = std::thread::current().id();
        let threads = store.save_threads.lock();
        assert_eq!(threads.len(), 2);
        assert!(threads.iter().all(|t| *t != runtime_thread));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flag_stops_dispatch() {
        let dispatcher = dispatcher();
        let now = Instant::now();
        let epoch = plan(
            &dispatcher,
            "Later.",
            vec![SynthesisJob::new("Later.", (now + Duration::from_secs(1)).into_std(), 0..6)],
        );
        let handle = tokio::spawn(dispatcher.clone().run(epoch));
        dispatcher.shutdown.store(true, Ordering::Release);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.is_finished());
        assert!(dispatcher.tracker.is_empty());
    }
}
