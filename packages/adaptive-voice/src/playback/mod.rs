//! Playback driver: the only writer to the audio output.
//!
//! ```text
//! stopped --start_playback--> searching
//! searching --ready generation--> playing --duration elapsed--> searching
//! searching --nothing ready--> waiting_for_data --new data--> searching
//! any --stop--> stopped
//! ```
//!
//! Each `start_playback` spawns one play loop tagged with a run id. `stop`
//! bumps the run id; a loop that wakes up under a stale id exits without
//! touching anything.

pub mod output;

pub use output::AudioOutput;
#[cfg(feature = "rodio-output")]
pub use output::RodioOutput;

use crate::events::{EventBus, SchedulerEvent};
use crate::tracker::GenerationTracker;
use adaptive_voice_domain::{GenerationId, GenerationOutcome, OffsetRange, PlaybackState, VoiceError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// The clip on the output right now.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub id: GenerationId,
    pub offsets: OffsetRange,
    pub started_at: Instant,
    pub duration: Duration,
}

impl NowPlaying {
    pub fn ends_at(&self) -> Instant {
        self.started_at + self.duration
    }
}

/// How far playback has got within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub run: u64,
    /// Every offset below this has finished playing or was skipped.
    pub played_through: usize,
}

#[derive(Clone)]
pub struct PlaybackDriver {
    shared: Arc<Shared>,
}

struct Shared {
    tracker: Arc<GenerationTracker>,
    output: Arc<dyn AudioOutput>,
    events: EventBus,
    state: Mutex<DriverState>,
    progress: watch::Sender<Progress>,
}

#[derive(Default)]
struct DriverState {
    state: PlaybackState,
    current: Option<NowPlaying>,
    next_offset: Option<usize>,
    run: u64,
}

enum Step {
    Play(Instant),
    Wait,
    Exit,
}

impl PlaybackDriver {
    pub fn new(
        tracker: Arc<GenerationTracker>,
        output: Arc<dyn AudioOutput>,
        events: EventBus,
    ) -> Self {
        let (progress, _) = watch::channel(Progress::default());
        Self {
            shared: Arc::new(Shared {
                tracker,
                output,
                events,
                state: Mutex::new(DriverState::default()),
                progress,
            }),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state.lock().state
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.shared.state.lock().current.clone()
    }

    /// Upper bound of the last generation taken off the tracker.
    pub fn next_offset(&self) -> Option<usize> {
        self.shared.state.lock().next_offset
    }

    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.shared.progress.subscribe()
    }

    pub fn prepare_output(&self) -> Result<(), VoiceError> {
        self.shared.output.prepare()
    }

    /// When the known audio runs out: the end of the current clip, or `now`
    /// when nothing is playing.
    pub fn estimated_exhaustion_time(&self, now: Instant) -> Instant {
        self.shared
            .state
            .lock()
            .current
            .as_ref()
            .map_or(now, |playing| playing.ends_at().max(now))
    }

    /// Leave `stopped` and start consuming the tracker.
    ///
    /// Fails without side effects unless the driver is stopped.
    pub fn start_playback(&self) -> Result<(), VoiceError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            VoiceError::Configuration(format!("Playback needs a tokio runtime: {}", e))
        })?;

        let run = {
            let mut st = self.shared.state.lock();
            if st.state != PlaybackState::Stopped {
                return Err(VoiceError::PlaybackAlreadyActive { state: st.state });
            }
            st.run += 1;
            st.state = PlaybackState::Searching;
            st.current = None;
            st.next_offset = None;
            st.run
        };
        self.shared.progress.send_replace(Progress {
            run,
            played_through: 0,
        });

        tracing::debug!(run, "Playback started");
        runtime.spawn(Shared::play_loop(self.shared.clone(), run));
        Ok(())
    }

    /// Silence the output now and return to `stopped`. In-flight synthesis is
    /// unaffected.
    pub fn stop(&self) {
        let run = {
            let mut st = self.shared.state.lock();
            st.run += 1;
            st.state = PlaybackState::Stopped;
            st.current = None;
            st.next_offset = None;
            self.shared.output.stop();
            st.run
        };
        self.shared.progress.send_replace(Progress {
            run,
            played_through: 0,
        });
        // Wake a loop parked on new data so it sees the stale run and exits.
        self.shared.tracker.new_data().notify_waiters();
        tracing::debug!("Playback stopped");
    }

    /// Resolve once everything below `offset` has played, or the current run
    /// ends. Returns immediately when stopped.
    pub async fn wait_until_played(&self, offset: usize) {
        let mut progress = self.progress();
        let run = {
            if self.state() == PlaybackState::Stopped {
                return;
            }
            progress.borrow_and_update().run
        };
        loop {
            {
                let current = progress.borrow_and_update();
                if current.run != run || current.played_through >= offset {
                    return;
                }
            }
            if progress.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Shared {
    async fn play_loop(self: Arc<Self>, run: u64) {
        loop {
            let notified = self.tracker.new_data().notified();
            tokio::pin!(notified);
            // Register before looking so a result landing in between is not lost.
            notified.as_mut().enable();

            match self.search(run) {
                Step::Exit => break,
                Step::Wait => notified.await,
                Step::Play(until) => {
                    tokio::time::sleep_until(until).await;
                    if !self.finish_current(run) {
                        break;
                    }
                }
            }
        }
        tracing::trace!(run, "Play loop exited");
    }

    /// One pass of the `searching` state.
    fn search(&self, run: u64) -> Step {
        let mut st = self.state.lock();
        if st.run != run {
            return Step::Exit;
        }
        st.state = PlaybackState::Searching;

        loop {
            if let Some(offset) = st.next_offset {
                self.tracker.seek_to(offset);
            }
            if self.tracker.peek_readiest() != Some(true) {
                return self.wait_for_data(&mut st);
            }
            let Some(generation) = self.tracker.pop_readiest() else {
                return self.wait_for_data(&mut st);
            };

            let id = generation.id;
            let offsets = generation.offsets.clone();
            match generation.outcome {
                GenerationOutcome::Ready {
                    audio,
                    duration_secs,
                } => {
                    st.next_offset = Some(offsets.end);
                    if let Err(e) = self.output.play(&audio) {
                        tracing::warn!(%id, ?offsets, error = %e, "Output rejected audio, skipping");
                        self.skip(id, offsets, e.to_string());
                        continue;
                    }

                    let duration = Duration::try_from_secs_f64(duration_secs.max(0.0))
                        .unwrap_or(Duration::ZERO);
                    let playing = NowPlaying {
                        id,
                        offsets: offsets.clone(),
                        started_at: Instant::now(),
                        duration,
                    };
                    let until = playing.ends_at();
                    st.current = Some(playing);
                    st.state = PlaybackState::Playing;
                    tracing::debug!(%id, ?offsets, duration_secs, "Playing generation");
                    self.events.publish(SchedulerEvent::PlaybackStarted {
                        id,
                        offsets,
                        duration_secs,
                    });
                    return Step::Play(until);
                }
                GenerationOutcome::Failed { reason } => {
                    st.next_offset = Some(offsets.end);
                    tracing::debug!(%id, ?offsets, %reason, "Skipping failed generation");
                    self.skip(id, offsets, reason);
                }
                GenerationOutcome::Pending => {
                    tracing::error!(%id, ?offsets, "Popped a generation without audio");
                    return self.wait_for_data(&mut st);
                }
            }
        }
    }

    fn wait_for_data(&self, st: &mut DriverState) -> Step {
        st.state = PlaybackState::WaitingForData;
        st.current = None;
        self.events.publish(SchedulerEvent::PlaybackWaiting {
            next_offset: st.next_offset,
        });
        Step::Wait
    }

    fn skip(&self, id: GenerationId, offsets: OffsetRange, reason: String) {
        self.advance_progress(offsets.end);
        self.events
            .publish(SchedulerEvent::PlaybackSkipped { id, offsets, reason });
    }

    /// The current clip ran its course. `false` when the run went stale meanwhile.
    fn finish_current(&self, run: u64) -> bool {
        let mut st = self.state.lock();
        if st.run != run {
            return false;
        }
        if let Some(done) = st.current.take() {
            self.advance_progress(done.offsets.end);
        }
        true
    }

    fn advance_progress(&self, offset: usize) {
        self.progress.send_if_modified(|progress| {
            if offset > progress.played_through {
                progress.played_through = offset;
                true
            } else {
                false
            }
        });
    }
}
