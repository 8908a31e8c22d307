//! The audio sink the playback driver writes to.

use adaptive_voice_domain::VoiceError;

/// Exclusive audio output owned by the playback driver.
///
/// `play` must return without waiting for the audio to finish; the driver
/// times items itself. `stop` silences whatever is playing immediately.
pub trait AudioOutput: Send + Sync {
    /// Acquire the device ahead of the first `play`.
    fn prepare(&self) -> Result<(), VoiceError>;

    fn play(&self, audio: &[u8]) -> Result<(), VoiceError>;

    fn stop(&self);
}

#[cfg(feature = "rodio-output")]
pub use self::rodio_output::RodioOutput;

#[cfg(feature = "rodio-output")]
mod rodio_output {
    use super::AudioOutput;
    use adaptive_voice_domain::VoiceError;
    use crossbeam_channel::{Receiver, Sender};
    use parking_lot::Mutex;
    use std::io::Cursor;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    type EncodedDecoder = rodio::Decoder<Cursor<Vec<u8>>>;

    enum OutputCommand {
        Play(EncodedDecoder),
        Stop,
        Shutdown,
    }

    struct Worker {
        commands: Sender<OutputCommand>,
        thread_handle: Option<JoinHandle<()>>,
    }

    /// Default output device through rodio.
    ///
    /// The rodio output stream is not `Send`, so it lives on a dedicated
    /// thread that takes commands over a crossbeam channel. Clips are decoded
    /// on the caller's thread so a bad payload fails `play` directly.
    #[derive(Default)]
    pub struct RodioOutput {
        worker: Mutex<Option<Worker>>,
    }

    impl RodioOutput {
        pub fn new() -> Self {
            Self::default()
        }

        fn ensure_worker(&self) -> Result<(), VoiceError> {
            let mut worker = self.worker.lock();
            if worker.is_some() {
                return Ok(());
            }

            let (commands, receiver) = crossbeam_channel::unbounded();
            let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
            let thread_handle = thread::Builder::new()
                .name("adaptive-voice-output".to_string())
                .spawn(move || run_output_thread(receiver, ready_tx))
                .map_err(|e| {
                    VoiceError::AudioOutput(format!("Failed to spawn output thread: {}", e))
                })?;

            match ready_rx.recv_timeout(Duration::from_secs(5)) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let _ = thread_handle.join();
                    return Err(e);
                }
                Err(e) => {
                    return Err(VoiceError::AudioOutput(format!(
                        "Output device did not come up: {}",
                        e
                    )));
                }
            }

            *worker = Some(Worker {
                commands,
                thread_handle: Some(thread_handle),
            });
            Ok(())
        }

        fn send(&self, command: OutputCommand) -> Result<(), VoiceError> {
            let worker = self.worker.lock();
            let worker = worker
                .as_ref()
                .ok_or_else(|| VoiceError::AudioOutput("Output not prepared".to_string()))?;
            worker
                .commands
                .send(command)
                .map_err(|_| VoiceError::AudioOutput("Output thread has exited".to_string()))
        }
    }

    fn run_output_thread(
        commands: Receiver<OutputCommand>,
        ready: Sender<Result<(), VoiceError>>,
    ) {
        use rodio::{OutputStreamBuilder, Sink};

        let stream = match OutputStreamBuilder::open_default_stream() {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready.send(Err(VoiceError::AudioOutput(format!(
                    "Audio device initialization failed: {}",
                    e
                ))));
                return;
            }
        };
        let mut sink = Sink::connect_new(stream.mixer());
        let _ = ready.send(Ok(()));

        for command in commands.iter() {
            match command {
                OutputCommand::Play(decoder) => sink.append(decoder),
                OutputCommand::Stop => {
                    sink.stop();
                    sink = Sink::connect_new(stream.mixer());
                }
                OutputCommand::Shutdown => break,
            }
        }
        tracing::debug!("Audio output thread exiting");
    }

    impl AudioOutput for RodioOutput {
        fn prepare(&self) -> Result<(), VoiceError> {
            self.ensure_worker()
        }

        fn play(&self, audio: &[u8]) -> Result<(), VoiceError> {
            let decoder = rodio::Decoder::new(Cursor::new(audio.to_vec()))
                .map_err(|e| VoiceError::AudioDecode(format!("Unplayable audio: {}", e)))?;
            self.ensure_worker()?;
            self.send(OutputCommand::Play(decoder))
        }

        fn stop(&self) {
            if let Err(e) = self.send(OutputCommand::Stop) {
                tracing::trace!(error = %e, "Stop on idle output");
            }
        }
    }

    impl Drop for RodioOutput {
        fn drop(&mut self) {
            if let Some(mut worker) = self.worker.lock().take() {
                let _ = worker.commands.send(OutputCommand::Shutdown);
                if let Some(handle) = worker.thread_handle.take() {
                    let _ = handle.join();
                }
            }
        }
    }
}
