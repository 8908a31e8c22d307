#![allow(dead_code)]

use adaptive_voice::config::{DURATION_STORAGE_KEY, LATENCY_STORAGE_KEY};
use adaptive_voice::prelude::*;
use adaptive_voice::{BoxFuture, Sample};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Seconds of engine latency per character.
pub const LATENCY_PER_CHAR: f64 = 0.05;
/// Seconds of audio per character.
pub const DURATION_PER_CHAR: f64 = 0.1;

/// Echoes the text back as "audio" after `LATENCY_PER_CHAR` per character.
/// Text containing `fail_marker` fails instead.
#[derive(Default)]
pub struct ScriptedEngine {
    pub calls: Mutex<Vec<String>>,
    pub fail_marker: Option<&'static str>,
}

impl ScriptedEngine {
    pub fn failing_on(marker: &'static str) -> Self {
        Self {
            fail_marker: Some(marker),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl SynthesisEngine for ScriptedEngine {
    fn synthesize<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<u8>, VoiceError>> {
        self.calls.lock().push(text.to_string());
        Box::pin(async move {
            let latency = text.chars().count() as f64 * LATENCY_PER_CHAR;
            tokio::time::sleep(Duration::from_secs_f64(latency)).await;
            match self.fail_marker {
                Some(marker) if text.contains(marker) => {
                    Err(VoiceError::Synthesis(format!("scripted failure for {text:?}")))
                }
                _ => Ok(text.as_bytes().to_vec()),
            }
        })
    }
}

/// Reads the echoed text back and charges `DURATION_PER_CHAR` per character.
pub struct TextLengthProbe;

impl DurationProbe for TextLengthProbe {
    fn duration(&self, audio: &[u8]) -> Option<f64> {
        let text = std::str::from_utf8(audio).ok()?;
        Some(text.chars().count() as f64 * DURATION_PER_CHAR)
    }
}

/// Records what was played and when.
#[derive(Default)]
pub struct RecordingOutput {
    pub plays: Mutex<Vec<(Instant, String)>>,
    pub stops: Mutex<usize>,
}

impl RecordingOutput {
    pub fn played_texts(&self) -> Vec<String> {
        self.plays.lock().iter().map(|(_, text)| text.clone()).collect()
    }

    pub fn play_times(&self) -> Vec<Instant> {
        self.plays.lock().iter().map(|(at, _)| *at).collect()
    }
}

impl AudioOutput for RecordingOutput {
    fn prepare(&self) -> Result<(), VoiceError> {
        Ok(())
    }

    fn play(&self, audio: &[u8]) -> Result<(), VoiceError> {
        let text = String::from_utf8_lossy(audio).into_owned();
        self.plays.lock().push((Instant::now(), text));
        Ok(())
    }

    fn stop(&self) {
        *self.stops.lock() += 1;
    }
}

/// A store holding 20 samples of each linear relationship, enough for both
/// predictors to be reliable.
pub fn warm_store() -> Arc<MemorySampleStore> {
    let line = |per_char: f64| -> Vec<Sample> {
        (1..=20)
            .map(|i| {
                let chars = (i * 10) as f64;
                Sample::new(chars, chars * per_char)
            })
            .collect()
    };
    let store = MemorySampleStore::new();
    store.insert(LATENCY_STORAGE_KEY, line(LATENCY_PER_CHAR));
    store.insert(DURATION_STORAGE_KEY, line(DURATION_PER_CHAR));
    Arc::new(store)
}

pub struct Harness {
    pub tts: AdaptiveQueueTts,
    pub engine: Arc<ScriptedEngine>,
    pub output: Arc<RecordingOutput>,
}

pub fn harness(engine: ScriptedEngine, store: Arc<dyn SampleStore>) -> Harness {
    let engine = Arc::new(engine);
    let output = Arc::new(RecordingOutput::default());
    let tts = AdaptiveQueueTts::builder(engine.clone(), output.clone())
        .probe(Arc::new(TextLengthProbe))
        .store(store)
        .build()
        .expect("valid default config");
    Harness {
        tts,
        engine,
        output,
    }
}
