//! Adaptive Speak CLI Binary
//! Speaks stdin as if it were streamed from a language model.

use adaptive_voice::prelude::*;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Stream text from stdin into adaptive-queue speech synthesis
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scheduler configuration (JSON); defaults apply to missing fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory where predictor history is kept between runs
    #[arg(short, long)]
    store_dir: Option<PathBuf>,

    /// Voice name passed to the speech endpoint
    #[arg(long)]
    voice: Option<String>,

    /// Speech model
    #[arg(long)]
    model: Option<String>,

    /// Speaking rate, 0.25 to 4.0
    #[arg(long)]
    speed: Option<f32>,

    /// Delay between streamed words, simulating token arrival
    #[arg(long, default_value_t = 40)]
    token_delay_ms: u64,
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new("info"))
                .context("Failed to build log filter")?,
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .context("Failed to install tracing subscriber")
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SchedulerConfig::from_json_file(path)?,
        None => SchedulerConfig::default(),
    };

    let mut speech = OpenAiSpeechConfig::default();
    if let Some(voice) = cli.voice {
        speech.voice = voice;
    }
    if let Some(model) = cli.model {
        speech.model = model;
    }
    if let Some(speed) = cli.speed {
        speech.speed = speed;
    }
    let engine = Arc::new(OpenAiSpeechEngine::from_env(speech)?);

    let store: Arc<dyn SampleStore> = match &cli.store_dir {
        Some(dir) => Arc::new(JsonFileSampleStore::open(dir)?),
        None => Arc::new(MemorySampleStore::new()),
    };

    let tts = AdaptiveQueueTts::builder(engine, Arc::new(RodioOutput::new()))
        .store(store)
        .config(config)
        .build()?;

    let mut events = tts.subscribe();
    tokio::spawn(async move {
        while let Some(event) = adaptive_voice::next_event(&mut events).await {
            match event {
                SchedulerEvent::SynthesisFailed { offsets, error, .. } => {
                    tracing::error!(?offsets, %error, "Speech synthesis failed");
                }
                other => tracing::debug!(event = ?other, "Scheduler event"),
            }
        }
    });

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read stdin")?;

    tts.prepare().await?;
    let delay = Duration::from_millis(cli.token_delay_ms);
    for word in input.split_inclusive(char::is_whitespace) {
        tts.speak(word, false).await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    tts.flush(true).await;

    tracing::info!(
        latency_samples = tts.latency_predictor().sample_count(),
        duration_samples = tts.duration_predictor().sample_count(),
        "Done"
    );
    tts.stop().await;
    Ok(())
}
