//! Scheduler configuration.

use crate::predictor::PredictorConfig;
use adaptive_voice_domain::VoiceError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const LATENCY_STORAGE_KEY: &str = "textLengthToTTSAPIResponseTime";
pub const DURATION_STORAGE_KEY: &str = "textLengthToTTSAudioDuration";

/// Everything tunable about a session. Missing JSON fields take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Text length → seconds until the engine answers.
    pub latency: PredictorConfig,
    /// Text length → seconds of audio produced.
    pub duration: PredictorConfig,
    pub latency_storage_key: String,
    pub duration_storage_key: String,
    /// Applied to the predicted duration of the remaining text when chaining
    /// need-by times through a plan.
    pub need_by_discount: f64,
    pub sentence_fallback_for_single_paragraph: bool,
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            latency: PredictorConfig::api_latency(),
            duration: PredictorConfig::audio_duration(),
            latency_storage_key: LATENCY_STORAGE_KEY.to_string(),
            duration_storage_key: DURATION_STORAGE_KEY.to_string(),
            need_by_discount: 0.8,
            sentence_fallback_for_single_paragraph: true,
            event_capacity: 256,
        }
    }
}

impl SchedulerConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, VoiceError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            VoiceError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            VoiceError::Configuration(format!("Invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), VoiceError> {
        if !(self.need_by_discount.is_finite() && self.need_by_discount >= 0.0) {
            return Err(VoiceError::Configuration(format!(
                "need_by_discount must be a non-negative number, got {}",
                self.need_by_discount
            )));
        }
        for (name, predictor) in [("latency", &self.latency), ("duration", &self.duration)] {
            if predictor.max_samples == 0 {
                return Err(VoiceError::Configuration(format!(
                    "{name}.max_samples must be positive"
                )));
            }
            let percentiles = [predictor.low_percentile, predictor.high_percentile];
            if percentiles.iter().any(|p| !(0.0..=100.0).contains(p)) {
                return Err(VoiceError::Configuration(format!(
                    "{name} percentiles must lie in 0..=100"
                )));
            }
        }
        Ok(())
    }
}
