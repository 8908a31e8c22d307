//! OpenAI text-to-speech over HTTP.

use super::{BoxFuture, SynthesisEngine};
use adaptive_voice_domain::{AudioFormat, VoiceError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSpeechConfig {
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    /// 0.25 to 4.0.
    pub speed: f32,
    pub response_format: AudioFormat,
    #[serde(with = "secs")]
    pub request_timeout: Duration,
}

impl Default for OpenAiSpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/audio/speech".to_string(),
            model: "tts-1".to_string(),
            voice: "nova".to_string(),
            speed: 1.3,
            response_format: AudioFormat::Mp3,
            request_timeout: Duration::from_secs(60),
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'a str,
}

#[derive(Clone)]
pub struct OpenAiSpeechEngine {
    inner: reqwest::Client,
    api_key: String,
    config: OpenAiSpeechConfig,
}

impl OpenAiSpeechEngine {
    pub fn from_env(config: OpenAiSpeechConfig) -> Result<Self, VoiceError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            VoiceError::Configuration(format!("No OpenAI API key found. Set {}", API_KEY_ENV))
        })?;
        Self::new(api_key, config)
    }

    pub fn new(api_key: impl Into<String>, config: OpenAiSpeechConfig) -> Result<Self, VoiceError> {
        let inner = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                VoiceError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            inner,
            api_key: api_key.into(),
            config,
        })
    }

    pub fn config(&self) -> &OpenAiSpeechConfig {
        &self.config
    }

    async fn request(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        let body = SpeechRequest {
            model: &self.config.model,
            input: text,
            voice: &self.config.voice,
            speed: self.config.speed,
            response_format: self.config.response_format.as_str(),
        };

        let resp = self
            .inner
            .post(&self.config.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("Speech request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(VoiceError::Synthesis(format!(
                "Speech endpoint returned {}: {}",
                status, detail
            )));
        }

        let audio = resp
            .bytes()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("Failed to read audio body: {}", e)))?;
        Ok(audio.to_vec())
    }
}

impl std::fmt::Debug for OpenAiSpeechEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiSpeechEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SynthesisEngine for OpenAiSpeechEngine {
    fn synthesize<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<u8>, VoiceError>> {
        Box::pin(self.request(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_tuned_voice() {
        let config = OpenAiSpeechConfig::default();
        assert_eq!(config.model, "tts-1");
        assert_eq!(config.voice, "nova");
        assert!((config.speed - 1.3).abs() < f32::EPSILON);
        assert_eq!(config.response_format, AudioFormat::Mp3);
    }

    #[test]
    fn config_reads_partial_json() {
        let config: OpenAiSpeechConfig =
            serde_json::from_str(r#"{"voice": "alloy", "request_timeout": 2.5}"#).expect("parse");
        assert_eq!(config.voice, "alloy");
        assert_eq!(config.model, "tts-1");
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn request_body_uses_wire_names() {
        let config = OpenAiSpeechConfig::default();
        let body = SpeechRequest {
            model: &config.model,
            input: "Hi.",
            voice: &config.voice,
            speed: config.speed,
            response_format: config.response_format.as_str(),
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["model"], "tts-1");
        assert_eq!(json["input"], "Hi.");
        assert_eq!(json["response_format"], "mp3");
    }
}
