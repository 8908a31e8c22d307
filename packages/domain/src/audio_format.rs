//! Audio encodings a speech endpoint can be asked to return.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// MP3, the default for hosted speech APIs.
    #[default]
    Mp3,
    /// Ogg/Opus.
    Opus,
    /// AAC in an ADTS stream.
    Aac,
    /// FLAC.
    Flac,
    /// RIFF/WAV, 16-bit PCM.
    Wav,
    /// Raw 16-bit PCM at 24 kHz, mono. Not self-describing.
    Pcm,
}

impl AudioFormat {
    /// Name used in request bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Opus => "opus",
            AudioFormat::Aac => "aac",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
            AudioFormat::Pcm => "pcm",
        }
    }

    /// File extension hint for decoders.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Opus => "ogg",
            other => other.as_str(),
        }
    }
}
