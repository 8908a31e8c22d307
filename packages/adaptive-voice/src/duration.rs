//! Measuring how long synthesized audio plays for.

use adaptive_voice_domain::{AudioFormat, VoiceError};
use std::io::Cursor;
use symphonia::core::codecs::CodecParameters;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

/// Length of an encoded clip in seconds; `None` when it cannot be decoded.
pub trait DurationProbe: Send + Sync {
    fn duration(&self, audio: &[u8]) -> Option<f64>;
}

/// Probes container headers with symphonia, scanning packets when the header
/// carries no frame count (e.g. CBR MP3 without a Xing tag).
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDurationProbe {
    format: Option<AudioFormat>,
}

impl SymphoniaDurationProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hint the container format instead of sniffing it.
    pub fn with_format(format: AudioFormat) -> Self {
        Self {
            format: Some(format),
        }
    }

    pub fn probe(&self, audio: &[u8]) -> Result<f64, VoiceError> {
        let mss = MediaSourceStream::new(
            Box::new(Cursor::new(audio.to_vec())),
            MediaSourceStreamOptions::default(),
        );
        let mut hint = Hint::new();
        if let Some(format) = self.format {
            hint.with_extension(format.extension());
        }

        let mut probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| VoiceError::AudioDecode(format!("Unrecognised audio: {}", e)))?;

        let track = probed
            .format
            .default_track()
            .ok_or_else(|| VoiceError::AudioDecode("No audio tracks found".to_string()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        if let Some(seconds) = header_duration(&params) {
            return Ok(seconds);
        }

        let time_base = params
            .time_base
            .or_else(|| params.sample_rate.map(|rate| TimeBase::new(1, rate)))
            .ok_or_else(|| VoiceError::AudioDecode("Track has no time base".to_string()))?;

        let mut end_ts = 0u64;
        loop {
            match probed.format.next_packet() {
                Ok(packet) if packet.track_id() == track_id => {
                    end_ts = end_ts.max(packet.ts().saturating_add(packet.dur()));
                }
                Ok(_) => {}
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    return Err(VoiceError::AudioDecode(format!(
                        "Failed to read packet: {}",
                        e
                    )));
                }
            }
        }
        Ok(seconds(time_base.calc_time(end_ts)))
    }
}

fn header_duration(params: &CodecParameters) -> Option<f64> {
    let n_frames = params.n_frames?;
    if let Some(time_base) = params.time_base {
        return Some(seconds(time_base.calc_time(n_frames)));
    }
    params
        .sample_rate
        .filter(|rate| *rate > 0)
        .map(|rate| n_frames as f64 / f64::from(rate))
}

fn seconds(time: Time) -> f64 {
    time.seconds as f64 + time.frac
}

impl DurationProbe for SymphoniaDurationProbe {
    fn duration(&self, audio: &[u8]) -> Option<f64> {
        match self.probe(audio) {
            Ok(seconds) => Some(seconds),
            Err(e) => {
                tracing::warn!(bytes = audio.len(), error = %e, "Could not measure audio duration");
                None
            }
        }
    }
}
