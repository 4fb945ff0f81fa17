//! The transcription orchestrator.
//!
//! One entry point: audio bytes in, `{raw, normalized, language, duration}`
//! out. Validation happens before the upstream call; the CPU-bound
//! normalization runs on a blocking worker so socket tasks stay responsive.

use crate::asr::AsrProvider;
use crate::error::{GatewayError, Result};
use crate::lexicon::Snapshot;
use crate::normalize::normalize;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Hard cap on uploaded audio.
pub const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;
/// Minimum audio duration accepted, in seconds.
pub const MIN_AUDIO_SECONDS: f64 = 0.1;

/// Audio container formats accepted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Webm,
    Ogg,
    Mp3,
    M4a,
}

impl AudioFormat {
    /// Parse a request's format tag.
    ///
    /// # Errors
    ///
    /// `UNSUPPORTED_FORMAT` for any container the gateway does not accept.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "wav" => Ok(Self::Wav),
            "webm" => Ok(Self::Webm),
            "ogg" => Ok(Self::Ogg),
            "mp3" => Ok(Self::Mp3),
            "m4a" => Ok(Self::M4a),
            other => Err(GatewayError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Wav => "audio.wav",
            Self::Webm => "audio.webm",
            Self::Ogg => "audio.ogg",
            Self::Mp3 => "audio.mp3",
            Self::M4a => "audio.m4a",
        }
    }
}

/// Outcome of one transcription.
#[derive(Debug, Clone, Serialize)]
pub struct TranscribeOutcome {
    pub raw: String,
    pub normalized: String,
    pub language: String,
    pub duration: f64,
}

/// Binds the ASR collaborator to the normalization pipeline.
pub struct Orchestrator {
    asr: Arc<dyn AsrProvider>,
    max_audio_bytes: usize,
}

impl Orchestrator {
    pub fn new(asr: Arc<dyn AsrProvider>, max_audio_bytes: usize) -> Self {
        Self {
            asr,
            max_audio_bytes,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.asr.provider_name()
    }

    pub fn model_name(&self) -> &str {
        self.asr.model_name()
    }

    /// Validate, transcribe upstream, normalize.
    ///
    /// # Errors
    ///
    /// `PAYLOAD_TOO_LARGE` over the byte cap, `VALIDATION_ERROR` for audio
    /// shorter than 0.1 s (WAV only; other containers carry no cheap
    /// duration), upstream error kinds unchanged, and `CONFIG_MISSING` from
    /// the pipeline.
    pub async fn transcribe(
        &self,
        audio: Bytes,
        format: AudioFormat,
        language: &str,
        prompt: &str,
        snapshot: Arc<Snapshot>,
    ) -> Result<TranscribeOutcome> {
        if audio.len() > self.max_audio_bytes {
            return Err(GatewayError::PayloadTooLarge(format!(
                "{} bytes of audio",
                audio.len()
            )));
        }
        if audio.is_empty() {
            return Err(GatewayError::Validation("empty audio body".to_string()));
        }
        if format == AudioFormat::Wav {
            if let Some(seconds) = wav_duration_seconds(&audio) {
                if seconds < MIN_AUDIO_SECONDS {
                    return Err(GatewayError::Validation(format!(
                        "audio too short: {seconds:.3}s"
                    )));
                }
            }
        }

        let transcript = self
            .asr
            .transcribe(audio, format.file_name(), language, prompt)
            .await?;

        let raw = transcript.text.clone();
        let language_tag = transcript.language.clone();
        let duration = transcript.duration;
        let result = tokio::task::spawn_blocking(move || {
            normalize(&transcript.text, &transcript.language, &snapshot)
        })
        .await
        .map_err(|e| GatewayError::Internal(format!("pipeline task: {e}")))??;

        info!(
            raw_chars = raw.len(),
            normalized_chars = result.normalized_text.len(),
            "transcription normalized"
        );
        Ok(TranscribeOutcome {
            raw,
            normalized: result.normalized_text,
            language: language_tag,
            duration,
        })
    }
}

/// Duration of a PCM WAV body from its RIFF header, when parseable.
fn wav_duration_seconds(bytes: &[u8]) -> Option<f64> {
    if bytes.len() < 44 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }
    let mut offset = 12;
    let mut byte_rate: Option<f64> = None;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().ok()?) as usize;
        let body = offset + 8;
        match id {
            b"fmt " if body + 16 <= bytes.len() => {
                let rate = u32::from_le_bytes(bytes[body + 8..body + 12].try_into().ok()?);
                if rate > 0 {
                    byte_rate = Some(f64::from(rate));
                }
            }
            b"data" => {
                let data_len = size.min(bytes.len().saturating_sub(body));
                return byte_rate.map(|rate| data_len as f64 / rate);
            }
            _ => {}
        }
        // chunks are word-aligned
        offset = body + size + (size & 1);
    }
    None
}
