//! The ASR collaborator.
//!
//! The orchestrator sees a narrow capability: audio in, transcript out. The
//! HTTP implementation speaks the Whisper-style multipart transcription API;
//! tests plug in their own provider.

use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// A raw transcript from the provider.
#[derive(Debug, Clone)]
pub struct AsrTranscript {
    pub text: String,
    pub language: String,
    /// Audio duration in seconds as reported by the provider.
    pub duration: f64,
}

/// Narrow ASR capability: the orchestrator never introspects the provider.
#[async_trait]
pub trait AsrProvider: Send + Sync {
    /// Transcribe an audio body.
    async fn transcribe(
        &self,
        audio: Bytes,
        filename: &str,
        language: &str,
        prompt: &str,
    ) -> Result<AsrTranscript>;

    /// Provider label for the REST response.
    fn provider_name(&self) -> &str;

    /// Model label for the REST response.
    fn model_name(&self) -> &str;
}

/// Whisper-style HTTP provider.
pub struct HttpAsr {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

/// Wire shape of a `verbose_json` transcription response.
#[derive(Debug, Deserialize)]
struct TranscriptionBody {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

impl HttpAsr {
    /// Build the provider with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        model: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
            model: model.to_string(),
        })
    }

    /// Cheap reachability check used at startup.
    ///
    /// # Errors
    ///
    /// Returns `UPSTREAM_UNAVAILABLE` when no HTTP response comes back at
    /// all; any status code counts as reachable.
    pub async fn probe(&self) -> Result<()> {
        let response = self.client.get(&self.endpoint).send().await;
        match response {
            Ok(r) => {
                debug!(status = %r.status(), "upstream probe answered");
                Ok(())
            }
            Err(e) if e.is_timeout() => Err(GatewayError::UpstreamTimeout),
            Err(e) => Err(GatewayError::UpstreamUnavailable(e.to_string())),
        }
    }
}

#[async_trait]
impl AsrProvider for HttpAsr {
    async fn transcribe(
        &self,
        audio: Bytes,
        filename: &str,
        language: &str,
        prompt: &str,
    ) -> Result<AsrTranscript> {
        let file_part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| GatewayError::Internal(format!("multipart: {e}")))?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("language", language.to_string())
            .text("response_format", "verbose_json");
        if !prompt.is_empty() {
            form = form.text("prompt", prompt.to_string());
        }

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::UpstreamTimeout
            } else {
                GatewayError::UpstreamUnavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: TranscriptionBody = response
            .json()
            .await
            .map_err(|e| GatewayError::UpstreamRejected(format!("bad response body: {e}")))?;
        info!(chars = body.text.len(), "upstream transcript received");
        Ok(AsrTranscript {
            text: body.text,
            language: body.language.unwrap_or_else(|| language.to_string()),
            duration: body.duration.unwrap_or(0.0),
        })
    }

    fn provider_name(&self) -> &str {
        "whisper-http"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn classify_status(status: reqwest::StatusCode, body: &str) -> GatewayError {
    if status == reqwest::StatusCode::GATEWAY_TIMEOUT || status == reqwest::StatusCode::REQUEST_TIMEOUT
    {
        GatewayError::UpstreamTimeout
    } else if status.is_client_error() {
        GatewayError::UpstreamRejected(format!("{status}: {body}"))
    } else {
        GatewayError::UpstreamUnavailable(format!("{status}: {body}"))
    }
}
