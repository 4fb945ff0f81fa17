//! Configuration types for the dictation gateway.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the gateway process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listen address settings.
    pub server: ServerConfig,
    /// Upstream ASR collaborator settings.
    pub asr: AsrConfig,
    /// WebSocket admission token settings.
    pub auth: AuthConfig,
    /// Device pairing settings.
    pub pairing: PairingConfig,
    /// Per-connection rate limits and payload caps.
    pub limits: LimitsConfig,
    /// Lexicon store settings.
    pub lexicon: LexiconConfig,
}

/// Listen address configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host (IP or hostname).
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8089,
        }
    }
}

/// Upstream ASR collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    /// Base URL of the transcription endpoint
    /// (e.g. `https://api.openai.com/v1/audio/transcriptions`).
    pub endpoint: String,
    /// Bearer key for the upstream, if it requires one.
    pub api_key: Option<String>,
    /// Model identifier sent with each request.
    pub model: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Probe the upstream at startup and refuse to start when unreachable.
    pub probe_on_startup: bool,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
            timeout_secs: 60,
            probe_on_startup: false,
        }
    }
}

/// Admission token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC signing key for admission tokens.
    ///
    /// The default is only suitable for local development; production
    /// deployments set `MONDSTUK_SIGNING_KEY`.
    pub signing_key: String,
    /// Token lifetime in seconds.
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_key: "mondstuk-dev-only".to_string(),
            token_ttl_secs: 600,
        }
    }
}

/// Device pairing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Lifetime of an unclaimed pairing code in seconds.
    pub code_ttl_secs: u64,
    /// Interval between expiry sweeps in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: 300,
            sweep_interval_secs: 30,
        }
    }
}

/// Rate limits and payload caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Control-plane messages allowed per second per connection.
    pub control_messages_per_sec: f64,
    /// Audio bytes allowed per second per connection.
    pub audio_bytes_per_sec: f64,
    /// Maximum size of a single control frame in bytes.
    pub max_control_frame_bytes: usize,
    /// Maximum size of an uploaded audio body in bytes.
    pub max_upload_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            control_messages_per_sec: 10.0,
            audio_bytes_per_sec: 1024.0 * 1024.0,
            max_control_frame_bytes: 10 * 1024,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

/// Lexicon store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LexiconConfig {
    /// Directory holding the lexicon/config JSON documents.
    pub data_dir: PathBuf,
    /// User id assumed when a request does not carry one.
    pub default_user: String,
}

impl Default for LexiconConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            default_user: "default".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| GatewayError::ConfigMissing(format!("{}: {e}", path.display())))
    }

    /// Save configuration to a TOML file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| GatewayError::Internal(format!("config serialize: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `MONDSTUK_*` environment overrides on top of the loaded file.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("MONDSTUK_PORT") {
            if let Ok(port) = v.parse() {
                self.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("MONDSTUK_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("MONDSTUK_ASR_ENDPOINT") {
            self.asr.endpoint = v;
        }
        if let Ok(v) = std::env::var("MONDSTUK_ASR_API_KEY") {
            self.asr.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("MONDSTUK_SIGNING_KEY") {
            self.auth.signing_key = v;
        }
        if let Ok(v) = std::env::var("MONDSTUK_TOKEN_TTL_SECS") {
            if let Ok(ttl) = v.parse() {
                self.auth.token_ttl_secs = ttl;
            }
        }
        if let Ok(v) = std::env::var("MONDSTUK_PAIR_CODE_TTL_SECS") {
            if let Ok(ttl) = v.parse() {
                self.pairing.code_ttl_secs = ttl;
            }
        }
        if let Ok(v) = std::env::var("MONDSTUK_LEXICON_DIR") {
            self.lexicon.data_dir = PathBuf::from(v);
        }
    }
}
