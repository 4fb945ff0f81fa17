//! HTTP/WebSocket surface of the gateway.
//!
//! REST endpoints cover transcription, pairing and token minting; `/ws`
//! upgrades into the channel fabric. Admission tokens travel in the
//! `Sec-WebSocket-Protocol` header as `Bearer.<token>` and are verified
//! before the upgrade.

use crate::asr::HttpAsr;
use crate::auth::{TokenAuthority, TokenScope};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::lexicon::{JsonDirStore, LexiconLoader, LexiconStore};
use crate::pairing::PairingStore;
use crate::transcribe::{AudioFormat, Orchestrator, TranscribeOutcome};
use crate::ws::protocol::ServerMessage;
use crate::ws::registry::{ConnectionRegistry, Outbound};
use crate::ws::router::{RouterDeps, serve_socket};
use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Everything the handlers share.
pub struct GatewayState {
    pub config: GatewayConfig,
    pub registry: Arc<ConnectionRegistry>,
    pub pairing: Arc<PairingStore>,
    pub loader: LexiconLoader,
    pub orchestrator: Orchestrator,
    pub tokens: TokenAuthority,
    router_deps: Arc<RouterDeps>,
}

impl GatewayState {
    /// Wire the collaborators up from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the upstream HTTP client cannot be built.
    pub fn from_config(config: GatewayConfig) -> Result<Arc<Self>> {
        let asr = HttpAsr::new(
            &config.asr.endpoint,
            config.asr.api_key.clone(),
            &config.asr.model,
            Duration::from_secs(config.asr.timeout_secs),
        )?;
        let store = JsonDirStore::new(config.lexicon.data_dir.clone());
        Ok(Self::assemble(config, Arc::new(store), Arc::new(asr)))
    }

    /// Assemble with explicit collaborators (tests swap in their own).
    pub fn assemble(
        config: GatewayConfig,
        store: Arc<dyn LexiconStore>,
        asr: Arc<dyn crate::asr::AsrProvider>,
    ) -> Arc<Self> {
        let registry = Arc::new(ConnectionRegistry::new());
        let pairing = Arc::new(PairingStore::new(Duration::from_secs(
            config.pairing.code_ttl_secs,
        )));
        let router_deps = Arc::new(RouterDeps {
            registry: Arc::clone(&registry),
            pairing: Arc::clone(&pairing),
            limits: config.limits.clone(),
        });
        let tokens = TokenAuthority::new(
            &config.auth.signing_key,
            Duration::from_secs(config.auth.token_ttl_secs),
        );
        let orchestrator = Orchestrator::new(asr, config.limits.max_upload_bytes);
        Arc::new(Self {
            config,
            registry,
            pairing,
            loader: LexiconLoader::new(store),
            orchestrator,
            tokens,
            router_deps,
        })
    }

    /// Start the periodic pairing sweeper.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        Arc::clone(&self.pairing).spawn_sweeper(Duration::from_secs(
            self.config.pairing.sweep_interval_secs,
        ))
    }
}

/// Build the axum application.
pub fn app(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/transcribe", post(transcribe))
        .route("/generate-pair-code", post(generate_pair_code))
        .route("/pair-device", post(pair_device))
        .route("/auth/ws-token", post(ws_token))
        .route("/auth/ws-token-mobile", post(ws_token_mobile))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// REST: transcription
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    /// Base64-encoded audio body.
    pub audio_data: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub prompt: String,
    /// Audio container tag (`wav`, `webm`, `ogg`, `mp3`, `m4a`).
    pub format: String,
    /// Lexicon owner; the configured default user when absent.
    #[serde(default)]
    pub user_id: Option<String>,
    /// When set, the result is also broadcast on this channel as a
    /// `transcription_result` event.
    #[serde(default)]
    pub channel_id: Option<String>,
}

fn default_language() -> String {
    "nl".to_string()
}

#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    /// The canonical text (same as `normalized`).
    pub text: String,
    pub raw: String,
    pub normalized: String,
    pub language: String,
    pub duration: f64,
    pub provider: String,
    pub model: String,
}

async fn transcribe(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<TranscribeRequest>,
) -> Response {
    match handle_transcribe(&state, request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn handle_transcribe(
    state: &GatewayState,
    request: TranscribeRequest,
) -> Result<TranscribeResponse> {
    let format = AudioFormat::from_tag(&request.format)?;
    let audio = base64::engine::general_purpose::STANDARD
        .decode(request.audio_data.as_bytes())
        .map_err(|e| GatewayError::Validation(format!("audio_data is not valid base64: {e}")))?;

    let user_id = request
        .user_id
        .unwrap_or_else(|| state.config.lexicon.default_user.clone());
    let snapshot = state.loader.snapshot(&user_id).await?;

    let outcome = state
        .orchestrator
        .transcribe(
            Bytes::from(audio),
            format,
            &request.language,
            &request.prompt,
            snapshot,
        )
        .await?;

    if let Some(channel) = request.channel_id.as_deref() {
        broadcast_result(state, channel, &outcome);
    }

    Ok(TranscribeResponse {
        text: outcome.normalized.clone(),
        raw: outcome.raw,
        normalized: outcome.normalized,
        language: outcome.language,
        duration: outcome.duration,
        provider: state.orchestrator.provider_name().to_string(),
        model: state.orchestrator.model_name().to_string(),
    })
}

/// Share a transcription with every member of a channel.
fn broadcast_result(state: &GatewayState, channel: &str, outcome: &TranscribeOutcome) {
    let event = ServerMessage::TranscriptionResult {
        raw: outcome.raw.clone(),
        normalized: outcome.normalized.clone(),
        language: outcome.language.clone(),
        duration: outcome.duration,
    };
    for peer in state.registry.channel_peers(channel, None) {
        if peer
            .sender
            .try_send(Outbound::Message(event.clone()))
            .is_err()
        {
            warn!(peer = %peer.client_id, "transcription_result dropped, peer queue full");
        }
    }
}

// ---------------------------------------------------------------------------
// REST: pairing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GeneratePairCodeRequest {
    pub desktop_session_id: String,
}

#[derive(Debug, Serialize)]
pub struct GeneratePairCodeResponse {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub channel_id: String,
}

async fn generate_pair_code(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<GeneratePairCodeRequest>,
) -> Response {
    match state.pairing.create(&request.desktop_session_id) {
        Ok(record) => (
            StatusCode::OK,
            Json(GeneratePairCodeResponse {
                code: record.code,
                expires_at: record.expires_at,
                channel_id: record.channel_id,
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct PairDeviceRequest {
    pub code: String,
    pub mobile_session_id: String,
}

#[derive(Debug, Serialize)]
pub struct PairDeviceResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
}

async fn pair_device(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<PairDeviceRequest>,
) -> Response {
    match state.pairing.claim(&request.code, &request.mobile_session_id) {
        Ok(record) => (
            StatusCode::OK,
            Json(PairDeviceResponse {
                success: true,
                channel_id: Some(record.channel_id),
                error: None,
                message: "device paired".to_string(),
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::OK,
            Json(PairDeviceResponse {
                success: false,
                channel_id: None,
                error: Some(e.wire_code().to_string()),
                message: e.to_string(),
            }),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// REST: ws admission tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct WsTokenResponse {
    pub token: String,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

async fn ws_token(State(state): State<Arc<GatewayState>>) -> Response {
    match state.tokens.issue("desktop", TokenScope::Desktop, None) {
        Ok(issued) => (
            StatusCode::OK,
            Json(WsTokenResponse {
                token: issued.token,
                expires_in: issued.expires_in,
                channel: None,
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct WsTokenMobileRequest {
    pub pair_code: String,
}

async fn ws_token_mobile(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<WsTokenMobileRequest>,
) -> Response {
    let channel = format!("pair-{}", request.pair_code);
    if state.pairing.lookup(&channel).is_none() {
        return error_response(&GatewayError::InvalidCode);
    }
    match state
        .tokens
        .issue("mobile", TokenScope::Mobile, Some(channel.clone()))
    {
        Ok(issued) => (
            StatusCode::OK,
            Json(WsTokenResponse {
                token: issued.token,
                expires_in: issued.expires_in,
                channel: Some(channel),
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

// ---------------------------------------------------------------------------
// WebSocket upgrade
// ---------------------------------------------------------------------------

async fn ws_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let header = headers
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let (claims, protocol) = match state.tokens.verify_subprotocol(header) {
        Ok(verified) => verified,
        Err(e) => {
            info!("websocket admission refused: {e}");
            return error_response(&e);
        }
    };

    let deps = Arc::clone(&state.router_deps);
    ws.protocols([protocol])
        .on_upgrade(move |socket| serve_socket(socket, claims, deps))
}

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

/// REST error body.
#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    detail: String,
}

fn error_response(err: &GatewayError) -> Response {
    let status = match err {
        GatewayError::Validation(_)
        | GatewayError::InvalidCode
        | GatewayError::CodeExpired
        | GatewayError::ChannelFull
        | GatewayError::InvalidChannel
        | GatewayError::AlreadyPaired
        | GatewayError::UpstreamRejected(_) => StatusCode::BAD_REQUEST,
        GatewayError::InvalidToken(_) | GatewayError::TokenExpired => StatusCode::UNAUTHORIZED,
        GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        GatewayError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::ConfigMissing(_)
        | GatewayError::UpstreamUnavailable(_)
        | GatewayError::Store(_)
        | GatewayError::Internal(_)
        | GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorEnvelope {
            detail: err.to_string(),
        }),
    )
        .into_response()
}
