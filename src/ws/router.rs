//! Per-connection message routing.
//!
//! Each accepted WebSocket runs one task owning a small state machine:
//!
//! `ACCEPTED → IDENTIFIED → JOINED → CLOSED`
//!
//! Inbound frames are validated against the state table, rate-limited, then
//! either handled locally or fanned out to channel peers. Administrative
//! events (`client_joined`, `pairing_success`, `*_disconnected`) are
//! synthesized here. Cleanup runs from a drop guard so a panicking handler
//! still detaches the connection and notifies its peer.

use super::protocol::{ClientMessage, DeviceType, ServerMessage};
use super::rate_limit::{ConnectionLimits, LimitVerdict};
use super::registry::{ConnectionRegistry, Outbound};
use crate::auth::{TokenClaims, TokenScope};
use crate::config::LimitsConfig;
use crate::error::GatewayError;
use crate::pairing::PairingStore;
use axum::extract::ws::{Message, WebSocket};
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shared collaborators the router needs.
pub struct RouterDeps {
    pub registry: Arc<ConnectionRegistry>,
    pub pairing: Arc<PairingStore>,
    pub limits: LimitsConfig,
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Accepted,
    Identified,
    Joined,
}

/// Whether the read loop keeps going after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Serve one accepted WebSocket until it closes.
pub async fn serve_socket(socket: WebSocket, claims: TokenClaims, deps: Arc<RouterDeps>) {
    let client_id = Uuid::new_v4().to_string()[..8].to_string();
    info!(client_id = %client_id, scope = ?claims.scope, "websocket session opened");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = ConnectionRegistry::make_queue();

    // forward task: outbound queue → socket, per-sender order preserved
    let forward_id = client_id.clone();
    let forward = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let sent = match frame {
                Outbound::Message(msg) => match serde_json::to_string(&msg) {
                    Ok(json) => ws_tx.send(Message::Text(json.into())).await,
                    Err(e) => {
                        warn!(client_id = %forward_id, "outbound serialize failed: {e}");
                        continue;
                    }
                },
                Outbound::Binary(bytes) => ws_tx.send(Message::Binary(bytes.into())).await,
            };
            if sent.is_err() {
                debug!(client_id = %forward_id, "websocket send failed, stopping");
                break;
            }
        }
    });

    let _guard = ConnGuard {
        deps: Arc::clone(&deps),
        client_id: client_id.clone(),
    };
    let limits = ConnectionLimits::new(
        deps.limits.control_messages_per_sec,
        deps.limits.audio_bytes_per_sec,
    );
    let mut actor = ConnActor {
        deps,
        claims,
        client_id: client_id.clone(),
        tx,
        state: ConnState::Accepted,
        limits,
    };

    while let Some(frame) = ws_rx.next().await {
        let flow = match frame {
            Ok(Message::Text(text)) => actor.handle_text(&text),
            Ok(Message::Binary(bytes)) => actor.handle_binary(&bytes),
            Ok(Message::Close(_)) => {
                debug!(client_id = %client_id, "client closed connection");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => Flow::Continue,
            Err(e) => {
                debug!(client_id = %client_id, "websocket error: {e}");
                break;
            }
        };
        if flow == Flow::Close {
            break;
        }
    }

    forward.abort();
    info!(client_id = %client_id, "websocket session ended");
}

/// Detach-and-notify cleanup. Runs on normal exit and on panic alike, so a
/// failing handler terminates only its own connection while the peer still
/// learns about the departure.
struct ConnGuard {
    deps: Arc<RouterDeps>,
    client_id: String,
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        let Some(departure) = self.deps.registry.unregister(&self.client_id) else {
            return;
        };
        let event = ServerMessage::disconnected(departure.device_type, &departure.channel);
        for peer in &departure.peers {
            let _ = peer.sender.try_send(Outbound::Message(event.clone()));
        }
        if departure.channel_empty {
            self.deps.pairing.close(&departure.channel);
        }
        info!(
            client_id = %self.client_id,
            channel = %departure.channel,
            "connection left channel"
        );
    }
}

struct ConnActor {
    deps: Arc<RouterDeps>,
    claims: TokenClaims,
    client_id: String,
    tx: mpsc::Sender<Outbound>,
    state: ConnState,
    limits: ConnectionLimits,
}

impl ConnActor {
    fn handle_text(&mut self, text: &str) -> Flow {
        // audio rides in text frames too; it is exempt from the control-plane
        // message count and draws from the byte bucket inside on_audio_json
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::AudioChunk { data }) => {
                if self.state != ConnState::Joined {
                    self.reject("audio before joining a channel".to_string());
                    return Flow::Continue;
                }
                self.on_audio_json(data)
            }
            parsed => self.handle_control(text, parsed),
        }
    }

    fn handle_control(
        &mut self,
        text: &str,
        parsed: serde_json::Result<ClientMessage>,
    ) -> Flow {
        if text.len() > self.deps.limits.max_control_frame_bytes {
            self.send_self(ServerMessage::error(&GatewayError::PayloadTooLarge(
                format!("control frame of {} bytes", text.len()),
            )));
            return Flow::Continue;
        }
        match self.limits.admit_control() {
            LimitVerdict::Allow => {}
            LimitVerdict::Drop => {
                self.send_self(ServerMessage::error(&GatewayError::RateLimited));
                return Flow::Continue;
            }
            LimitVerdict::Close => {
                self.send_self(ServerMessage::error(&GatewayError::RateLimited));
                warn!(client_id = %self.client_id, "closing connection after repeated rate violations");
                return Flow::Close;
            }
        }

        let msg = match parsed {
            Ok(msg) => msg,
            Err(e) => {
                self.reject(format!("malformed message: {e}"));
                return Flow::Continue;
            }
        };

        // mobile scope is narrow: audio was handled above, so only
        // mobile_init remains legal here
        if self.claims.scope == TokenScope::Mobile
            && !matches!(msg, ClientMessage::MobileInit { .. })
        {
            self.reject("message not allowed for mobile scope".to_string());
            return Flow::Continue;
        }

        match (self.state, msg) {
            (ConnState::Accepted, ClientMessage::Identify { session_id, device_type }) => {
                self.on_identify(&session_id, device_type);
            }
            (ConnState::Accepted, ClientMessage::MobileInit { session_id, pair_code }) => {
                self.on_mobile_init(&session_id, &pair_code);
            }
            (ConnState::Identified, ClientMessage::JoinChannel { channel }) => {
                self.on_join_channel(&channel);
            }
            (ConnState::Identified | ConnState::Joined, ClientMessage::Ping { id }) => {
                self.send_self(ServerMessage::Pong { id });
            }
            (ConnState::Joined, ClientMessage::ChannelMessage { payload }) => {
                let from = self.own_device_type();
                self.fan_out(ServerMessage::ChannelMessage { payload, from });
            }
            (ConnState::Joined, ClientMessage::SettingsSync { settings }) => {
                let from = self.own_device_type();
                self.fan_out(ServerMessage::SettingsSync { settings, from });
            }
            (state, msg) => {
                debug!(client_id = %self.client_id, ?state, "message not allowed in state");
                self.reject(format!("message {} not allowed in current state", name_of(&msg)));
            }
        }
        Flow::Continue
    }

    fn handle_binary(&mut self, bytes: &[u8]) -> Flow {
        if self.state != ConnState::Joined {
            self.reject("audio before joining a channel".to_string());
            return Flow::Continue;
        }
        match self.limits.admit_audio(bytes.len()) {
            LimitVerdict::Allow => {}
            LimitVerdict::Drop => {
                self.send_self(ServerMessage::error(&GatewayError::RateLimited));
                return Flow::Continue;
            }
            LimitVerdict::Close => {
                self.send_self(ServerMessage::error(&GatewayError::RateLimited));
                return Flow::Close;
            }
        }
        for peer in self.deps.registry.peers(&self.client_id) {
            if peer.sender.try_send(Outbound::Binary(bytes.to_vec())).is_err() {
                debug!(peer = %peer.client_id, "peer queue full, audio frame dropped");
            }
        }
        Flow::Continue
    }

    fn on_identify(&mut self, session_id: &str, device_type: DeviceType) {
        if device_type == DeviceType::Mobile {
            // mobile connections come in through mobile_init
            self.reject("mobile connections must use mobile_init".to_string());
            return;
        }
        self.deps
            .registry
            .register(&self.client_id, device_type, session_id, self.tx.clone());
        self.state = ConnState::Identified;
        self.send_self(ServerMessage::Identified {
            client_id: self.client_id.clone(),
        });
        info!(client_id = %self.client_id, session_id, "connection identified");
    }

    /// identify + claim + join as one unit; any sub-failure rolls back and
    /// leaves the connection in ACCEPTED.
    fn on_mobile_init(&mut self, session_id: &str, pair_code: &str) {
        let channel = format!("pair-{pair_code}");
        if let Some(pinned) = &self.claims.channel {
            if pinned != &channel {
                self.reject("pair code does not match token channel".to_string());
                return;
            }
        }
        let record = match self.deps.pairing.claim(pair_code, session_id) {
            Ok(record) => record,
            Err(e) => {
                self.send_self(ServerMessage::error(&e));
                return;
            }
        };
        self.deps
            .registry
            .register(&self.client_id, DeviceType::Mobile, session_id, self.tx.clone());
        if let Err(e) = self.deps.registry.join(&self.client_id, &record.channel_id) {
            // roll the whole unit back
            self.deps.registry.unregister(&self.client_id);
            self.deps.pairing.release(pair_code);
            self.send_self(ServerMessage::error(&e));
            return;
        }

        self.state = ConnState::Joined;
        let success = ServerMessage::PairingSuccess {
            channel: record.channel_id.clone(),
        };
        self.send_self(success.clone());
        self.fan_out(success);
        self.fan_out(ServerMessage::ClientJoined {
            channel: record.channel_id.clone(),
            device_type: DeviceType::Mobile,
            session_id: session_id.to_string(),
        });
        info!(
            client_id = %self.client_id,
            channel = %record.channel_id,
            "mobile paired and joined"
        );
    }

    fn on_join_channel(&mut self, channel: &str) {
        if let Some(pinned) = &self.claims.channel {
            if pinned != channel {
                self.reject("channel does not match token".to_string());
                return;
            }
        }
        if self.deps.pairing.lookup(channel).is_none() {
            self.send_self(ServerMessage::error(&GatewayError::InvalidChannel));
            return;
        }
        if let Err(e) = self.deps.registry.join(&self.client_id, channel) {
            self.send_self(ServerMessage::error(&e));
            return;
        }
        self.state = ConnState::Joined;
        let device_type = self.own_device_type();
        self.send_self(ServerMessage::ChannelJoined {
            channel: channel.to_string(),
            device_type,
        });
        let session_id = self
            .deps
            .registry
            .session_id(&self.client_id)
            .unwrap_or_default();
        self.fan_out(ServerMessage::ClientJoined {
            channel: channel.to_string(),
            device_type,
            session_id,
        });
        info!(client_id = %self.client_id, channel, "joined channel");
    }

    fn on_audio_json(&mut self, data: String) -> Flow {
        let decoded = match base64::engine::general_purpose::STANDARD.decode(&data) {
            Ok(decoded) => decoded,
            Err(_) => {
                self.reject("audio_chunk data is not valid base64".to_string());
                return Flow::Continue;
            }
        };
        match self.limits.admit_audio(decoded.len()) {
            LimitVerdict::Allow => {}
            LimitVerdict::Drop => {
                self.send_self(ServerMessage::error(&GatewayError::RateLimited));
                return Flow::Continue;
            }
            LimitVerdict::Close => {
                self.send_self(ServerMessage::error(&GatewayError::RateLimited));
                return Flow::Close;
            }
        }
        self.fan_out(ServerMessage::AudioChunk { data });
        Flow::Continue
    }

    fn own_device_type(&self) -> DeviceType {
        self.deps
            .registry
            .device_type(&self.client_id)
            .unwrap_or(DeviceType::Desktop)
    }

    /// Queue a frame to every peer in the sender's channel.
    fn fan_out(&self, msg: ServerMessage) {
        for peer in self.deps.registry.peers(&self.client_id) {
            if peer
                .sender
                .try_send(Outbound::Message(msg.clone()))
                .is_err()
            {
                debug!(peer = %peer.client_id, "peer queue full, frame dropped");
            }
        }
    }

    fn send_self(&self, msg: ServerMessage) {
        let _ = self.tx.try_send(Outbound::Message(msg));
    }

    fn reject(&self, message: String) {
        self.send_self(ServerMessage::error(&GatewayError::Validation(message)));
    }
}

fn name_of(msg: &ClientMessage) -> &'static str {
    match msg {
        ClientMessage::Identify { .. } => "identify",
        ClientMessage::MobileInit { .. } => "mobile_init",
        ClientMessage::JoinChannel { .. } => "join_channel",
        ClientMessage::ChannelMessage { .. } => "channel_message",
        ClientMessage::SettingsSync { .. } => "settings_sync",
        ClientMessage::AudioChunk { .. } => "audio_chunk",
        ClientMessage::Ping { .. } => "ping",
    }
}
