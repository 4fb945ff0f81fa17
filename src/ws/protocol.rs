//! WebSocket protocol messages.
//!
//! JSON frames with a `type` discriminator, snake_case on the wire. Binary
//! frames carry raw audio and are treated as `audio_chunk`.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};

/// Whether a connection speaks for the desktop or the paired mobile device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
}

impl DeviceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
        }
    }
}

/// Client → server messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Introduce the connection (desktop flow).
    Identify {
        session_id: String,
        device_type: DeviceType,
    },

    /// Identify + claim pair code + join channel, atomically (mobile flow).
    MobileInit {
        session_id: String,
        pair_code: String,
    },

    /// Join a pairing channel after identifying.
    JoinChannel { channel: String },

    /// Free-form payload fanned out to channel peers.
    ChannelMessage { payload: serde_json::Value },

    /// Settings blob fanned out to channel peers.
    SettingsSync { settings: serde_json::Value },

    /// Base64 audio fanned out to channel peers.
    AudioChunk { data: String },

    /// Keepalive.
    Ping {
        #[serde(default)]
        id: Option<u64>,
    },
}

/// Server → client messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection accepted and registered.
    Identified { client_id: String },

    /// Sent to the joiner after a successful `join_channel`.
    ChannelJoined {
        channel: String,
        device_type: DeviceType,
    },

    /// Broadcast to peers when a device enters the channel.
    ClientJoined {
        channel: String,
        device_type: DeviceType,
        session_id: String,
    },

    /// Broadcast to both peers once the pair code is claimed.
    PairingSuccess { channel: String },

    /// Peer payload relay.
    ChannelMessage {
        payload: serde_json::Value,
        from: DeviceType,
    },

    /// Peer settings relay.
    SettingsSync {
        settings: serde_json::Value,
        from: DeviceType,
    },

    /// Peer audio relay (base64 body).
    AudioChunk { data: String },

    /// Result of a transcription routed onto the channel.
    TranscriptionResult {
        raw: String,
        normalized: String,
        language: String,
        duration: f64,
    },

    /// Keepalive reply.
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },

    /// The desktop peer left the channel.
    DesktopDisconnected { channel: String },

    /// The mobile peer left the channel.
    MobileDisconnected { channel: String },

    /// Request-level failure; the connection state does not change.
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn error(err: &GatewayError) -> Self {
        Self::Error {
            code: err.wire_code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn disconnected(device_type: DeviceType, channel: &str) -> Self {
        match device_type {
            DeviceType::Desktop => Self::DesktopDisconnected {
                channel: channel.to_string(),
            },
            DeviceType::Mobile => Self::MobileDisconnected {
                channel: channel.to_string(),
            },
        }
    }
}
