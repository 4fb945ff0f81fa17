//! End-to-end pairing and fan-out over real WebSockets.

use futures_util::{SinkExt, StreamExt};
use mondstuk::asr::{AsrProvider, AsrTranscript};
use mondstuk::config::GatewayConfig;
use mondstuk::lexicon::MemoryStore;
use mondstuk::server::{GatewayState, app};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct SilentAsr;

#[async_trait::async_trait]
impl AsrProvider for SilentAsr {
    async fn transcribe(
        &self,
        _audio: bytes::Bytes,
        _filename: &str,
        language: &str,
        _prompt: &str,
    ) -> mondstuk::Result<AsrTranscript> {
        Ok(AsrTranscript {
            text: String::new(),
            language: language.to_string(),
            duration: 0.0,
        })
    }

    fn provider_name(&self) -> &str {
        "silent"
    }

    fn model_name(&self) -> &str {
        "none"
    }
}

async fn spawn_gateway() -> String {
    let store = Arc::new(MemoryStore::new(
        json!({"tandheelkunde": {"cariës": ["caries"]}}),
        json!([]),
        json!({"normalization": {}}),
    ));
    let state = GatewayState::assemble(GatewayConfig::default(), store, Arc::new(SilentAsr));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.expect("serve");
    });
    format!("127.0.0.1:{}", addr.port())
}

async fn rest_json(base: &str, route: &str, body: Value) -> Value {
    reqwest::Client::new()
        .post(format!("http://{base}{route}"))
        .json(&body)
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json")
}

async fn desktop_token(base: &str) -> String {
    let body = rest_json(base, "/auth/ws-token", json!({})).await;
    body["token"].as_str().expect("token").to_string()
}

async fn mobile_token(base: &str, code: &str) -> String {
    let body = rest_json(base, "/auth/ws-token-mobile", json!({"pair_code": code})).await;
    body["token"].as_str().expect("token").to_string()
}

async fn connect(base: &str, token: &str) -> WsClient {
    let mut request = format!("ws://{base}/ws")
        .into_client_request()
        .expect("request");
    request.headers_mut().insert(
        "Sec-WebSocket-Protocol",
        format!("Bearer.{token}").parse().expect("header"),
    );
    let (ws, _) = connect_async(request).await.expect("connect");
    ws
}

/// Next JSON frame, skipping nothing.
async fn recv_json(ws: &mut WsClient) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame before timeout")
            .expect("stream open")
            .expect("frame");
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).expect("json frame"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn recv_binary(ws: &mut WsClient) -> Vec<u8> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame before timeout")
            .expect("stream open")
            .expect("frame");
        match frame {
            Message::Binary(bytes) => return bytes.to_vec(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn send_json(ws: &mut WsClient, body: Value) {
    ws.send(Message::Text(body.to_string().into()))
        .await
        .expect("send");
}

#[tokio::test]
async fn pairing_fan_out_and_teardown() {
    let base = spawn_gateway().await;

    // desktop creates a code and joins its channel
    let pair = rest_json(&base, "/generate-pair-code", json!({"desktop_session_id": "desk-1"})).await;
    let code = pair["code"].as_str().expect("code").to_string();
    let channel = pair["channel_id"].as_str().expect("channel").to_string();

    let mut desktop = connect(&base, &desktop_token(&base).await).await;
    send_json(
        &mut desktop,
        json!({"type": "identify", "session_id": "desk-1", "device_type": "desktop"}),
    )
    .await;
    let identified = recv_json(&mut desktop).await;
    assert_eq!(identified["type"], "identified");

    send_json(&mut desktop, json!({"type": "join_channel", "channel": channel})).await;
    let joined = recv_json(&mut desktop).await;
    assert_eq!(joined["type"], "channel_joined");
    assert_eq!(joined["channel"], channel);

    // mobile pairs in one step
    let mut mobile = connect(&base, &mobile_token(&base, &code).await).await;
    send_json(
        &mut mobile,
        json!({"type": "mobile_init", "session_id": "mob-1", "pair_code": code}),
    )
    .await;
    let success = recv_json(&mut mobile).await;
    assert_eq!(success["type"], "pairing_success");
    assert_eq!(success["channel"], channel);

    // desktop hears about the pairing and the join, in that order
    let event = recv_json(&mut desktop).await;
    assert_eq!(event["type"], "pairing_success");
    let event = recv_json(&mut desktop).await;
    assert_eq!(event["type"], "client_joined");
    assert_eq!(event["device_type"], "mobile");

    // control fan-out reaches only the peer
    send_json(
        &mut desktop,
        json!({"type": "settings_sync", "settings": {"language": "nl"}}),
    )
    .await;
    let event = recv_json(&mut mobile).await;
    assert_eq!(event["type"], "settings_sync");
    assert_eq!(event["settings"]["language"], "nl");
    assert_eq!(event["from"], "desktop");

    // binary audio from mobile lands on the desktop as binary
    mobile
        .send(Message::Binary(vec![9, 9, 9].into()))
        .await
        .expect("send audio");
    assert_eq!(recv_binary(&mut desktop).await, vec![9, 9, 9]);

    // mobile scope cannot speak the control plane
    send_json(&mut mobile, json!({"type": "ping"})).await;
    let event = recv_json(&mut mobile).await;
    assert_eq!(event["type"], "error");
    assert_eq!(event["code"], "VALIDATION_ERROR");

    // teardown: mobile leaves, desktop is told
    mobile.close(None).await.expect("close");
    let event = recv_json(&mut desktop).await;
    assert_eq!(event["type"], "mobile_disconnected");
    assert_eq!(event["channel"], channel);
}

#[tokio::test]
async fn channel_never_holds_two_desktops() {
    let base = spawn_gateway().await;
    let pair = rest_json(&base, "/generate-pair-code", json!({"desktop_session_id": "desk-1"})).await;
    let channel = pair["channel_id"].as_str().expect("channel").to_string();

    let mut first = connect(&base, &desktop_token(&base).await).await;
    send_json(
        &mut first,
        json!({"type": "identify", "session_id": "d1", "device_type": "desktop"}),
    )
    .await;
    let _ = recv_json(&mut first).await;
    send_json(&mut first, json!({"type": "join_channel", "channel": channel})).await;
    let joined = recv_json(&mut first).await;
    assert_eq!(joined["type"], "channel_joined");

    let mut second = connect(&base, &desktop_token(&base).await).await;
    send_json(
        &mut second,
        json!({"type": "identify", "session_id": "d2", "device_type": "desktop"}),
    )
    .await;
    let _ = recv_json(&mut second).await;
    send_json(&mut second, json!({"type": "join_channel", "channel": channel})).await;
    let rejected = recv_json(&mut second).await;
    assert_eq!(rejected["type"], "error");
    assert_eq!(rejected["code"], "CHANNEL_FULL");
}

#[tokio::test]
async fn admission_requires_a_valid_token() {
    let base = spawn_gateway().await;

    let mut request = format!("ws://{base}/ws")
        .into_client_request()
        .expect("request");
    request.headers_mut().insert(
        "Sec-WebSocket-Protocol",
        "Bearer.garbage".parse().expect("header"),
    );
    assert!(connect_async(request).await.is_err());

    // no subprotocol at all is refused too
    let request = format!("ws://{base}/ws")
        .into_client_request()
        .expect("request");
    assert!(connect_async(request).await.is_err());
}

#[tokio::test]
async fn channels_are_isolated() {
    let base = spawn_gateway().await;

    // two independent pairs
    let pair_a = rest_json(&base, "/generate-pair-code", json!({"desktop_session_id": "da"})).await;
    let pair_b = rest_json(&base, "/generate-pair-code", json!({"desktop_session_id": "db"})).await;
    let chan_a = pair_a["channel_id"].as_str().expect("channel").to_string();
    let chan_b = pair_b["channel_id"].as_str().expect("channel").to_string();

    let mut desk_a = connect(&base, &desktop_token(&base).await).await;
    send_json(&mut desk_a, json!({"type": "identify", "session_id": "da", "device_type": "desktop"})).await;
    let _ = recv_json(&mut desk_a).await;
    send_json(&mut desk_a, json!({"type": "join_channel", "channel": chan_a})).await;
    let _ = recv_json(&mut desk_a).await;

    let mut desk_b = connect(&base, &desktop_token(&base).await).await;
    send_json(&mut desk_b, json!({"type": "identify", "session_id": "db", "device_type": "desktop"})).await;
    let _ = recv_json(&mut desk_b).await;
    send_json(&mut desk_b, json!({"type": "join_channel", "channel": chan_b})).await;
    let _ = recv_json(&mut desk_b).await;

    let mut mob_a = connect(&base, &mobile_token(&base, pair_a["code"].as_str().expect("code")).await).await;
    send_json(
        &mut mob_a,
        json!({"type": "mobile_init", "session_id": "ma", "pair_code": pair_a["code"]}),
    )
    .await;
    let _ = recv_json(&mut mob_a).await;
    // drain desktop A's admin events
    let _ = recv_json(&mut desk_a).await;
    let _ = recv_json(&mut desk_a).await;

    // traffic in channel A must never reach desktop B
    send_json(&mut mob_a, json!({"type": "audio_chunk", "data": "AAAA"})).await;
    let event = recv_json(&mut desk_a).await;
    assert_eq!(event["type"], "audio_chunk");

    send_json(&mut desk_b, json!({"type": "ping", "id": 7})).await;
    let event = recv_json(&mut desk_b).await;
    assert_eq!(event["type"], "pong");
    assert_eq!(event["id"], 7);
}
