//! REST surface integration tests with a mocked ASR upstream.

use base64::Engine;
use mondstuk::asr::HttpAsr;
use mondstuk::config::GatewayConfig;
use mondstuk::lexicon::MemoryStore;
use mondstuk::server::{GatewayState, app};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn lexicon_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(
        json!({
            "tandheelkunde": {
                "cariës": ["caries", "karies"],
                "ca.": []
            },
            "afkortingen_abbr": {
                "ca.": ["circa"]
            }
        }),
        json!(["OPG"]),
        json!({
            "phonetic": {"enabled": true, "threshold": 0.84},
            "normalization": {}
        }),
    ))
}

async fn spawn_gateway(mock_asr_url: &str, config: GatewayConfig) -> String {
    let asr = HttpAsr::new(mock_asr_url, None, "whisper-1", Duration::from_secs(5))
        .expect("asr client");
    let state = GatewayState::assemble(config, lexicon_store(), Arc::new(asr));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.expect("serve");
    });
    format!("http://{addr}")
}

async fn mock_asr(text: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": text,
            "language": "nl",
            "duration": 1.2
        })))
        .mount(&server)
        .await;
    server
}

fn audio_b64() -> String {
    base64::engine::general_purpose::STANDARD.encode(vec![0u8; 2048])
}

#[tokio::test]
async fn transcribe_returns_raw_and_normalized() {
    let asr = mock_asr("de 11 en caries circa drie weken.").await;
    let base = spawn_gateway(&format!("{}/v1/audio/transcriptions", asr.uri()), GatewayConfig::default()).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/transcribe"))
        .json(&json!({
            "audio_data": audio_b64(),
            "language": "nl",
            "prompt": "",
            "format": "webm"
        }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.expect("json");
    assert_eq!(body["raw"], "de 11 en caries circa drie weken.");
    assert_eq!(body["normalized"], "element 11 en cariës ca. drie weken");
    assert_eq!(body["text"], body["normalized"]);
    assert_eq!(body["language"], "nl");
    assert_eq!(body["provider"], "whisper-http");
    assert_eq!(body["model"], "whisper-1");
    assert!((body["duration"].as_f64().expect("duration") - 1.2).abs() < 1e-9);
}

#[tokio::test]
async fn transcribe_rejects_bad_base64() {
    let asr = mock_asr("x").await;
    let base = spawn_gateway(&format!("{}/v1/audio/transcriptions", asr.uri()), GatewayConfig::default()).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/transcribe"))
        .json(&json!({
            "audio_data": "@@not-base64@@",
            "format": "webm"
        }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("json");
    assert!(body["detail"].as_str().expect("detail").contains("base64"));
}

#[tokio::test]
async fn transcribe_maps_payload_too_large() {
    let asr = mock_asr("x").await;
    let mut config = GatewayConfig::default();
    config.limits.max_upload_bytes = 512;
    let base = spawn_gateway(&format!("{}/v1/audio/transcriptions", asr.uri()), config).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/transcribe"))
        .json(&json!({
            "audio_data": audio_b64(),
            "format": "webm"
        }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 413);
}

#[tokio::test]
async fn transcribe_rejects_unknown_format() {
    let asr = mock_asr("x").await;
    let base = spawn_gateway(&format!("{}/v1/audio/transcriptions", asr.uri()), GatewayConfig::default()).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/transcribe"))
        .json(&json!({
            "audio_data": audio_b64(),
            "format": "flac"
        }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 415);
}

#[tokio::test]
async fn transcribe_propagates_upstream_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad audio"))
        .mount(&server)
        .await;
    let base = spawn_gateway(&format!("{}/v1/audio/transcriptions", server.uri()), GatewayConfig::default()).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/transcribe"))
        .json(&json!({
            "audio_data": audio_b64(),
            "format": "webm"
        }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn pairing_flow_over_rest() {
    let asr = mock_asr("x").await;
    let base = spawn_gateway(&format!("{}/v1/audio/transcriptions", asr.uri()), GatewayConfig::default()).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{base}/generate-pair-code"))
        .json(&json!({"desktop_session_id": "desk-1"}))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    let code = body["code"].as_str().expect("code").to_string();
    assert_eq!(code.len(), 6);
    assert_eq!(body["channel_id"], format!("pair-{code}"));

    let body: Value = client
        .post(format!("{base}/pair-device"))
        .json(&json!({"code": code, "mobile_session_id": "mob-1"}))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(body["success"], true);
    assert_eq!(body["channel_id"], format!("pair-{code}"));

    // a second claim of the same code fails
    let body: Value = client
        .post(format!("{base}/pair-device"))
        .json(&json!({"code": code, "mobile_session_id": "mob-2"}))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "ALREADY_PAIRED");

    // unknown codes are invalid
    let body: Value = client
        .post(format!("{base}/pair-device"))
        .json(&json!({"code": "000000", "mobile_session_id": "mob-3"}))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "INVALID_CODE");
}

#[tokio::test]
async fn expired_code_cannot_be_claimed() {
    let asr = mock_asr("x").await;
    let mut config = GatewayConfig::default();
    config.pairing.code_ttl_secs = 0;
    let base = spawn_gateway(&format!("{}/v1/audio/transcriptions", asr.uri()), config).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{base}/generate-pair-code"))
        .json(&json!({"desktop_session_id": "desk-1"}))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    let code = body["code"].as_str().expect("code").to_string();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let body: Value = client
        .post(format!("{base}/pair-device"))
        .json(&json!({"code": code, "mobile_session_id": "mob-1"}))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "CODE_EXPIRED");
}

#[tokio::test]
async fn ws_tokens_are_minted_with_scopes() {
    let asr = mock_asr("x").await;
    let base = spawn_gateway(&format!("{}/v1/audio/transcriptions", asr.uri()), GatewayConfig::default()).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{base}/auth/ws-token"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body["expires_in"].as_u64().is_some_and(|e| e > 0));

    // mobile tokens need a live pair code
    let response = client
        .post(format!("{base}/auth/ws-token-mobile"))
        .json(&json!({"pair_code": "123456"}))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 400);

    let pair: Value = client
        .post(format!("{base}/generate-pair-code"))
        .json(&json!({"desktop_session_id": "desk"}))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    let code = pair["code"].as_str().expect("code");
    let body: Value = client
        .post(format!("{base}/auth/ws-token-mobile"))
        .json(&json!({"pair_code": code}))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(body["channel"], format!("pair-{code}"));
}
