//! Shared harness: an in-process mock of the STT/LLM/TTS services plus a
//! fully wired banter server on an ephemeral port.

use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use banter_characters::CharacterRegistry;
use banter_server::{app, hub::Hub, session, AppState};
use banter_voice::ServicesConfig;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::{stream, SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Scripted behavior for the mock AI services.
#[derive(Debug, Default)]
pub struct MockAi {
    /// Body the LLM streams back, in small chunks.
    pub llm_body: String,
    /// Sentences containing this marker synthesize slowly (300 ms), forcing
    /// out-of-order completion.
    pub slow_tts_marker: Option<String>,
    /// Sentences containing this marker fail synthesis with a 500.
    pub fail_tts_marker: Option<String>,
    /// Whether the LLM endpoint answers 500 instead of streaming.
    pub fail_llm: bool,
}

/// STT mock: echoes the uploaded bytes back as the transcript.
async fn stt_handler(mut multipart: Multipart) -> Response {
    let Ok(Some(field)) = multipart.next_field().await else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let bytes = field.bytes().await.unwrap_or_default();
    let text = String::from_utf8_lossy(&bytes).into_owned();
    Json(json!({ "text": text })).into_response()
}

async fn llm_handler(State(mock): State<Arc<MockAi>>, Json(body): Json<Value>) -> Response {
    assert!(body.get("prompt").is_some());
    assert!(body.get("system_prompt").is_some());
    if mock.fail_llm {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let chunks: Vec<Result<String, std::io::Error>> = mock
        .llm_body
        .as_bytes()
        .chunks(7)
        .map(|c| Ok(String::from_utf8_lossy(c).into_owned()))
        .collect();
    Body::from_stream(stream::iter(chunks)).into_response()
}

async fn tts_handler(State(mock): State<Arc<MockAi>>, Json(body): Json<Value>) -> Response {
    let text = body["text"].as_str().unwrap_or_default().to_string();
    if let Some(marker) = &mock.fail_tts_marker {
        if text.contains(marker.as_str()) {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    if let Some(marker) = &mock.slow_tts_marker {
        if text.contains(marker.as_str()) {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
    }
    format!("wav:{text}").into_bytes().into_response()
}

async fn start_mock_services(mock: MockAi) -> ServicesConfig {
    let router = Router::new()
        .route("/stt", post(stt_handler))
        .route("/llm", post(llm_handler))
        .route("/tts", post(tts_handler))
        .with_state(Arc::new(mock));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    ServicesConfig {
        base_url: format!("http://{addr}"),
        ..ServicesConfig::default()
    }
}

async fn write_character(dir: &std::path::Path, key: &str, name: &str, voice: &str) {
    let char_dir = dir.join(key);
    tokio::fs::create_dir_all(&char_dir).await.unwrap();
    let config = json!({
        "name": name,
        "voice": voice,
        "images": {
            "neutral": "neutral.png",
            "happy": "happy.png",
            "talking": "talking.png"
        }
    });
    tokio::fs::write(char_dir.join("config.json"), config.to_string())
        .await
        .unwrap();
}

/// A running banter server wired to mock AI services.
pub struct TestServer {
    pub addr: SocketAddr,
    /// Owns the on-disk character configs; dropped with the test.
    pub characters_dir: TempDir,
}

/// Starts the full stack: tempdir characters "juniper" and "sage", the mock
/// services, the session actor, and the axum server.
pub async fn start_server(mock: MockAi) -> TestServer {
    let characters_dir = tempfile::tempdir().unwrap();
    write_character(characters_dir.path(), "juniper", "Juniper", "af_heart").await;
    write_character(characters_dir.path(), "sage", "Sage", "am_onyx").await;

    let services = start_mock_services(mock).await;
    let registry = Arc::new(RwLock::new(
        CharacterRegistry::load(characters_dir.path()).await.unwrap(),
    ));
    let hub = Hub::new();
    let session = session::spawn(registry.clone(), &services, hub.clone())
        .await
        .unwrap();

    let router = app(AppState {
        registry,
        hub,
        session,
        frontend_dir: "does-not-exist".to_string(),
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestServer {
        addr,
        characters_dir,
    }
}

/// Connects an observer and consumes its INIT_STATE, returning both.
pub async fn connect(addr: SocketAddr) -> (WsClient, Value) {
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("failed to connect");
    let init = next_event(&mut ws).await;
    assert_eq!(init["type"], "INIT_STATE");
    (ws, init)
}

/// Sends one client envelope.
pub async fn send(ws: &mut WsClient, envelope: Value) {
    ws.send(Message::Text(envelope.to_string().into()))
        .await
        .expect("failed to send");
}

/// Reads the next text frame as JSON, with a generous timeout.
pub async fn next_event(ws: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("invalid event JSON");
        }
    }
}

/// Collects events until (and including) the first one matching `stop`.
pub async fn collect_until(ws: &mut WsClient, stop: impl Fn(&Value) -> bool) -> Vec<Value> {
    let mut events = Vec::new();
    loop {
        let event = next_event(ws).await;
        let done = stop(&event);
        events.push(event);
        if done {
            return events;
        }
    }
}

/// True for a STATUS_UPDATE event carrying the given label.
pub fn is_status(event: &Value, label: &str) -> bool {
    event["type"] == "STATUS_UPDATE" && event["payload"]["status"] == label
}

/// The decoded audio payloads of every PLAY_AUDIO event, in order.
pub fn play_audio_payloads(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .filter(|e| e["type"] == "PLAY_AUDIO")
        .map(|e| {
            let bytes = BASE64
                .decode(e["payload"]["audio"].as_str().unwrap())
                .unwrap();
            String::from_utf8(bytes).unwrap()
        })
        .collect()
}

/// The status labels of every STATUS_UPDATE event, in order.
pub fn status_sequence(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .filter(|e| e["type"] == "STATUS_UPDATE")
        .map(|e| e["payload"]["status"].as_str().unwrap().to_string())
        .collect()
}

/// A PROCESS_AUDIO envelope whose (mock-transcribed) content is `text`.
pub fn process_audio(text: &str) -> Value {
    json!({
        "type": "PROCESS_AUDIO",
        "payload": { "audio": BASE64.encode(text.as_bytes()), "fileName": "clip.webm" }
    })
}
