//! WebSocket API: wire envelopes and the per-connection socket loop.
//!
//! Every frame is a JSON envelope `{"type": ..., "payload": ...}`. Client
//! commands are forwarded to the shared session controller; server events
//! arrive through this observer's hub buffer and are written to the socket by
//! a dedicated forward task.

use crate::session::SessionCommand;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use banter_types::{CharacterSummary, ChatTurn};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maximum accepted base64 audio payload (14 MiB of text, ~10 MiB decoded).
/// Matches the upload ceiling the STT client enforces on the decoded bytes.
const MAX_AUDIO_B64_LEN: usize = 14 * 1024 * 1024;

/// Commands a client may send over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientCommand {
    /// One recorded utterance, base64-encoded, starting a full voice turn.
    #[serde(rename = "PROCESS_AUDIO")]
    ProcessAudio {
        audio: String,
        #[serde(rename = "fileName", default)]
        file_name: Option<String>,
    },
    /// Ad-hoc synthesis of arbitrary text, replied to this observer only.
    #[serde(rename = "REQUEST_TTS")]
    RequestTts { text: String },
    /// Switch the shared session to a different character.
    #[serde(rename = "SWITCH_CHARACTER")]
    SwitchCharacter { key: String },
    /// Replace the active character's custom instructions.
    #[serde(rename = "SET_INSTRUCTIONS")]
    SetInstructions { instructions: String },
}

/// Events the server pushes to observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    /// Full session snapshot sent to a newly connected observer.
    #[serde(rename = "INIT_STATE")]
    InitState {
        characters: BTreeMap<String, CharacterSummary>,
        #[serde(rename = "currentCharacterKey")]
        current_character_key: Option<String>,
        #[serde(rename = "chatHistory")]
        chat_history: Vec<ChatTurn>,
        status: String,
    },
    /// The session-visible status label changed.
    #[serde(rename = "STATUS_UPDATE")]
    StatusUpdate { status: String },
    /// A finalized chat history entry (user transcript or assistant reply).
    #[serde(rename = "CHAT_MESSAGE")]
    ChatMessage(ChatTurn),
    /// The assistant reply stream opened.
    #[serde(rename = "STREAM_START")]
    StreamStart,
    /// Newly decoded reply text, in arrival order.
    #[serde(rename = "STREAM_CHUNK")]
    StreamChunk { text: String },
    /// The reply text is complete.
    #[serde(rename = "STREAM_END")]
    StreamEnd { emotion: Option<String> },
    /// One synthesized audio segment, dispatched strictly in sentence order.
    #[serde(rename = "PLAY_AUDIO")]
    PlayAudio { audio: String },
    /// Every audio segment of the turn has been dispatched or skipped.
    #[serde(rename = "AUDIO_STREAM_END")]
    AudioStreamEnd,
    /// The shared session now speaks as a different character.
    #[serde(rename = "CHARACTER_SWITCHED")]
    CharacterSwitched {
        key: String,
        instructions: String,
    },
    /// The chat history was discarded.
    #[serde(rename = "CHAT_CLEAR")]
    ChatClear,
    /// A client command could not be processed.
    #[serde(rename = "ERROR")]
    Error { message: String },
}

/// WebSocket handler: `GET /ws`.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles one WebSocket connection for its lifetime.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (observer, mut rx) = state.hub.register().await;

    // Forward hub events to the socket until either side goes away.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(WsMessage::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // The new observer gets the current session snapshot.
    state
        .session
        .send(SessionCommand::ObserverConnected { observer })
        .await;

    while let Some(Ok(msg)) = receiver.next().await {
        let WsMessage::Text(text) = msg else { continue };
        let command = match serde_json::from_str::<ClientCommand>(&text) {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!(observer = %observer, "unparseable client frame: {e}");
                state
                    .hub
                    .send(
                        observer,
                        &ServerEvent::Error {
                            message: "unrecognized command".to_string(),
                        },
                    )
                    .await;
                continue;
            }
        };

        match command {
            ClientCommand::ProcessAudio { audio, file_name } => {
                if audio.len() > MAX_AUDIO_B64_LEN {
                    state
                        .hub
                        .send(
                            observer,
                            &ServerEvent::Error {
                                message: "audio payload too large".to_string(),
                            },
                        )
                        .await;
                    continue;
                }
                state
                    .session
                    .send(SessionCommand::ProcessAudio {
                        audio_b64: audio,
                        file_name,
                    })
                    .await;
            }
            ClientCommand::RequestTts { text } => {
                state
                    .session
                    .send(SessionCommand::RequestTts { observer, text })
                    .await;
            }
            ClientCommand::SwitchCharacter { key } => {
                state
                    .session
                    .send(SessionCommand::SwitchCharacter { key })
                    .await;
            }
            ClientCommand::SetInstructions { instructions } => {
                state
                    .session
                    .send(SessionCommand::SetInstructions { instructions })
                    .await;
            }
        }
    }

    state.hub.unregister(observer).await;
    send_task.abort();
    tracing::debug!(observer = %observer, "websocket closed");
}
