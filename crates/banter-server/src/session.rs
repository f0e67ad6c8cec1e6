//! The shared voice session.
//!
//! One actor task owns all mutable session state: chat history, the active
//! character, the in-flight turn, and the audio playback queue. Everything
//! else — socket loops, STT/LLM/TTS calls, the recovery timer — talks to it
//! through [`SessionCommand`]s, so state transitions are applied strictly in
//! command-arrival order and no lock spans a collaborator call.
//!
//! Collaborator results re-join the queue tagged with the turn id they were
//! spawned under; results from an abandoned turn are discarded on arrival.

use crate::api_ws::ServerEvent;
use crate::hub::Hub;
use banter_characters::CharacterRegistry;
use banter_playback::PlaybackQueue;
use banter_stream::{StreamingTurn, TurnPhase};
use banter_types::{Character, ChatTurn, PlaybackState};
use banter_voice::{LlmClient, ServicesConfig, SttClient, TtsClient, VoiceError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use uuid::Uuid;

/// How long the session lingers in the error state before returning to idle.
const ERROR_RECOVERY_DELAY: Duration = Duration::from_secs(2);

/// Transcripts shorter than this (trimmed) are treated as silence or breath
/// noise and dropped without a turn.
const MIN_TRANSCRIPT_CHARS: usize = 2;

/// Voice used when no character is active.
const DEFAULT_VOICE: &str = "af_heart";

/// System prompt when the registry is empty.
const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly character in a spoken conversation. \
     Keep replies short and conversational. Respond with a single JSON object with exactly \
     two keys: \"text\" (what you say out loud) and \"emotion\" (one word for how you feel).";

/// Commands processed by the session actor, in arrival order.
#[derive(Debug)]
pub enum SessionCommand {
    /// A new observer joined and needs the init snapshot.
    ObserverConnected { observer: Uuid },
    /// A client submitted one recorded utterance (base64).
    ProcessAudio {
        audio_b64: String,
        file_name: Option<String>,
    },
    /// A client asked for ad-hoc synthesis, replied to that observer only.
    RequestTts { observer: Uuid, text: String },
    /// Switch the active character, clearing the chat history.
    SwitchCharacter { key: String },
    /// Replace the active character's custom instructions.
    SetInstructions { instructions: String },
    /// Point-in-time session view for the HTTP API.
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },

    // Collaborator results, tagged with the turn they belong to.
    TranscriptReady {
        turn_id: u64,
        result: Result<String, VoiceError>,
    },
    ReplyChunk { turn_id: u64, chunk: String },
    ReplyStreamEnded {
        turn_id: u64,
        result: Result<(), VoiceError>,
    },
    SegmentSynthesized {
        turn_id: u64,
        seq: u64,
        result: Result<Vec<u8>, VoiceError>,
    },
    AdhocSynthesized {
        observer: Uuid,
        result: Result<Vec<u8>, VoiceError>,
    },
    /// Fired by the recovery timer after an error.
    RecoverIdle { turn_id: u64 },
}

/// Point-in-time view of the session for read-only consumers.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub current_character_key: Option<String>,
    pub chat_history: Vec<ChatTurn>,
    pub status: String,
}

/// Cheap handle for submitting commands to the session actor.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) {
        if self.tx.send(command).await.is_err() {
            tracing::error!("session task is gone; dropping command");
        }
    }

    /// Requests a snapshot, returning `None` if the actor is gone.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot { reply }).await;
        rx.await.ok()
    }
}

/// The actor state. Owned by exactly one task; never shared.
struct Session {
    hub: Hub,
    registry: Arc<RwLock<CharacterRegistry>>,
    stt: SttClient,
    llm: LlmClient,
    tts: TtsClient,
    /// Loops collaborator results back into the command queue.
    tx: mpsc::Sender<SessionCommand>,

    history: Vec<ChatTurn>,
    active: Option<String>,
    phase: TurnPhase,
    status: PlaybackState,
    /// Bumped whenever a turn starts or is abandoned; results carrying an
    /// older id are stale.
    turn_id: u64,
    turn: Option<StreamingTurn>,
    queue: PlaybackQueue,
    /// Whether this turn's `Speaking` status has been broadcast.
    speaking_announced: bool,
}

/// Starts the session actor and returns its handle.
///
/// The initial active character is the registry's default key.
pub async fn spawn(
    registry: Arc<RwLock<CharacterRegistry>>,
    services: &ServicesConfig,
    hub: Hub,
) -> Result<SessionHandle, VoiceError> {
    let http = services.build_http_client()?;
    let (tx, rx) = mpsc::channel(64);

    let active = registry
        .read()
        .await
        .default_key()
        .map(ToString::to_string);

    let session = Session {
        hub,
        registry,
        stt: SttClient::new(http.clone(), services),
        llm: LlmClient::new(http.clone(), services),
        tts: TtsClient::new(http, services),
        tx: tx.clone(),
        history: Vec::new(),
        active,
        phase: TurnPhase::Idle,
        status: PlaybackState::Idle,
        turn_id: 0,
        turn: None,
        queue: PlaybackQueue::new(),
        speaking_announced: false,
    };
    tokio::spawn(session.run(rx));

    Ok(SessionHandle { tx })
}

impl Session {
    async fn run(mut self, mut rx: mpsc::Receiver<SessionCommand>) {
        while let Some(command) = rx.recv().await {
            self.handle(command).await;
        }
        tracing::info!("session command channel closed, actor exiting");
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::ObserverConnected { observer } => {
                self.send_init_state(observer).await;
            }
            SessionCommand::ProcessAudio {
                audio_b64,
                file_name,
            } => {
                self.process_audio(audio_b64, file_name).await;
            }
            SessionCommand::RequestTts { observer, text } => {
                self.request_adhoc_tts(observer, text).await;
            }
            SessionCommand::SwitchCharacter { key } => {
                self.switch_character(key).await;
            }
            SessionCommand::SetInstructions { instructions } => {
                self.set_instructions(instructions).await;
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(SessionSnapshot {
                    current_character_key: self.active.clone(),
                    chat_history: self.history.clone(),
                    status: self.status.label().to_string(),
                });
            }
            SessionCommand::TranscriptReady { turn_id, result } => {
                if turn_id != self.turn_id {
                    tracing::debug!(turn_id, "discarding stale transcript");
                    return;
                }
                self.transcript_ready(result).await;
            }
            SessionCommand::ReplyChunk { turn_id, chunk } => {
                if turn_id != self.turn_id {
                    tracing::debug!(turn_id, "discarding stale reply chunk");
                    return;
                }
                self.reply_chunk(chunk).await;
            }
            SessionCommand::ReplyStreamEnded { turn_id, result } => {
                if turn_id != self.turn_id {
                    tracing::debug!(turn_id, "discarding stale reply completion");
                    return;
                }
                match result {
                    Ok(()) => self.reply_stream_ended().await,
                    Err(e) => self.fail_turn("language model", &e).await,
                }
            }
            SessionCommand::SegmentSynthesized {
                turn_id,
                seq,
                result,
            } => {
                if turn_id != self.turn_id {
                    tracing::debug!(turn_id, seq, "discarding stale audio segment");
                    return;
                }
                self.segment_synthesized(seq, result).await;
            }
            SessionCommand::AdhocSynthesized { observer, result } => match result {
                Ok(audio) => {
                    self.hub
                        .send(
                            observer,
                            &ServerEvent::PlayAudio {
                                audio: BASE64.encode(&audio),
                            },
                        )
                        .await;
                }
                Err(e) => {
                    tracing::warn!(observer = %observer, "ad-hoc synthesis failed: {e}");
                    self.hub
                        .send(
                            observer,
                            &ServerEvent::Error {
                                message: "speech synthesis failed".to_string(),
                            },
                        )
                        .await;
                }
            },
            SessionCommand::RecoverIdle { turn_id } => {
                if turn_id == self.turn_id && self.phase == TurnPhase::Error {
                    self.phase = TurnPhase::Idle;
                    self.push_status(PlaybackState::Idle).await;
                }
            }
        }
    }

    async fn send_init_state(&self, observer: Uuid) {
        let event = {
            let registry = self.registry.read().await;
            ServerEvent::InitState {
                characters: registry.summaries(),
                current_character_key: self.active.clone(),
                chat_history: self.history.clone(),
                status: self.status.label().to_string(),
            }
        };
        self.hub.send(observer, &event).await;
    }

    async fn process_audio(&mut self, audio_b64: String, file_name: Option<String>) {
        if self.phase != TurnPhase::Idle {
            tracing::warn!(phase = ?self.phase, "ignoring audio while a turn is in progress");
            return;
        }
        let audio = match BASE64.decode(audio_b64.as_bytes()) {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!("rejecting undecodable audio payload: {e}");
                return;
            }
        };

        self.turn_id += 1;
        self.phase = TurnPhase::Transcribing;
        self.queue = PlaybackQueue::new();
        self.speaking_announced = false;
        self.turn = None;
        self.push_status(PlaybackState::Transcribing).await;

        let stt = self.stt.clone();
        let tx = self.tx.clone();
        let turn_id = self.turn_id;
        tokio::spawn(async move {
            let result = stt.transcribe(audio, file_name).await;
            let _ = tx
                .send(SessionCommand::TranscriptReady { turn_id, result })
                .await;
        });
    }

    async fn transcript_ready(&mut self, result: Result<String, VoiceError>) {
        let transcript = match result {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                self.fail_turn("transcription", &e).await;
                return;
            }
        };

        // Silence and breath noise transcribe to nearly nothing; the turn
        // ends without an error and without touching the history.
        if transcript.chars().count() < MIN_TRANSCRIPT_CHARS {
            tracing::debug!("transcript below minimum length, dropping turn");
            self.phase = TurnPhase::Idle;
            self.push_status(PlaybackState::Idle).await;
            return;
        }

        let entry = ChatTurn::user(transcript.clone());
        self.history.push(entry.clone());
        self.hub.broadcast(&ServerEvent::ChatMessage(entry)).await;

        self.phase = TurnPhase::Thinking;
        self.push_status(PlaybackState::Thinking).await;

        let system_prompt = build_system_prompt(self.active_character().await.as_ref());
        let llm = self.llm.clone();
        let tx = self.tx.clone();
        let turn_id = self.turn_id;
        tokio::spawn(async move {
            let result = pump_reply_stream(&llm, &transcript, &system_prompt, turn_id, &tx).await;
            let _ = tx
                .send(SessionCommand::ReplyStreamEnded { turn_id, result })
                .await;
        });
    }

    async fn reply_chunk(&mut self, chunk: String) {
        if self.phase == TurnPhase::Thinking {
            self.phase = TurnPhase::Streaming;
            self.turn = Some(StreamingTurn::new());
            self.hub.broadcast(&ServerEvent::StreamStart).await;
        }
        let delta = match self.turn.as_mut() {
            Some(turn) => turn.push_chunk(&chunk),
            None => return,
        };

        if !delta.appended_text.is_empty() {
            self.hub
                .broadcast(&ServerEvent::StreamChunk {
                    text: delta.appended_text,
                })
                .await;
        }
        for sentence in delta.new_sentences {
            self.request_synthesis(sentence).await;
        }
    }

    async fn reply_stream_ended(&mut self) {
        // A 200 with an empty body never delivered a chunk, so the stream was
        // never opened toward observers. Open it here so STREAM_START and
        // STREAM_END always arrive as a pair.
        if self.phase == TurnPhase::Thinking {
            self.turn = Some(StreamingTurn::new());
            self.hub.broadcast(&ServerEvent::StreamStart).await;
        }
        self.phase = TurnPhase::Draining;
        let finished = self.turn.take().unwrap_or_default().finish();

        // Emotions the character has no portrait for are dropped.
        let character = self.active_character().await;
        let emotion = finished
            .emotion
            .filter(|e| character.as_ref().is_none_or(|c| c.has_emotion(e)));

        for sentence in finished.trailing_sentences {
            self.request_synthesis(sentence).await;
        }

        if !finished.text.trim().is_empty() {
            let entry = ChatTurn::assistant(finished.text, emotion.clone());
            self.history.push(entry.clone());
            self.hub.broadcast(&ServerEvent::ChatMessage(entry)).await;
        }
        self.hub
            .broadcast(&ServerEvent::StreamEnd { emotion })
            .await;

        self.queue.end_of_stream();
        self.finish_audio_if_drained().await;
    }

    async fn segment_synthesized(&mut self, seq: u64, result: Result<Vec<u8>, VoiceError>) {
        let released = match result {
            Ok(audio) => self.queue.complete(seq, audio),
            Err(e) => {
                // One sentence loses its audio; the turn carries on.
                tracing::warn!(seq, "sentence synthesis failed, skipping segment: {e}");
                self.queue.fail(seq)
            }
        };
        for segment in released {
            self.hub
                .broadcast(&ServerEvent::PlayAudio {
                    audio: BASE64.encode(&segment.audio),
                })
                .await;
        }
        self.finish_audio_if_drained().await;
    }

    /// Reserves the next playback position and spawns its synthesis call.
    async fn request_synthesis(&mut self, sentence: String) {
        if !self.speaking_announced {
            self.speaking_announced = true;
            self.push_status(PlaybackState::Speaking).await;
        }
        let seq = self.queue.register();
        let voice = self
            .active_character()
            .await
            .map(|c| c.voice)
            .unwrap_or_else(|| DEFAULT_VOICE.to_string());

        let tts = self.tts.clone();
        let tx = self.tx.clone();
        let turn_id = self.turn_id;
        tokio::spawn(async move {
            let result = tts.synthesize(&sentence, &voice).await;
            let _ = tx
                .send(SessionCommand::SegmentSynthesized {
                    turn_id,
                    seq,
                    result,
                })
                .await;
        });
    }

    async fn finish_audio_if_drained(&mut self) {
        if self.queue.take_terminal() {
            self.hub.broadcast(&ServerEvent::AudioStreamEnd).await;
            if self.phase == TurnPhase::Draining {
                self.phase = TurnPhase::Idle;
                self.push_status(PlaybackState::Idle).await;
            }
        }
    }

    async fn request_adhoc_tts(&mut self, observer: Uuid, text: String) {
        if text.trim().is_empty() {
            tracing::debug!(observer = %observer, "ignoring empty ad-hoc synthesis request");
            return;
        }
        let voice = self
            .active_character()
            .await
            .map(|c| c.voice)
            .unwrap_or_else(|| DEFAULT_VOICE.to_string());

        let tts = self.tts.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = tts.synthesize(&text, &voice).await;
            let _ = tx
                .send(SessionCommand::AdhocSynthesized { observer, result })
                .await;
        });
    }

    async fn switch_character(&mut self, key: String) {
        let instructions = {
            let registry = self.registry.read().await;
            match registry.get(&key) {
                Some(character) => character.instructions.clone().unwrap_or_default(),
                None => {
                    tracing::warn!(key = %key, "ignoring switch to unknown character");
                    return;
                }
            }
        };

        // Abandon anything in flight; late results will carry the old id.
        self.turn_id += 1;
        self.phase = TurnPhase::Idle;
        self.turn = None;
        self.queue = PlaybackQueue::new();
        self.speaking_announced = false;
        self.history.clear();
        self.active = Some(key.clone());

        tracing::info!(key = %key, "switched active character");
        self.hub
            .broadcast(&ServerEvent::CharacterSwitched { key, instructions })
            .await;
        self.hub.broadcast(&ServerEvent::ChatClear).await;
        self.push_status(PlaybackState::Idle).await;
    }

    async fn set_instructions(&mut self, instructions: String) {
        let Some(key) = self.active.clone() else {
            tracing::warn!("cannot set instructions: no active character");
            return;
        };
        let mut registry = self.registry.write().await;
        if let Err(e) = registry.set_instructions(&key, &instructions).await {
            tracing::error!(key = %key, "failed to persist instructions: {e}");
        }
    }

    async fn fail_turn(&mut self, stage: &str, error: &VoiceError) {
        tracing::error!(stage, "turn failed: {error}");
        self.phase = TurnPhase::Error;
        self.turn = None;
        // Dropping the queue also discards any audio still in flight.
        self.queue = PlaybackQueue::new();
        self.push_status(PlaybackState::Error).await;

        let tx = self.tx.clone();
        let turn_id = self.turn_id;
        tokio::spawn(async move {
            tokio::time::sleep(ERROR_RECOVERY_DELAY).await;
            let _ = tx.send(SessionCommand::RecoverIdle { turn_id }).await;
        });
    }

    /// Broadcasts a status change unless audio playback currently owns the
    /// user-visible status. Errors always get through.
    async fn push_status(&mut self, state: PlaybackState) {
        if self.queue.is_active() && state != PlaybackState::Error {
            tracing::debug!(status = %state, "suppressing status update while audio is playing");
            return;
        }
        self.status = state;
        self.hub
            .broadcast(&ServerEvent::StatusUpdate {
                status: state.label().to_string(),
            })
            .await;
    }

    async fn active_character(&self) -> Option<Character> {
        let key = self.active.clone()?;
        self.registry.read().await.get(&key).cloned()
    }
}

/// Forwards the reply byte stream into the command queue, re-chunked on
/// UTF-8 boundaries. Returns when the stream ends or errors.
async fn pump_reply_stream(
    llm: &LlmClient,
    prompt: &str,
    system_prompt: &str,
    turn_id: u64,
    tx: &mpsc::Sender<SessionCommand>,
) -> Result<(), VoiceError> {
    let mut stream = llm.generate(prompt, system_prompt).await?;
    let mut pending: Vec<u8> = Vec::new();

    while let Some(item) = stream.next().await {
        let bytes = item?;
        pending.extend_from_slice(&bytes);
        let chunk = take_utf8_prefix(&mut pending);
        if !chunk.is_empty() {
            let _ = tx.send(SessionCommand::ReplyChunk { turn_id, chunk }).await;
        }
    }

    // A trailing invalid fragment means the upstream truncated mid-character.
    if !pending.is_empty() {
        let chunk = String::from_utf8_lossy(&pending).into_owned();
        let _ = tx.send(SessionCommand::ReplyChunk { turn_id, chunk }).await;
    }
    Ok(())
}

/// Splits off the longest valid UTF-8 prefix of `pending`, leaving any
/// trailing partial character in place for the next network chunk.
fn take_utf8_prefix(pending: &mut Vec<u8>) -> String {
    let valid_up_to = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(e) => e.valid_up_to(),
    };
    let rest = pending.split_off(valid_up_to);
    let prefix = std::mem::replace(pending, rest);
    String::from_utf8(prefix).unwrap_or_default()
}

/// Builds the system prompt for the active character: persona, reply format,
/// and the emotions its portrait set can express.
fn build_system_prompt(character: Option<&Character>) -> String {
    let Some(character) = character else {
        return DEFAULT_SYSTEM_PROMPT.to_string();
    };

    let emotions = character.valid_emotions().join(", ");
    let mut prompt = format!(
        "You are {}, an expressive character in a spoken conversation. Keep replies \
         short and conversational; they will be read aloud. Respond with a single JSON \
         object with exactly two keys: \"text\" (what you say out loud) and \"emotion\" \
         (one of: {emotions}).",
        character.name
    );
    if let Some(instructions) = &character.instructions {
        prompt.push_str("\n\nIMPORTANT INSTRUCTIONS:\n");
        prompt.push_str(instructions);
    }
    prompt
}
