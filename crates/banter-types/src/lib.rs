//! Shared types for the banter voice-character relay.
//!
//! This crate provides the foundational types used across all banter crates:
//! the session-visible playback state, chat history entries, and character
//! definitions. No crate in the workspace depends on anything *except*
//! `banter-types` for cross-cutting type definitions, which keeps the
//! dependency graph clean and prevents circular dependencies.

pub mod character;

pub use character::{Character, CharacterSummary};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The single session-visible processing state.
///
/// Exactly one value is active at a time. Text-side transitions are driven by
/// the turn controller; the terminal return to [`PlaybackState::Idle`] after a
/// spoken reply is driven by the audio playback queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Ready for the next utterance.
    Idle,
    /// Microphone capture in progress on the client.
    Listening,
    /// Audio handed to the STT collaborator.
    Transcribing,
    /// Waiting for the first token from the language model.
    Thinking,
    /// Reply audio is being synthesized or played.
    Speaking,
    /// An upstream collaborator failed; recovers to `Idle` after a delay.
    Error,
    /// No active client connection.
    Disconnected,
}

impl PlaybackState {
    /// The user-facing status label, matching what the frontend renders.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Listening => "Listening...",
            Self::Transcribing => "Transcribing...",
            Self::Thinking => "Thinking...",
            Self::Speaking => "Speaking...",
            Self::Error => "Error",
            Self::Disconnected => "Disconnected",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Who produced a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// One entry in the session's turn history.
///
/// Append-only within a turn; the whole history is cleared on character
/// switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Who spoke.
    pub role: Speaker,
    /// The spoken/displayed text.
    pub content: String,
    /// Emotion tag for assistant turns, when the model supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
}

impl ChatTurn {
    /// Builds a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Speaker::User,
            content: content.into(),
            emotion: None,
        }
    }

    /// Builds an assistant turn with an optional emotion tag.
    pub fn assistant(content: impl Into<String>, emotion: Option<String>) -> Self {
        Self {
            role: Speaker::Assistant,
            content: content.into(),
            emotion,
        }
    }
}
