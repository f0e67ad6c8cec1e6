//! Character definitions.
//!
//! A character record maps a display name and TTS voice to a set of
//! emotion-keyed portrait assets, plus optional custom instructions that are
//! appended to the system prompt. Records are owned by the character registry
//! collaborator and loaded from per-character `config.json` files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Image-map keys that are UI states rather than expressible emotions.
///
/// These are excluded when listing the emotions the model may choose from.
pub const NON_EMOTION_IMAGE_KEYS: [&str; 3] = ["talking", "listening", "thinking"];

/// A full character definition as stored in its `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    /// Display name.
    pub name: String,
    /// Voice identifier passed to the TTS collaborator.
    pub voice: String,
    /// Emotion (or UI state) -> portrait asset path.
    ///
    /// `BTreeMap` so serialized configs and prompt emotion lists are stable.
    #[serde(default)]
    pub images: BTreeMap<String, String>,
    /// Custom instructions appended to the system prompt, editable at runtime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl Character {
    /// The emotions the model is allowed to pick, derived from the image map
    /// minus the non-emotion UI states.
    pub fn valid_emotions(&self) -> Vec<&str> {
        self.images
            .keys()
            .map(String::as_str)
            .filter(|k| !NON_EMOTION_IMAGE_KEYS.contains(k))
            .collect()
    }

    /// Whether the character has a portrait for the given emotion.
    pub fn has_emotion(&self, emotion: &str) -> bool {
        self.images.contains_key(emotion)
    }
}

/// Public-facing character data exposed over the HTTP API and in the
/// WebSocket init payload. Deliberately excludes instructions and asset
/// internals beyond the image map the frontend needs for portraits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSummary {
    pub name: String,
    pub voice: String,
    #[serde(default)]
    pub images: BTreeMap<String, String>,
}

impl From<&Character> for CharacterSummary {
    fn from(c: &Character) -> Self {
        Self {
            name: c.name.clone(),
            voice: c.voice.clone(),
            images: c.images.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Character {
        let mut images = BTreeMap::new();
        for key in ["neutral", "happy", "sad", "talking", "listening", "thinking"] {
            images.insert(key.to_string(), format!("images/{key}.png"));
        }
        Character {
            name: "Juniper".to_string(),
            voice: "af_heart".to_string(),
            images,
            instructions: None,
        }
    }

    #[test]
    fn valid_emotions_excludes_ui_states() {
        let c = sample();
        assert_eq!(c.valid_emotions(), vec!["happy", "neutral", "sad"]);
    }

    #[test]
    fn config_roundtrip_preserves_fields() {
        let c = sample();
        let json = serde_json::to_string(&c).unwrap();
        let back: Character = serde_json::from_str(&json).unwrap();
        assert_eq!(c, back);
    }

    #[test]
    fn config_without_images_or_instructions_parses() {
        let c: Character =
            serde_json::from_str(r#"{"name": "Ash", "voice": "am_onyx"}"#).unwrap();
        assert!(c.images.is_empty());
        assert!(c.instructions.is_none());
    }
}
