//! Text-to-speech client.

use crate::config::ServicesConfig;
use crate::error::VoiceError;
use serde::Serialize;

/// Maximum text input size for one synthesis request (8 KiB). One request
/// carries one sentence; anything near this limit is malformed segmentation.
const MAX_TTS_INPUT_BYTES: usize = 8 * 1024;

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

/// Client for `POST /tts`: one sentence plus a voice id in, encoded audio out.
#[derive(Debug, Clone)]
pub struct TtsClient {
    http: reqwest::Client,
    endpoint: String,
}

impl TtsClient {
    pub fn new(http: reqwest::Client, config: &ServicesConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoint("tts"),
        }
    }

    /// Synthesizes one sentence. Not retried: a failure drops exactly this
    /// sentence's audio and the caller carries on.
    pub async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, VoiceError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        let response = self
            .http
            .post(&self.endpoint)
            .json(&TtsRequest { text, voice })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VoiceError::Tts(format!(
                "TTS service returned {}",
                response.status()
            )));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}
