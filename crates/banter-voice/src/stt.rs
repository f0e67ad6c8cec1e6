//! Speech-to-text client.

use crate::config::ServicesConfig;
use crate::error::VoiceError;
use serde::Deserialize;

/// Maximum audio upload size (10 MiB). Prevents OOM from oversized payloads.
const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Fallback upload filename when the client did not supply one. The STT
/// service sniffs the container format from the name's extension.
const DEFAULT_AUDIO_FILE_NAME: &str = "audio.webm";

#[derive(Debug, Deserialize)]
struct SttResponse {
    text: String,
}

/// Client for `POST /stt`: multipart audio in, transcript out.
#[derive(Debug, Clone)]
pub struct SttClient {
    http: reqwest::Client,
    endpoint: String,
}

impl SttClient {
    pub fn new(http: reqwest::Client, config: &ServicesConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoint("stt"),
        }
    }

    /// Transcribes one recorded utterance. Any container/codec the upstream
    /// understands is accepted; the payload is passed through opaquely.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: Option<String>,
    ) -> Result<String, VoiceError> {
        if audio.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::Stt(format!(
                "audio payload exceeds maximum size: {} bytes (limit: {} bytes)",
                audio.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name.unwrap_or_else(|| DEFAULT_AUDIO_FILE_NAME.to_string()));
        let form = reqwest::multipart::Form::new().part("audio_file", part);

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VoiceError::Stt(format!(
                "STT service returned {}",
                response.status()
            )));
        }

        let body: SttResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Stt(format!("invalid STT response body: {e}")))?;
        Ok(body.text)
    }
}
