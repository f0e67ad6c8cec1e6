use crate::error::VoiceError;
use serde::Deserialize;
use std::time::Duration;

fn default_base_url() -> String {
    "http://127.0.0.1:8001".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// Where the STT/LLM/TTS collaborators live and how long to wait for them.
#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    /// Base URL shared by the `/stt`, `/llm`, and `/tts` endpoints.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Overall per-request timeout in seconds. Covers the full streamed LLM
    /// body, so it bounds how long one reply may take end to end.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ServicesConfig {
    /// Builds the shared HTTP client the three service clients wrap.
    pub fn build_http_client(&self) -> Result<reqwest::Client, VoiceError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .build()
            .map_err(VoiceError::Http)
    }

    /// Joins an endpoint path onto the base URL.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}
