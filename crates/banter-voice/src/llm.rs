//! Language-model client.
//!
//! `POST /llm` answers either with a single JSON object or with a live byte
//! stream whose fully-accumulated body is that object. Both cases are
//! exposed uniformly as a chunk stream: a non-streamed reply simply arrives
//! as one chunk.

use crate::config::ServicesConfig;
use crate::error::VoiceError;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct LlmRequest<'a> {
    prompt: &'a str,
    system_prompt: &'a str,
}

/// Client for `POST /llm`.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    endpoint: String,
}

impl LlmClient {
    pub fn new(http: reqwest::Client, config: &ServicesConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoint("llm"),
        }
    }

    /// Sends the transcript plus system prompt and returns the live token
    /// stream of the reply body.
    pub async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<BoxStream<'static, Result<Bytes, VoiceError>>, VoiceError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&LlmRequest {
                prompt,
                system_prompt,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VoiceError::Llm(format!(
                "LLM service returned {}",
                response.status()
            )));
        }

        Ok(response.bytes_stream().map_err(VoiceError::Http).boxed())
    }
}
