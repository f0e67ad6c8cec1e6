//! HTTP clients for the three AI collaborators.
//!
//! The relay consumes speech-to-text, language-model, and text-to-speech as
//! opaque network services behind one base URL: `POST /stt` (multipart audio
//! in, `{text}` out), `POST /llm` (`{prompt, system_prompt}` in, a live byte
//! stream accumulating to a `{text, emotion}` JSON object out), and
//! `POST /tts` (`{text, voice}` in, binary audio out). Nothing here retries;
//! failures surface as [`VoiceError`] and the session decides how to degrade.

pub mod config;
pub mod error;
pub mod llm;
pub mod stt;
pub mod tts;

pub use config::ServicesConfig;
pub use error::VoiceError;
pub use llm::LlmClient;
pub use stt::SttClient;
pub use tts::TtsClient;
