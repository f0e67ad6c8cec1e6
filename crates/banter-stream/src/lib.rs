//! Streaming reply pipeline for the banter relay.
//!
//! The language model streams a single JSON object `{"text": ..., "emotion":
//! ...}` token by token. This crate turns that raw byte-trickle into usable
//! increments:
//!
//! - [`partial`] recovers the best-known value of the `text` field from a
//!   truncated, not-yet-valid document after every appended chunk.
//! - [`segment`] splits the recovered text into completed sentences exactly
//!   once, tracking a consumption watermark so speech synthesis can start
//!   before the full reply is known.
//! - [`turn`] ties the two together as the per-utterance state machine the
//!   server drives.

pub mod partial;
pub mod segment;
pub mod turn;

pub use partial::{extract_partial, parse_final, PartialReply, Reply};
pub use segment::consume_new;
pub use turn::{FinishedTurn, StreamingTurn, TurnDelta, TurnPhase, FALLBACK_EMOTION};
