//! Per-utterance streaming state.
//!
//! [`StreamingTurn`] accumulates the raw bytes of one language-model reply,
//! re-extracts the best-known text after every chunk, and hands newly
//! completed sentences to the caller for synthesis. [`TurnPhase`] names the
//! stations one turn moves through; the transitions themselves are driven by
//! the session controller that owns the collaborator calls.

use crate::partial::{extract_partial, parse_final};
use crate::segment::consume_new;

/// Emotion assigned when the final strict parse fails and the reply falls
/// back to the raw accumulated text.
pub const FALLBACK_EMOTION: &str = "surprised";

/// The stations one turn moves through.
///
/// `Idle -> Transcribing -> Thinking -> Streaming -> Draining -> Idle | Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Transcribing,
    Thinking,
    Streaming,
    Draining,
    Error,
}

/// What one appended chunk produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnDelta {
    /// Text newly added to the best-known reply (may be empty: a chunk can
    /// consist entirely of JSON syntax).
    pub appended_text: String,
    /// Sentences completed by this chunk, in left-to-right order.
    pub new_sentences: Vec<String>,
}

/// The settled reply once the upstream stream has ended.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedTurn {
    /// The full reply text for the chat history.
    pub text: String,
    /// The model's emotion, or [`FALLBACK_EMOTION`] when the reply had to be
    /// recovered from a malformed body.
    pub emotion: Option<String>,
    /// Whether the strict parse failed and the raw-text fallback was used.
    pub fell_back: bool,
    /// Sentences flushed by the final segmentation pass.
    pub trailing_sentences: Vec<String>,
}

/// Accumulation state for one in-flight reply stream.
#[derive(Debug, Default)]
pub struct StreamingTurn {
    /// Every byte received from the upstream token stream, append-only.
    raw: String,
    /// Byte offset into the decoded text already segmented into sentences.
    /// Monotonically non-decreasing, always on a char boundary.
    watermark: usize,
    /// Length of the decoded text after the previous chunk.
    decoded_len: usize,
}

impl StreamingTurn {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw accumulated body.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Appends one upstream chunk and returns the resulting increments.
    pub fn push_chunk(&mut self, chunk: &str) -> TurnDelta {
        self.raw.push_str(chunk);
        let partial = extract_partial(&self.raw);

        // The decoded text only grows; everything past the previous length is
        // new. Held-back escapes guarantee the old prefix is stable.
        let appended_text = partial.text[self.decoded_len.min(partial.text.len())..].to_string();
        self.decoded_len = partial.text.len();

        let (new_sentences, watermark) = consume_new(&partial.text, self.watermark, false);
        self.watermark = watermark;

        TurnDelta {
            appended_text,
            new_sentences,
        }
    }

    /// Ends the stream: strict-parses the body, falls back to the accumulated
    /// text when the parse fails, and flushes the unconsumed remainder.
    ///
    /// A malformed body is recovered, never surfaced as an error — a terminal
    /// chat message is always produced.
    pub fn finish(self) -> FinishedTurn {
        if let Some(reply) = parse_final(&self.raw) {
            // The watermark was advanced against the tolerant decoding; clamp
            // it onto the strict text so a divergence can never slice
            // mid-character.
            let watermark = floor_char_boundary(&reply.text, self.watermark);
            let (trailing_sentences, _) = consume_new(&reply.text, watermark, true);
            return FinishedTurn {
                text: reply.text,
                emotion: reply.emotion,
                fell_back: false,
                trailing_sentences,
            };
        }

        tracing::warn!(
            bytes = self.raw.len(),
            "reply body was not valid JSON; treating accumulated text as the reply"
        );

        // When the tolerant extractor recognized a text field, stay with that
        // decoded text so already-synthesized sentences are not re-emitted;
        // otherwise the whole raw body is the reply.
        let partial = extract_partial(&self.raw);
        let (text, watermark) = if partial.text.is_empty() {
            (self.raw, 0)
        } else {
            (partial.text, self.watermark)
        };
        let (trailing_sentences, _) = consume_new(&text, watermark, true);

        FinishedTurn {
            text,
            emotion: Some(FALLBACK_EMOTION.to_string()),
            fell_back: true,
            trailing_sentences,
        }
    }
}

/// Largest index `<= at` that lies on a char boundary of `s`.
fn floor_char_boundary(s: &str, at: usize) -> usize {
    let mut index = at.min(s.len());
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Splits `body` into `size`-byte chunks on char boundaries.
    fn chunks(body: &str, size: usize) -> Vec<&str> {
        let mut out = Vec::new();
        let mut start = 0;
        while start < body.len() {
            let mut end = (start + size).min(body.len());
            while !body.is_char_boundary(end) {
                end += 1;
            }
            out.push(&body[start..end]);
            start = end;
        }
        out
    }

    #[test]
    fn sentences_fire_mid_stream_in_order() {
        let body = r#"{"text": "First one. Second one! And a tail", "emotion": "happy"}"#;
        let mut turn = StreamingTurn::new();
        let mut streamed = Vec::new();
        for chunk in chunks(body, 3) {
            streamed.extend(turn.push_chunk(chunk).new_sentences);
        }
        assert_eq!(streamed, vec!["First one.", "Second one!"]);

        let finished = turn.finish();
        assert_eq!(finished.trailing_sentences, vec!["And a tail"]);
        assert_eq!(finished.text, "First one. Second one! And a tail");
        assert_eq!(finished.emotion, Some("happy".to_string()));
        assert!(!finished.fell_back);
    }

    #[test]
    fn appended_text_reconstructs_the_reply() {
        let body = r#"{"text": "Hello there. How are you?", "emotion": "neutral"}"#;
        let mut turn = StreamingTurn::new();
        let mut shown = String::new();
        for chunk in chunks(body, 1) {
            shown.push_str(&turn.push_chunk(chunk).appended_text);
        }
        assert_eq!(shown, "Hello there. How are you?");
    }

    #[test]
    fn single_chunk_body_works_like_a_stream() {
        // The LLM endpoint may answer with one non-streamed JSON object.
        let mut turn = StreamingTurn::new();
        let delta = turn.push_chunk(r#"{"text": "Hi there.", "emotion": "happy"}"#);
        assert_eq!(delta.new_sentences, vec!["Hi there."]);
        let finished = turn.finish();
        assert!(finished.trailing_sentences.is_empty());
        assert_eq!(finished.emotion, Some("happy".to_string()));
    }

    #[test]
    fn malformed_body_falls_back_to_raw_text() {
        let mut turn = StreamingTurn::new();
        turn.push_chunk("I forgot the JSON. Sorry");
        let finished = turn.finish();
        assert!(finished.fell_back);
        assert_eq!(finished.text, "I forgot the JSON. Sorry");
        assert_eq!(finished.emotion, Some(FALLBACK_EMOTION.to_string()));
        assert_eq!(
            finished.trailing_sentences,
            vec!["I forgot the JSON.", "Sorry"]
        );
    }

    #[test]
    fn truncated_json_keeps_decoded_text_without_duplicates() {
        // Valid start, never closed: strict parse fails but the decoded text
        // was already streamed and partially synthesized.
        let mut turn = StreamingTurn::new();
        let streamed: Vec<String> = turn
            .push_chunk(r#"{"text": "Almost done. But cut of"#)
            .new_sentences;
        assert_eq!(streamed, vec!["Almost done."]);

        let finished = turn.finish();
        assert!(finished.fell_back);
        assert_eq!(finished.text, "Almost done. But cut of");
        // Only the unconsumed remainder is flushed.
        assert_eq!(finished.trailing_sentences, vec!["But cut of"]);
    }

    #[test]
    fn surrogate_pair_escapes_keep_the_watermark_aligned() {
        // Emoji arrive as \uXXXX surrogate pairs; the tolerant and strict
        // decodings must agree or the final flush slices mid-character.
        let body = r#"{"text": "Hi. \uD83D\uDE00 x\u2764y. Tail", "emotion": "happy"}"#;
        let mut turn = StreamingTurn::new();
        let mut streamed = Vec::new();
        for chunk in chunks(body, 3) {
            streamed.extend(turn.push_chunk(chunk).new_sentences);
        }

        let finished = turn.finish();
        assert!(!finished.fell_back);
        assert_eq!(finished.text, "Hi. \u{1F600} x\u{2764}y. Tail");

        // Every sentence exactly once, mid-stream plus trailing.
        let mut all = streamed;
        all.extend(finished.trailing_sentences);
        assert_eq!(
            all,
            vec!["Hi.", "\u{1F600} x\u{2764}y.", "Tail"]
        );
    }

    #[test]
    fn empty_stream_finishes_empty() {
        let finished = StreamingTurn::new().finish();
        assert!(finished.fell_back);
        assert_eq!(finished.text, "");
        assert!(finished.trailing_sentences.is_empty());
    }
}
