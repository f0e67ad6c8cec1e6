//! Tolerant extraction of `text` and `emotion` from a truncated JSON object.
//!
//! While the model is still streaming, the accumulated body is almost never
//! valid JSON — the `text` string is unterminated, the closing brace is
//! missing, an escape sequence may be cut in half. [`extract_partial`] walks
//! the top-level object with a forgiving scanner and returns whatever prefix
//! of the `text` value has safely arrived. Partial decode failure is expected
//! and is never an error; an unrecognizable document simply yields an empty
//! result.
//!
//! [`parse_final`] is the strict counterpart used once the stream has ended.

use serde::Deserialize;
use std::iter::Peekable;
use std::str::CharIndices;

/// Best-effort view of the streamed reply object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialReply {
    /// Longest safely-decoded prefix of the `text` value seen so far.
    pub text: String,
    /// The `emotion` value, only once its string is fully terminated.
    pub emotion: Option<String>,
}

/// The fully-parsed reply object.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Reply {
    pub text: String,
    #[serde(default)]
    pub emotion: Option<String>,
}

/// Strictly parses the complete accumulated body.
///
/// Returns `None` when the body is not a valid `{text, emotion}` document;
/// the caller decides how to degrade (see [`crate::turn::StreamingTurn::finish`]).
pub fn parse_final(raw: &str) -> Option<Reply> {
    serde_json::from_str(raw.trim()).ok()
}

/// Extracts the best-known `text` (and, when complete, `emotion`) from a
/// possibly-truncated JSON object.
pub fn extract_partial(raw: &str) -> PartialReply {
    let mut scanner = Scanner::new(raw);
    let mut out = PartialReply::default();

    scanner.skip_whitespace();
    if !scanner.eat('{') {
        return out;
    }

    loop {
        scanner.skip_whitespace();
        match scanner.peek() {
            Some('}') | None => break,
            Some(',') => {
                scanner.next();
                continue;
            }
            _ => {}
        }

        let Some((key, key_terminated)) = scanner.parse_string() else {
            break;
        };
        if !key_terminated {
            break;
        }

        scanner.skip_whitespace();
        if !scanner.eat(':') {
            break;
        }
        scanner.skip_whitespace();

        match scanner.peek() {
            Some('"') => {
                let Some((value, terminated)) = scanner.parse_string() else {
                    break;
                };
                match key.as_str() {
                    // The text prefix is useful even mid-string.
                    "text" => out.text = value,
                    "emotion" if terminated => out.emotion = Some(value),
                    _ => {}
                }
                if !terminated {
                    break;
                }
            }
            Some(_) => {
                if !scanner.skip_non_string_value() {
                    break;
                }
            }
            None => break,
        }
    }

    out
}

/// Minimal character-level scanner over the raw document.
struct Scanner<'a> {
    iter: Peekable<CharIndices<'a>>,
}

impl<'a> Scanner<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            iter: raw.char_indices().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.iter.peek().map(|&(_, c)| c)
    }

    fn next(&mut self) -> Option<char> {
        self.iter.next().map(|(_, c)| c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.next();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.next();
        }
    }

    /// Parses a JSON string starting at an opening quote, decoding escapes.
    ///
    /// Returns the decoded value and whether the closing quote was reached.
    /// A trailing half-finished escape (`\` or an incomplete `\uXXXX`) is held
    /// back rather than decoded wrong; the next chunk will complete it.
    fn parse_string(&mut self) -> Option<(String, bool)> {
        if !self.eat('"') {
            return None;
        }
        let mut value = String::new();
        loop {
            match self.next() {
                None => return Some((value, false)),
                Some('"') => return Some((value, true)),
                Some('\\') => match self.next() {
                    None => return Some((value, false)),
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('b') => value.push('\u{0008}'),
                    Some('f') => value.push('\u{000C}'),
                    Some('u') => {
                        // Truncated or malformed hex: hold the sequence back.
                        let Some(unit) = self.parse_hex4() else {
                            return Some((value, false));
                        };
                        if (0xD800..=0xDBFF).contains(&unit) {
                            // High surrogate: its low half must follow as
                            // another \uXXXX escape. Decoding must match what
                            // serde_json produces for the same body, or the
                            // segmentation watermark desynchronizes.
                            let mut lookahead = self.iter.clone();
                            let two = (
                                lookahead.next().map(|(_, c)| c),
                                lookahead.next().map(|(_, c)| c),
                            );
                            match two {
                                (Some('\\'), Some('u')) => {
                                    self.next();
                                    self.next();
                                    let Some(low) = self.parse_hex4() else {
                                        return Some((value, false));
                                    };
                                    if (0xDC00..=0xDFFF).contains(&low) {
                                        let combined = 0x10000
                                            + ((unit - 0xD800) << 10)
                                            + (low - 0xDC00);
                                        if let Some(decoded) = char::from_u32(combined) {
                                            value.push(decoded);
                                        }
                                    }
                                    // A mismatched low half decodes to
                                    // nothing; strict parsing rejects such
                                    // bodies before the text is ever used.
                                }
                                // The pair may still complete in a later
                                // chunk: hold the high half back.
                                (Some('\\'), None) | (None, _) => {
                                    return Some((value, false))
                                }
                                // Lone surrogate mid-text: dropped, like
                                // every other unpairable half.
                                _ => {}
                            }
                        } else if let Some(decoded) = char::from_u32(unit) {
                            value.push(decoded);
                        }
                    }
                    // Covers '"', '\\', '/' and anything nonstandard.
                    Some(other) => value.push(other),
                },
                Some(c) => value.push(c),
            }
        }
    }

    /// Reads exactly four hex digits as one UTF-16 code unit.
    fn parse_hex4(&mut self) -> Option<u32> {
        let mut code = String::with_capacity(4);
        for _ in 0..4 {
            match self.next() {
                Some(c) if c.is_ascii_hexdigit() => code.push(c),
                _ => return None,
            }
        }
        u32::from_str_radix(&code, 16).ok()
    }

    /// Skips a non-string value (number, bool, null, nested object/array).
    ///
    /// Returns `true` when the value ended before EOF.
    fn skip_non_string_value(&mut self) -> bool {
        let mut depth: u32 = 0;
        loop {
            match self.peek() {
                None => return false,
                Some(',') | Some('}') if depth == 0 => return true,
                Some(c) => {
                    match c {
                        '{' | '[' => depth += 1,
                        '}' | ']' => depth = depth.saturating_sub(1),
                        '"' => {
                            // String inside a nested value.
                            if self.parse_string().is_none_or(|(_, done)| !done) {
                                return false;
                            }
                            continue;
                        }
                        _ => {}
                    }
                    self.next();
                }
            }
        }
    }
}
