//! Sentence-boundary segmentation over a growing text buffer.
//!
//! The decoded reply text only ever grows, and synthesis should start as soon
//! as each sentence is recognizable. [`consume_new`] operates on the
//! unconsumed suffix past a watermark, emits newly completed sentences, and
//! returns the advanced watermark. The concatenation of all emitted
//! sentences' source spans reconstructs the consumed prefix exactly once:
//! nothing is emitted twice, nothing is skipped.

/// Characters that end a sentence.
pub const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

fn is_terminator(c: char) -> bool {
    SENTENCE_TERMINATORS.contains(&c)
}

/// Extracts newly completed sentences from `full[watermark..]`.
///
/// A boundary is a run of non-terminator characters followed by a run of one
/// or more terminators (`?!` and `...` stay with their sentence); whitespace
/// after the terminators is absorbed into the boundary but excluded from the
/// emitted text. While the stream is still live, a boundary whose terminator
/// or whitespace run touches the end of the buffer is held back — the run may
/// still grow — and re-evaluated on the next call. With `is_final` the held
/// boundary is released and any nonempty trimmed remainder is emitted as one
/// last sentence, with the watermark advanced to `full.len()`.
///
/// The watermark is a byte offset, always on a `char` boundary, and never
/// decreases.
pub fn consume_new(full: &str, watermark: usize, is_final: bool) -> (Vec<String>, usize) {
    let tail = &full[watermark..];
    let mut sentences = Vec::new();
    // Bytes of `tail` consumed into emitted boundaries.
    let mut consumed = 0;

    let mut iter = tail.char_indices().peekable();
    while let Some((start, c)) = iter.next() {
        if !is_terminator(c) {
            continue;
        }

        // Absorb the full terminator run.
        let mut end = start + c.len_utf8();
        while let Some(&(i, next)) = iter.peek() {
            if is_terminator(next) {
                end = i + next.len_utf8();
                iter.next();
            } else {
                break;
            }
        }

        // Absorb trailing whitespace into the boundary.
        let mut boundary_end = end;
        while let Some(&(i, next)) = iter.peek() {
            if next.is_whitespace() {
                boundary_end = i + next.len_utf8();
                iter.next();
            } else {
                break;
            }
        }

        // A run touching the buffer end may still grow on the next chunk.
        if boundary_end == tail.len() && !is_final {
            break;
        }

        let sentence = tail[consumed..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        consumed = boundary_end;
    }

    if is_final {
        let remainder = tail[consumed..].trim();
        if !remainder.is_empty() {
            sentences.push(remainder.to_string());
        }
        consumed = tail.len();
    }

    (sentences, watermark + consumed)
}
