//! Sentence segmentation for prose prompts
//!
//! Boundaries fall after a run of `.`, `!` or `?` (with any closing quotes or
//! brackets) followed by whitespace or the end of the text, and at line
//! breaks. Only surrounding whitespace is trimmed, so no visible content is
//! dropped or reordered.

use crate::types::Segment;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SENTENCE_BOUNDARY: Regex =
        Regex::new(r#"[.!?]+["'\x{201D}\x{2019})\]]*(?:\s+|$)|\n\s*"#)
            .expect("sentence boundary pattern is valid");
}

const CLOSERS: &[char] = &['"', '\'', '\u{201D}', '\u{2019}', ')', ']'];

/// Split text into ordered sentence-like segments.
///
/// Empty or whitespace-only input yields no segments. A trailing fragment
/// without terminal punctuation becomes its own segment. When the whole
/// input is one unpunctuated run of words there are no sentence boundaries
/// to use, so each word becomes a segment.
///
/// # Examples
///
/// ```
/// use promptfit::segmenter::split_sentences;
///
/// let segments = split_sentences("First point. Second point? Trailing note");
/// assert_eq!(segments.len(), 3);
/// assert_eq!(segments[2].text(), "Trailing note");
/// ```
pub fn split_sentences(text: &str) -> Vec<Segment> {
    let mut pieces: Vec<&str> = Vec::new();
    let mut start = 0;

    for boundary in SENTENCE_BOUNDARY.find_iter(text) {
        push_trimmed(&mut pieces, &text[start..boundary.end()]);
        start = boundary.end();
    }
    push_trimmed(&mut pieces, &text[start..]);

    if pieces.len() == 1 && !has_terminal_punctuation(pieces[0]) {
        let only = pieces[0];
        pieces = only.split_whitespace().collect();
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, piece)| Segment::new(index, piece))
        .collect()
}

fn push_trimmed<'a>(pieces: &mut Vec<&'a str>, piece: &'a str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        pieces.push(trimmed);
    }
}

fn has_terminal_punctuation(piece: &str) -> bool {
    piece
        .trim_end_matches(CLOSERS)
        .ends_with(&['.', '!', '?'][..])
}
