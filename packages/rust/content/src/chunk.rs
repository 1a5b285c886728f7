//! Heading-aligned chunking for oversized post bodies.
//!
//! Boundary rules:
//! - a cut is placed immediately before every opening `<h1>`, `<h2>` or `<h3>` tag
//!   (case-insensitive, with or without attributes); the tag stays with the text after it
//! - pieces are packed greedily; a chunk is closed only when the next piece would push it
//!   past `max_size` and it already holds something
//! - a piece larger than `max_size` becomes its own chunk, never split mid-tag
//!
//! Concatenating the chunks in order always gives back the input byte-for-byte.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// Opening tag of a level 1-3 heading.
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<h[1-3][\s>/]").expect("valid regex"));

/// A contiguous slice of the original content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentChunk<'a> {
    /// Byte offset of `text` within the original content.
    pub offset: usize,
    pub text: &'a str,
}

impl ContentChunk<'_> {
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Split `content` into chunks of at most `max_size` bytes where headings allow.
pub fn split(content: &str, max_size: usize) -> Vec<ContentChunk<'_>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut end = 0;

    for cut in piece_ends(content) {
        let piece_len = cut - end;
        if end > start && (end - start) + piece_len > max_size {
            chunks.push(ContentChunk {
                offset: start,
                text: &content[start..end],
            });
            start = end;
        }
        end = cut;
    }

    chunks.push(ContentChunk {
        offset: start,
        text: &content[start..end],
    });

    debug!(
        input_len = content.len(),
        max_size,
        chunks = chunks.len(),
        "content split"
    );

    chunks
}

/// End offsets of each heading-delimited piece, in order. The last entry is
/// always `content.len()`; empty input yields no pieces.
fn piece_ends(content: &str) -> Vec<usize> {
    let mut ends: Vec<usize> = HEADING_RE
        .find_iter(content)
        .map(|m| m.start())
        .filter(|&pos| pos > 0)
        .collect();

    if !content.is_empty() {
        ends.push(content.len());
    }
    ends
}
