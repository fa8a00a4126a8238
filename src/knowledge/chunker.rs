//! Recursive character text splitter.
//!
//! Splits on progressively finer separators (paragraph → line → sentence →
//! word) until every piece fits the target chunk size, then reassembles
//! pieces into chunks with a fixed-size overlap carried from the tail of the
//! previous chunk. A single word longer than the target is emitted whole.

/// Separator hierarchy, coarsest first.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

/// Recursive character chunker.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Create a chunker. `chunk_overlap` must be smaller than `chunk_size`
    /// (enforced at config load).
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    /// Split `text` into overlapping chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        if text.len() <= self.chunk_size {
            return vec![text.to_string()];
        }

        let pieces = split_recursive(text, self.chunk_size, SEPARATORS);
        self.merge(pieces)
    }

    /// Merge small pieces into chunks near the target size, carrying overlap
    /// from the previous chunk's tail.
    fn merge(&self, pieces: Vec<&str>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for piece in pieces {
            let candidate_len = if current.is_empty() {
                piece.len()
            } else {
                current.len() + 1 + piece.len()
            };

            if candidate_len > self.chunk_size && !current.is_empty() {
                let overlap = tail(&current, self.chunk_overlap).to_string();
                chunks.push(std::mem::take(&mut current));
                current = overlap;
            }

            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(piece);
        }

        if !current.trim().is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

/// Recursively split text so each piece fits within `limit`, preferring
/// coarser separators.
fn split_recursive<'a>(text: &'a str, limit: usize, separators: &[&str]) -> Vec<&'a str> {
    if text.len() <= limit {
        return if text.is_empty() { vec![] } else { vec![text] };
    }

    let Some((separator, rest)) = separators.split_first() else {
        // No separators left: an indivisible run, emit whole.
        return vec![text];
    };

    let mut pieces = Vec::new();
    for part in text.split(separator) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if part.len() <= limit {
            pieces.push(part);
        } else {
            pieces.extend(split_recursive(part, limit, rest));
        }
    }
    pieces
}

/// The last `len` bytes of `s`, snapped forward to a char & word boundary.
fn tail(s: &str, len: usize) -> &str {
    if len == 0 || s.len() <= len {
        return if len == 0 { "" } else { s };
    }
    let mut start = s.len() - len;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    // Snap to the next word boundary so the overlap doesn't begin mid-word.
    match s[start..].find(' ') {
        Some(offset) => s[start + offset..].trim_start(),
        None => &s[start..],
    }
}

/// Rough token count used for ingestion reporting (whitespace words).
pub fn approx_tokens(chunks: &[String]) -> usize {
    chunks
        .iter()
        .map(|c| c.split_whitespace().count())
        .sum()
}
