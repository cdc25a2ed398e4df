//! Fixed-window text chunker.
//!
//! Splits extracted document text into overlapping windows of at most `size`
//! characters. The window start advances by `size - overlap` each step, so
//! consecutive windows share `overlap` characters of source text. Each window
//! is whitespace-trimmed and dropped if it trims to nothing.
//!
//! Lengths are counted in characters, not bytes. Chunk indices are dense:
//! index `i` is the i-th emitted chunk, so ids stay stable for unchanged text
//! and parameters.

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Split `text` into trimmed, non-empty windows of at most `size` characters.
///
/// `overlap` must be smaller than `size` (enforced by config validation). If
/// it is not, the window advances one character at a time rather than
/// looping forever.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    if size == 0 || text.is_empty() {
        return Vec::new();
    }
    let step = size.saturating_sub(overlap).max(1);

    // Byte offset of every char boundary, including the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < char_len {
        let end = (start + size).min(char_len);
        let window = text[bounds[start]..bounds[end]].trim();
        if !window.is_empty() {
            chunks.push(window.to_string());
        }
        start += step;
    }
    chunks
}

/// Chunk a document's text and assign ids derived from the file stem.
pub fn chunk_document(stem: &str, text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
    chunk_text(text, size, overlap)
        .into_iter()
        .enumerate()
        .map(|(i, text)| make_chunk(stem, i as i64, text))
        .collect()
}

/// Deterministic chunk id for `(stem, index)`.
pub fn chunk_id(stem: &str, index: i64) -> String {
    format!("{}::chunk_{}", stem, index)
}

fn make_chunk(stem: &str, index: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: chunk_id(stem, index),
        chunk_index: index,
        text,
        hash,
    }
}
