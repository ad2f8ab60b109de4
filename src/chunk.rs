//! Overlapping character-window text chunker.
//!
//! Splits extracted text into [`Chunk`]s of at most `chunk_size` characters.
//! Consecutive chunks share exactly `chunk_overlap` characters, so the
//! chunks cover the input without gaps and [`reconstruct`] can rebuild it.
//!
//! Inside each window the cut is placed after the last paragraph break
//! (`\n\n`), else the last line break, else the last space. Text with none
//! of these is cut hard at `chunk_size`. Lengths count `char`s, so a cut
//! never lands inside a UTF-8 sequence.

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Break candidates, most preferred first.
const SEPARATORS: [&[char]; 3] = [&['\n', '\n'], &['\n'], &[' ']];

/// Split text using the configured size and overlap.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    split_with(text, config.chunk_size, config.chunk_overlap)
}

/// Split text into windows of at most `size` chars sharing `overlap` chars.
///
/// Empty input yields no chunks. Input of at most `size` chars yields one
/// chunk equal to the input. `overlap` is clamped below `size`.
pub fn split_with(text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
    let size = size.max(1);
    let overlap = overlap.min(size - 1);

    let chars: Vec<char> = text.chars().collect();
    // Byte offset of every char boundary, including the end of the text.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n = chars.len();

    let mut chunks = Vec::new();
    if n == 0 {
        return chunks;
    }

    let mut start = 0;
    loop {
        let hard_end = (start + size).min(n);
        let end = if hard_end == n {
            n
        } else {
            // The cut must leave room for progress past the overlap.
            find_break(&chars, start, start + overlap + 1, hard_end).unwrap_or(hard_end)
        };

        chunks.push(Chunk {
            position: chunks.len(),
            text: text[offsets[start]..offsets[end]].to_string(),
        });

        if end == n {
            break;
        }
        start = end - overlap;
    }

    chunks
}

/// Latest cut position in `lo..=hi` that falls right after a separator
/// lying entirely inside the chunk starting at `start`.
fn find_break(chars: &[char], start: usize, lo: usize, hi: usize) -> Option<usize> {
    SEPARATORS.iter().find_map(|sep| {
        (lo..=hi).rev().find(|&p| {
            p >= start + sep.len() && &chars[p - sep.len()..p] == *sep
        })
    })
}

/// Rebuild the original text from chunks produced with `overlap`.
pub fn reconstruct(chunks: &[Chunk], overlap: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            out.push_str(&chunk.text);
        } else {
            out.extend(chunk.text.chars().skip(overlap));
        }
    }
    out
}
