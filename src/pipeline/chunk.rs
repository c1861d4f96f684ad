//! Sentence-respecting text chunking.
//!
//! Sentences are found by splitting on `.` only. Abbreviations, decimals and
//! the `?`/`!` terminators are not recognised; every emitted sentence ends in
//! `.` because the terminator is re-appended after trimming.

use serde::{Deserialize, Serialize};

/// One ordered unit of text handed to the speech engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// 0-based position in the document.
    pub index: usize,
    pub content: String,
}

/// Split `text` into chunks of roughly `max_chunk_size` characters.
///
/// Sentences are packed greedily: the next sentence joins the current chunk
/// unless the chunk already holds something and the combined sentence sizes
/// would exceed `max_chunk_size`. A sentence longer than the limit is emitted
/// whole in its own chunk. Sizes count characters and ignore the single
/// spaces inserted between sentences.
pub fn chunk_text(text: &str, max_chunk_size: usize) -> Vec<TextChunk> {
    let normalised = text.replace('\n', " ");

    let mut groups: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_size = 0usize;

    for candidate in normalised.split('.') {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            continue;
        }

        let sentence = format!("{trimmed}.");
        let sentence_size = sentence.chars().count();

        if !current.is_empty() && current_size + sentence_size > max_chunk_size {
            groups.push(current.join(" "));
            current.clear();
            current_size = 0;
        }

        current.push(sentence);
        current_size += sentence_size;
    }

    if !current.is_empty() {
        groups.push(current.join(" "));
    }

    groups
        .into_iter()
        .filter(|g| !g.trim().is_empty())
        .enumerate()
        .map(|(index, content)| TextChunk { index, content })
        .collect()
}
