//! Text chunking for TTS processing.

use super::Chunk;
use crate::error::{PipelineError, Result};

/// Default maximum chunk size in characters.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1000;

/// Split normalized text into ordered, size-bounded chunks.
///
/// Chunks break only at whitespace. Once the remaining text fits within
/// `max_chunk_size` it becomes the final chunk; before that, words are packed
/// greedily while the chunk plus its trailing separator stays below the
/// limit. A word longer than the limit becomes its own oversized chunk so no
/// characters are ever dropped.
///
/// Joining the returned chunk texts with single spaces reproduces `text`
/// (for normalized input, which has no leading, trailing or repeated whitespace).
///
/// # Errors
/// * `InvalidConfig` if `max_chunk_size` is zero
/// * `EmptyDocument` if `text` holds no words
pub fn chunk(text: &str, max_chunk_size: usize) -> Result<Vec<Chunk>> {
    if max_chunk_size == 0 {
        return Err(PipelineError::InvalidConfig(
            "max_chunk_size must be greater than zero".to_string(),
        ));
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Err(PipelineError::EmptyDocument);
    }

    let pieces = pack_words(&words, max_chunk_size);

    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk::new(index, text))
        .collect())
}

/// Greedily pack words into pieces.
fn pack_words(words: &[&str], max_chunk_size: usize) -> Vec<String> {
    let lengths: Vec<usize> = words.iter().map(|w| w.chars().count()).collect();

    // remaining[i] = length of words[i..] joined with single spaces
    let mut remaining = vec![0usize; words.len() + 1];
    for i in (0..words.len()).rev() {
        remaining[i] = lengths[i] + if i + 1 < words.len() { 1 + remaining[i + 1] } else { 0 };
    }

    let mut pieces = Vec::new();
    let mut start = 0;

    while start < words.len() {
        if remaining[start] <= max_chunk_size {
            pieces.push(words[start..].join(" "));
            break;
        }

        let mut end = start + 1;
        let mut current_len = lengths[start];
        while end < words.len() {
            let candidate = current_len + 1 + lengths[end];
            if candidate + 1 >= max_chunk_size {
                break;
            }
            current_len = candidate;
            end += 1;
        }

        pieces.push(words[start..end].join(" "));
        start = end;
    }

    pieces
}
