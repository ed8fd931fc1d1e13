//! Text processing module for TTS: normalization and chunking.

pub mod chunker;
mod cleaner;

pub use chunker::{chunk, DEFAULT_MAX_CHUNK_SIZE};
pub use cleaner::normalize;

/// A bounded slice of normalized document text, the unit of speech synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the document, 0-based and contiguous
    pub index: usize,
    /// The text content (never empty)
    pub text: String,
}

impl Chunk {
    /// Create a new text chunk.
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A document's text as produced by the extractor, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct Document {
    /// Source identifier (file path, upload name, ...)
    pub source: String,
    /// Raw extracted text
    pub text: String,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }

    /// Approximate word count of the raw text.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}
