//! Audio assembly: joining per-chunk segments into one stream.

pub mod assembler;
pub mod ffmpeg;
pub mod format;

pub use assembler::ConcatAssembler;
pub use ffmpeg::FfmpegAssembler;
pub use format::AudioFormat;

use crate::error::MergeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Synthesized audio for one chunk, stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    pub index: usize,
    pub path: PathBuf,
}

impl AudioSegment {
    pub fn new(index: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            index,
            path: path.into(),
        }
    }
}

/// Merges ordered segments into a single audio byte stream.
///
/// Callers pass segments sorted by index. Gaps left by failed chunks are
/// expected and skipped silently.
pub trait AudioAssembler: Send + Sync {
    fn merge(&self, segments: &[AudioSegment]) -> Result<Vec<u8>, MergeError>;
}

/// Available assembler backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssemblerKind {
    /// In-process lossless concatenation
    #[default]
    Concat,
    /// ffmpeg concat demuxer
    Ffmpeg,
}

impl AssemblerKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "concat" => Some(Self::Concat),
            "ffmpeg" => Some(Self::Ffmpeg),
            _ => None,
        }
    }
}

impl fmt::Display for AssemblerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concat => f.write_str("concat"),
            Self::Ffmpeg => f.write_str("ffmpeg"),
        }
    }
}

/// Build the assembler for `kind`.
pub fn create_assembler(kind: AssemblerKind, ffmpeg_path: Option<PathBuf>) -> Arc<dyn AudioAssembler> {
    match kind {
        AssemblerKind::Concat => Arc::new(ConcatAssembler),
        AssemblerKind::Ffmpeg => Arc::new(FfmpegAssembler::new(ffmpeg_path)),
    }
}
