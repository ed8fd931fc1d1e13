//! Convert PDF documents to audiobooks with chunked text-to-speech.
//!
//! Text is normalized, split into bounded chunks, synthesized chunk by chunk
//! with bounded concurrency, and the successful segments are joined in order.

pub mod audio;
pub mod config;
pub mod convert;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod text;
pub mod tts;

pub use config::{AppConfig, PipelineConfig};
pub use error::{FailureReason, MergeError, PipelineError, TtsError};
pub use pipeline::{CancelToken, Pipeline, PipelineOutcome, PipelineState, Progress};
pub use tts::VoiceId;
