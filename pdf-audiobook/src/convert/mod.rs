//! Per-chunk speech conversion.
//!
//! A [`ChunkConverter`] turns one chunk into a [`ConversionResult`] and never
//! fails outright: every provider error becomes a typed [`FailureReason`].
//! [`Retrying`] wraps any converter with bounded retries behind the same trait.

mod retry;

pub use retry::Retrying;

use crate::error::FailureReason;
use crate::text::Chunk;
use crate::tts::{TtsProvider, VoiceId};
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// Default per-chunk timeout.
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(120);

/// Outcome of converting one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Encoded audio bytes
    Success(Vec<u8>),
    Failure(FailureReason),
}

/// Result of converting one chunk. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    pub chunk_index: usize,
    pub outcome: ChunkOutcome,
}

impl ConversionResult {
    pub fn success(chunk_index: usize, audio: Vec<u8>) -> Self {
        Self {
            chunk_index,
            outcome: ChunkOutcome::Success(audio),
        }
    }

    pub fn failure(chunk_index: usize, reason: FailureReason) -> Self {
        Self {
            chunk_index,
            outcome: ChunkOutcome::Failure(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ChunkOutcome::Success(_))
    }

    /// The failure reason, if this chunk failed.
    pub fn failure_reason(&self) -> Option<&FailureReason> {
        match &self.outcome {
            ChunkOutcome::Failure(reason) => Some(reason),
            ChunkOutcome::Success(_) => None,
        }
    }
}

/// Converts a single chunk to audio.
#[async_trait]
pub trait ChunkConverter: Send + Sync {
    async fn convert(&self, chunk: &Chunk, voice: &VoiceId) -> ConversionResult;
}

#[async_trait]
impl<C: ChunkConverter + ?Sized> ChunkConverter for Arc<C> {
    async fn convert(&self, chunk: &Chunk, voice: &VoiceId) -> ConversionResult {
        (**self).convert(chunk, voice).await
    }
}

/// Converter that calls a TTS provider once per chunk.
pub struct SpeechConverter<P: ?Sized> {
    provider: Arc<P>,
    timeout: Duration,
}

impl<P: TtsProvider + ?Sized> SpeechConverter<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            timeout: DEFAULT_CHUNK_TIMEOUT,
        }
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl<P: TtsProvider + ?Sized> ChunkConverter for SpeechConverter<P> {
    async fn convert(&self, chunk: &Chunk, voice: &VoiceId) -> ConversionResult {
        let call = self.provider.synthesize(&chunk.text, voice);

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(audio)) if audio.is_empty() => {
                ConversionResult::failure(chunk.index, FailureReason::EmptyOutput)
            }
            Ok(Ok(audio)) => {
                debug!(
                    "Chunk {} converted by {} ({} bytes)",
                    chunk.index,
                    self.provider.name(),
                    audio.len()
                );
                ConversionResult::success(chunk.index, audio)
            }
            Ok(Err(e)) => ConversionResult::failure(chunk.index, e.into()),
            Err(_) => ConversionResult::failure(chunk.index, FailureReason::Timeout),
        }
    }
}
