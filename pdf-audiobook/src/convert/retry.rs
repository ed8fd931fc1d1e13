//! Bounded retry with exponential backoff around any chunk converter.

use super::{ChunkConverter, ConversionResult};
use crate::text::Chunk;
use crate::tts::VoiceId;
use async_trait::async_trait;
use log::warn;
use std::time::Duration;

/// Default delay before the first retry.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Retries retryable failures up to `max_retries` extra times, doubling the
/// delay after each attempt.
pub struct Retrying<C> {
    inner: C,
    max_retries: u32,
    backoff: Duration,
}

impl<C: ChunkConverter> Retrying<C> {
    pub fn new(inner: C, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Set the delay before the first retry.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(1u32 << attempt.min(16))
    }
}

#[async_trait]
impl<C: ChunkConverter> ChunkConverter for Retrying<C> {
    async fn convert(&self, chunk: &Chunk, voice: &VoiceId) -> ConversionResult {
        let mut attempt = 0;

        loop {
            let result = self.inner.convert(chunk, voice).await;

            let Some(reason) = result.failure_reason() else {
                return result;
            };
            if !reason.is_retryable() || attempt >= self.max_retries {
                return result;
            }

            let delay = self.delay_for(attempt);
            warn!(
                "Chunk {} failed (attempt {}/{}), retrying in {:?}: {}",
                chunk.index,
                attempt + 1,
                self.max_retries + 1,
                delay,
                reason
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
