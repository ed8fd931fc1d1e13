//! Bounded-concurrency dispatch of chunk conversions.

use super::CancelToken;
use crate::convert::{ChunkConverter, ConversionResult};
use crate::error::{FailureReason, PipelineError, Result};
use crate::text::Chunk;
use crate::tts::VoiceId;
use futures_util::FutureExt;
use log::{debug, warn};
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Convert every chunk with at most `concurrency` conversions in flight.
///
/// Results come back indexed by chunk position regardless of completion order.
/// `on_complete(done, total)` runs after each result is recorded. Once `cancel`
/// is raised nothing new is dispatched, results still in flight are discarded
/// and the call returns `Cancelled`.
pub async fn convert_all<F>(
    converter: Arc<dyn ChunkConverter>,
    chunks: Vec<Chunk>,
    voice: &VoiceId,
    concurrency: usize,
    cancel: &CancelToken,
    mut on_complete: F,
) -> Result<Vec<ConversionResult>>
where
    F: FnMut(usize, usize),
{
    let total = chunks.len();
    let limit = concurrency.max(1);

    let mut pending: VecDeque<Chunk> = chunks.into();
    let mut slots: Vec<Option<ConversionResult>> = vec![None; total];
    let (tx, mut rx) = mpsc::channel::<ConversionResult>(limit);

    let mut in_flight = 0usize;
    let mut completed = 0usize;

    while completed < total {
        // Fill free slots
        while in_flight < limit {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let Some(chunk) = pending.pop_front() else {
                break;
            };

            let tx = tx.clone();
            let converter = Arc::clone(&converter);
            let voice = voice.clone();
            debug!("Dispatching chunk {} ({} chars)", chunk.index, chunk.char_len());

            tokio::spawn(async move {
                let index = chunk.index;
                let result = AssertUnwindSafe(converter.convert(&chunk, &voice))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        warn!("Conversion of chunk {} panicked", index);
                        ConversionResult::failure(
                            index,
                            FailureReason::TransportError("conversion task panicked".to_string()),
                        )
                    });
                // The receiver is gone once the run was cancelled.
                let _ = tx.send(result).await;
            });
            in_flight += 1;
        }

        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            received = rx.recv() => received,
        };
        let Some(result) = received else {
            return Err(PipelineError::Internal("result channel closed".to_string()));
        };
        in_flight -= 1;

        let index = result.chunk_index;
        match slots.get_mut(index) {
            Some(slot) if slot.is_none() => *slot = Some(result),
            _ => {
                return Err(PipelineError::Internal(format!(
                    "unexpected result for chunk {}",
                    index
                )));
            }
        }

        completed += 1;
        on_complete(completed, total);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| slot.ok_or_else(|| PipelineError::Internal(format!("missing result for chunk {}", i))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::SpeechConverter;
    use crate::error::TtsError;
    use crate::tts::MockProvider;
    use crate::tts::mock::mp3_frame;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n).map(|i| Chunk::new(i, format!("chunk {}", i))).collect()
    }

    fn voice() -> VoiceId {
        VoiceId::from("en-US-AriaNeural")
    }

    /// Finishes later chunks first and records the peak number of concurrent calls.
    struct ReverseLatency {
        active: AtomicUsize,
        peak: AtomicUsize,
        total: usize,
    }

    #[async_trait]
    impl ChunkConverter for ReverseLatency {
        async fn convert(&self, chunk: &Chunk, _voice: &VoiceId) -> ConversionResult {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let delay = (self.total - chunk.index) as u64 * 10;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            ConversionResult::success(chunk.index, vec![chunk.index as u8])
        }
    }

    struct Panicking;

    #[async_trait]
    impl ChunkConverter for Panicking {
        async fn convert(&self, chunk: &Chunk, _voice: &VoiceId) -> ConversionResult {
            if chunk.index == 1 {
                panic!("boom");
            }
            ConversionResult::success(chunk.index, vec![1])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_ordered_by_index() {
        let converter = Arc::new(ReverseLatency {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            total: 6,
        });

        let results = convert_all(converter.clone(), chunks(6), &voice(), 3, &CancelToken::new(), |_, _| {})
            .await
            .unwrap();

        let indices: Vec<usize> = results.iter().map(|r| r.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
        assert!(converter.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_one_is_sequential() {
        let converter = Arc::new(ReverseLatency {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            total: 4,
        });

        convert_all(converter.clone(), chunks(4), &voice(), 1, &CancelToken::new(), |_, _| {})
            .await
            .unwrap();
        assert_eq!(converter.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_on_complete_counts_every_result() {
        let provider = MockProvider::from_fn(|call, _| {
            if call % 2 == 0 {
                Ok(mp3_frame(1))
            } else {
                Err(TtsError::Timeout)
            }
        });
        let converter = Arc::new(SpeechConverter::new(Arc::new(provider)));
        let mut seen = Vec::new();

        let results = convert_all(converter, chunks(5), &voice(), 2, &CancelToken::new(), |done, total| {
            seen.push((done, total))
        })
        .await
        .unwrap();

        assert_eq!(results.len(), 5);
        assert_eq!(seen, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);
    }

    #[tokio::test]
    async fn test_panic_becomes_chunk_failure() {
        let results = convert_all(Arc::new(Panicking), chunks(3), &voice(), 2, &CancelToken::new(), |_, _| {})
            .await
            .unwrap();

        assert!(results[0].is_success());
        assert_eq!(
            results[1].failure_reason(),
            Some(&FailureReason::TransportError("conversion task panicked".to_string()))
        );
        assert!(results[2].is_success());
    }

    #[tokio::test]
    async fn test_cancel_stops_dispatch() {
        let cancel = CancelToken::new();
        let hook_cancel = cancel.clone();
        let provider = Arc::new(
            MockProvider::always_succeeds(mp3_frame(1)).with_call_hook(move |n| {
                if n == 3 {
                    hook_cancel.cancel();
                }
            }),
        );
        let converter = Arc::new(SpeechConverter::new(Arc::clone(&provider)));
        let progress = Mutex::new(Vec::new());

        let result = convert_all(converter, chunks(10), &voice(), 1, &cancel, |done, _| {
            progress.lock().unwrap().push(done)
        })
        .await;

        assert_eq!(result, Err(PipelineError::Cancelled));
        assert_eq!(provider.call_count(), 3);
        assert_eq!(*progress.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_already_cancelled_dispatches_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let provider = Arc::new(MockProvider::always_succeeds(mp3_frame(1)));
        let converter = Arc::new(SpeechConverter::new(Arc::clone(&provider)));

        let result = convert_all(converter, chunks(4), &voice(), 2, &cancel, |_, _| {}).await;
        assert_eq!(result, Err(PipelineError::Cancelled));
        assert_eq!(provider.call_count(), 0);
    }
}
