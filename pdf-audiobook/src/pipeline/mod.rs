//! The chunked conversion pipeline.
//!
//! A run moves through `Pending → Extracting → Chunking → Converting →
//! Merging` and ends in `Complete` or `Failed`. Chunk-level failures are
//! recorded and skipped; only document-level and assembly errors fail a run.
//! Callers always get a terminal [`PipelineOutcome`], even if the run panics.

mod cancel;
mod scheduler;
mod workspace;

pub use cancel::CancelToken;
pub use scheduler::convert_all;
pub use workspace::TaskWorkspace;

use crate::audio::{AudioAssembler, AudioFormat, create_assembler};
use crate::config::PipelineConfig;
use crate::convert::{ChunkConverter, ChunkOutcome, Retrying, SpeechConverter};
use crate::error::{FailureReason, PipelineError, Result};
use crate::extract::{PdfExtractor, TextExtractor};
use crate::text::{self, Chunk, Document};
use crate::tts::{TtsProvider, VoiceId};
use futures_util::FutureExt;
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use uuid::Uuid;

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    Extracting,
    Chunking,
    Converting,
    Merging,
    Complete,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Extracting => "extracting",
            Self::Chunking => "chunking",
            Self::Converting => "converting",
            Self::Merging => "merging",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A progress report delivered to the caller's sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub state: PipelineState,
    /// 0 to 100, never decreasing within a run
    pub percent: u8,
    /// Chunks finished so far (success or failure)
    pub completed: usize,
    /// Chunks in the run, 0 until chunking is done
    pub total: usize,
}

const PERCENT_EXTRACTING: u8 = 5;
const PERCENT_CHUNKING: u8 = 10;
const PERCENT_CONVERTING_SPAN: usize = 75;
const PERCENT_MERGING: u8 = 90;
const PERCENT_COMPLETE: u8 = 100;

/// Progress after `completed` of `total` chunk conversions: `floor(10 + completed/total * 75)`.
pub fn conversion_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return PERCENT_CHUNKING;
    }
    let done = completed.min(total);
    PERCENT_CHUNKING + (done * PERCENT_CONVERTING_SPAN / total) as u8
}

/// Wraps the caller's sink and keeps reported percentages monotone.
///
/// A sink that panics is dropped for the rest of the run; the conversion
/// itself carries on.
struct ProgressTracker<F> {
    sink: Option<F>,
    last: u8,
}

impl<F: FnMut(Progress)> ProgressTracker<F> {
    fn new(sink: F) -> Self {
        Self {
            sink: Some(sink),
            last: 0,
        }
    }

    fn report(&mut self, state: PipelineState, percent: u8, completed: usize, total: usize) {
        self.last = self.last.max(percent.min(PERCENT_COMPLETE));
        let progress = Progress {
            state,
            percent: self.last,
            completed,
            total,
        };
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if std::panic::catch_unwind(AssertUnwindSafe(|| sink(progress))).is_err() {
            warn!("Progress callback panicked; further progress reports are dropped");
            self.sink = None;
        }
    }
}

/// Terminal artifact of one run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub task_id: String,
    /// `Complete` or `Failed`
    pub state: PipelineState,
    /// Merged audio, present only when complete
    pub final_audio: Option<Vec<u8>>,
    /// Chunks that produced no audio
    pub failed_chunks: BTreeSet<usize>,
    pub error: Option<PipelineError>,
    /// Human-readable reason for failure
    pub error_summary: Option<String>,
}

impl PipelineOutcome {
    pub fn is_complete(&self) -> bool {
        self.state == PipelineState::Complete
    }
}

/// What a run starts from.
enum Input<'a> {
    Pdf { bytes: &'a [u8], source: &'a str },
    Text(&'a str),
    Chunks(Vec<Chunk>),
}

/// Drives conversion of a document into one audio stream.
pub struct Pipeline {
    config: PipelineConfig,
    converter: Arc<dyn ChunkConverter>,
    assembler: Arc<dyn AudioAssembler>,
    extractor: Arc<dyn TextExtractor>,
}

impl Pipeline {
    /// Build a pipeline from an already composed converter and assembler.
    pub fn new(
        config: PipelineConfig,
        converter: Arc<dyn ChunkConverter>,
        assembler: Arc<dyn AudioAssembler>,
    ) -> Self {
        Self {
            config,
            converter,
            assembler,
            extractor: Arc::new(PdfExtractor),
        }
    }

    /// Build a pipeline around a TTS provider, adding the configured timeout,
    /// retries and assembler.
    pub fn from_provider<P>(config: PipelineConfig, provider: Arc<P>) -> Self
    where
        P: TtsProvider + ?Sized + 'static,
    {
        let converter = Retrying::new(
            SpeechConverter::new(provider).with_timeout(config.chunk_timeout()),
            config.retry_attempts,
        )
        .with_backoff(config.retry_backoff());
        let assembler = create_assembler(config.assembler, config.ffmpeg_path.clone());

        Self::new(config, Arc::new(converter), assembler)
    }

    /// Replace the PDF extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Convert already extracted document text.
    pub async fn start_conversion<F>(&self, document_text: &str, voice: &VoiceId, progress: F) -> PipelineOutcome
    where
        F: FnMut(Progress),
    {
        self.start_conversion_with_cancel(document_text, voice, progress, &CancelToken::new())
            .await
    }

    /// Convert already extracted document text, stopping early if `cancel` is raised.
    pub async fn start_conversion_with_cancel<F>(
        &self,
        document_text: &str,
        voice: &VoiceId,
        progress: F,
        cancel: &CancelToken,
    ) -> PipelineOutcome
    where
        F: FnMut(Progress),
    {
        self.execute(Input::Text(document_text), voice, progress, cancel).await
    }

    /// Extract, normalize and convert a PDF.
    pub async fn convert_pdf<F>(
        &self,
        pdf_bytes: &[u8],
        source: &str,
        voice: &VoiceId,
        progress: F,
        cancel: &CancelToken,
    ) -> PipelineOutcome
    where
        F: FnMut(Progress),
    {
        let input = Input::Pdf {
            bytes: pdf_bytes,
            source,
        };
        self.execute(input, voice, progress, cancel).await
    }

    /// Convert and merge pre-built chunks, skipping extraction and chunking.
    pub async fn run<F>(
        &self,
        chunks: Vec<Chunk>,
        voice: &VoiceId,
        progress: F,
        cancel: &CancelToken,
    ) -> PipelineOutcome
    where
        F: FnMut(Progress),
    {
        self.execute(Input::Chunks(chunks), voice, progress, cancel).await
    }

    async fn execute<F>(&self, input: Input<'_>, voice: &VoiceId, progress: F, cancel: &CancelToken) -> PipelineOutcome
    where
        F: FnMut(Progress),
    {
        let task_id = Uuid::new_v4().to_string();
        let mut tracker = ProgressTracker::new(progress);
        let mut failed_chunks = BTreeSet::new();

        tracker.report(PipelineState::Pending, 0, 0, 0);
        info!("Task {} started with voice {}", task_id, voice);

        let run = AssertUnwindSafe(self.drive(&task_id, input, voice, &mut tracker, cancel, &mut failed_chunks))
            .catch_unwind()
            .await;
        let result = run.unwrap_or_else(|_| Err(PipelineError::Internal("conversion task panicked".to_string())));

        match result {
            Ok(audio) => {
                tracker.report(PipelineState::Complete, PERCENT_COMPLETE, 0, 0);
                info!(
                    "Task {} complete: {} bytes, {} chunk(s) skipped",
                    task_id,
                    audio.len(),
                    failed_chunks.len()
                );
                PipelineOutcome {
                    task_id,
                    state: PipelineState::Complete,
                    final_audio: Some(audio),
                    failed_chunks,
                    error: None,
                    error_summary: None,
                }
            }
            Err(e) => {
                tracker.report(PipelineState::Failed, 0, 0, 0);
                error!("Task {} failed: {}", task_id, e);
                let error_summary = match &e {
                    PipelineError::Internal(_) => "Conversion failed due to an unexpected error".to_string(),
                    other => other.to_string(),
                };
                PipelineOutcome {
                    task_id,
                    state: PipelineState::Failed,
                    final_audio: None,
                    failed_chunks,
                    error: Some(e),
                    error_summary: Some(error_summary),
                }
            }
        }
    }

    async fn drive<F>(
        &self,
        task_id: &str,
        input: Input<'_>,
        voice: &VoiceId,
        tracker: &mut ProgressTracker<F>,
        cancel: &CancelToken,
        failed: &mut BTreeSet<usize>,
    ) -> Result<Vec<u8>>
    where
        F: FnMut(Progress),
    {
        self.config.validate()?;

        let chunks = match input {
            Input::Chunks(chunks) => chunks,
            Input::Text(raw) => self.prepare(Document::new(task_id, raw), tracker)?,
            Input::Pdf { bytes, source } => {
                tracker.report(PipelineState::Extracting, PERCENT_EXTRACTING, 0, 0);
                let raw = self.extractor.extract_text(bytes)?;
                self.prepare(Document::new(source, raw), tracker)?
            }
        };
        if chunks.is_empty() {
            return Err(PipelineError::EmptyDocument);
        }
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let total = chunks.len();
        let workspace = TaskWorkspace::create(task_id, self.config.work_dir.as_deref())?;

        tracker.report(PipelineState::Converting, PERCENT_CHUNKING, 0, total);
        let results = convert_all(
            Arc::clone(&self.converter),
            chunks,
            voice,
            self.config.concurrency_limit,
            cancel,
            |done, total| {
                tracker.report(
                    PipelineState::Converting,
                    conversion_percent(done, total),
                    done,
                    total,
                )
            },
        )
        .await?;

        let mut segments = Vec::new();
        let mut voice_failures = 0;
        for result in results {
            match result.outcome {
                ChunkOutcome::Success(audio) => {
                    let extension = AudioFormat::sniff(&audio).map_or("bin", |f| f.extension());
                    segments.push(workspace.write_segment(result.chunk_index, extension, &audio)?);
                }
                ChunkOutcome::Failure(reason) => {
                    warn!("Skipping chunk {}: {}", result.chunk_index, reason);
                    if reason == FailureReason::VoiceUnavailable {
                        voice_failures += 1;
                    }
                    failed.insert(result.chunk_index);
                }
            }
        }

        if segments.is_empty() {
            if voice_failures == failed.len() {
                return Err(PipelineError::VoiceUnavailable(voice.to_string()));
            }
            return Err(PipelineError::NoAudioProduced {
                failed: failed.len(),
            });
        }
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        tracker.report(PipelineState::Merging, PERCENT_MERGING, total, total);
        debug!("Merging {} of {} segments", segments.len(), total);
        let audio = self.assembler.merge(&segments)?;

        if let Err(e) = workspace.close() {
            warn!("Task {}: {}", task_id, e);
        }
        Ok(audio)
    }

    /// Normalize and chunk a document.
    fn prepare<F>(&self, document: Document, tracker: &mut ProgressTracker<F>) -> Result<Vec<Chunk>>
    where
        F: FnMut(Progress),
    {
        tracker.report(PipelineState::Extracting, PERCENT_EXTRACTING, 0, 0);
        let normalized = text::normalize(&document.text);
        debug!(
            "Normalized {}: {} words in, {} characters out",
            document.source,
            document.word_count(),
            normalized.chars().count()
        );

        tracker.report(PipelineState::Chunking, PERCENT_CHUNKING, 0, 0);
        let chunks = text::chunk(&normalized, self.config.max_chunk_size)?;
        info!("{} split into {} chunk(s)", document.source, chunks.len());
        Ok(chunks)
    }
}
