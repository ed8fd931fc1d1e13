use thiserror::Error;

/// Document-level and assembly-level failures. Any of these ends a run in
/// the `Failed` state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Document contains no usable text")]
    EmptyDocument,

    #[error("Voice not available: {0}")]
    VoiceUnavailable(String),

    #[error("No audio was produced ({failed} chunk(s) failed)")]
    NoAudioProduced { failed: usize },

    #[error("Audio merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error("Conversion cancelled")]
    Cancelled,

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Task workspace error: {0}")]
    Workspace(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a single chunk produced no audio. Chunk failures are recorded and the
/// chunk is skipped during assembly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    #[error("voice unavailable")]
    VoiceUnavailable,

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("timed out")]
    Timeout,

    #[error("provider returned empty audio")]
    EmptyOutput,
}

impl FailureReason {
    /// Whether another attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureReason::VoiceUnavailable)
    }
}

/// Errors raised while concatenating audio segments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("no segments to merge")]
    NoSegments,

    #[error("segment {index}: {message}")]
    UnreadableSegment { index: usize, message: String },

    #[error("segment {index} is not in a recognized audio format")]
    UnrecognizedFormat { index: usize },

    #[error("segment {index} does not match the format of the first segment")]
    FormatMismatch { index: usize },

    #[error("ffmpeg concat failed: {0}")]
    Ffmpeg(String),

    #[error("WAV encoding failed: {0}")]
    Encode(String),

    #[error("merged audio too large for WAV ({bytes} bytes of samples)")]
    TooLarge { bytes: u64 },
}

/// Errors reported by a text-to-speech provider or voice directory.
#[derive(Error, Debug)]
pub enum TtsError {
    #[error("Voice '{0}' not found")]
    VoiceNotFound(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Provider error{}: {message}", .status_code.map(|c| format!(" (HTTP {})", c)).unwrap_or_default())]
    Provider {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Provider not available: {0}")]
    ProviderUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TtsError> for FailureReason {
    fn from(err: TtsError) -> Self {
        match err {
            TtsError::VoiceNotFound(_) => FailureReason::VoiceUnavailable,
            TtsError::Timeout => FailureReason::Timeout,
            other => FailureReason::TransportError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tts_error_maps_to_failure_reason() {
        let reason: FailureReason = TtsError::VoiceNotFound("en-US-Foo".to_string()).into();
        assert_eq!(reason, FailureReason::VoiceUnavailable);

        let reason: FailureReason = TtsError::Timeout.into();
        assert_eq!(reason, FailureReason::Timeout);

        let reason: FailureReason = TtsError::Provider {
            message: "bad gateway".to_string(),
            status_code: Some(502),
        }
        .into();
        assert_eq!(
            reason,
            FailureReason::TransportError("Provider error (HTTP 502): bad gateway".to_string())
        );
    }

    #[test]
    fn test_voice_unavailable_not_retryable() {
        assert!(!FailureReason::VoiceUnavailable.is_retryable());
        assert!(FailureReason::Timeout.is_retryable());
        assert!(FailureReason::EmptyOutput.is_retryable());
        assert!(FailureReason::TransportError("reset".into()).is_retryable());
    }

    #[test]
    fn test_merge_error_wraps_into_pipeline_error() {
        let err: PipelineError = MergeError::FormatMismatch { index: 3 }.into();
        assert_eq!(
            err.to_string(),
            "Audio merge failed: segment 3 does not match the format of the first segment"
        );
    }
}
