//! TTS provider traits and types.

pub mod edge;
pub mod http;
pub mod mock;

use crate::config::AppConfig;
use crate::error::{PipelineError, TtsError};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use edge::EdgeTtsProvider;
pub use http::HttpTtsProvider;
pub use mock::MockProvider;

/// How long to wait for a voice directory before using the fallback list.
pub const DEFAULT_VOICE_LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Opaque token selecting a synthesis voice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceId(String);

impl VoiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VoiceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VoiceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Trait for speech synthesis providers.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Synthesize `text` with `voice`, returning encoded audio bytes.
    async fn synthesize(&self, text: &str, voice: &VoiceId) -> Result<Vec<u8>, TtsError>;

    /// Get the provider name for display
    fn name(&self) -> &'static str;
}

/// Trait for services that can enumerate their voices.
#[async_trait]
pub trait VoiceDirectory: Send + Sync {
    async fn list_voices(&self) -> Result<Vec<VoiceId>, TtsError>;
}

/// Supported provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// The `edge-tts` command line tool
    #[default]
    Edge,
    /// An OpenAI-compatible `/audio/speech` endpoint
    Http,
}

impl ProviderKind {
    /// Parse provider kind from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "edge" | "edge-tts" | "edge_tts" => Some(Self::Edge),
            "http" | "openai" => Some(Self::Http),
            _ => None,
        }
    }

    /// Static voice list used when the provider's directory is unreachable.
    pub fn default_voices(&self) -> Vec<VoiceId> {
        let ids: &[&str] = match self {
            Self::Edge => &[
                "en-US-AriaNeural",
                "en-US-GuyNeural",
                "en-US-JennyNeural",
                "en-GB-SoniaNeural",
                "en-GB-RyanNeural",
                "en-AU-NatashaNeural",
            ],
            Self::Http => &["alloy", "echo", "fable", "onyx", "nova", "shimmer"],
        };
        ids.iter().map(|id| VoiceId::from(*id)).collect()
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Edge => f.write_str("edge"),
            Self::Http => f.write_str("http"),
        }
    }
}

/// A provider that can both synthesize and list voices.
pub trait SpeechService: TtsProvider + VoiceDirectory {}

impl<T: TtsProvider + VoiceDirectory> SpeechService for T {}

/// Create the provider selected in the configuration.
pub fn create_provider(config: &AppConfig) -> Result<Arc<dyn SpeechService>, TtsError> {
    match config.provider {
        ProviderKind::Edge => Ok(Arc::new(EdgeTtsProvider::new(config.edge.program.clone()))),
        ProviderKind::Http => {
            let api_key = config
                .http
                .api_key
                .clone()
                .or_else(|| std::env::var("TTS_API_KEY").ok());
            Ok(Arc::new(HttpTtsProvider::new(
                &config.http.base_url,
                &config.http.model,
                api_key,
            )?))
        }
    }
}

/// Resolve the voices a caller may choose from.
///
/// Uses the directory's list when it answers in time with at least one voice,
/// otherwise the fallback list. Both empty is `VoiceUnavailable`.
pub async fn resolve_voices<D>(
    directory: &D,
    fallback: &[VoiceId],
    timeout: Duration,
) -> Result<Vec<VoiceId>, PipelineError>
where
    D: VoiceDirectory + ?Sized,
{
    match tokio::time::timeout(timeout, directory.list_voices()).await {
        Ok(Ok(voices)) if !voices.is_empty() => {
            debug!("Voice directory returned {} voice(s)", voices.len());
            return Ok(voices);
        }
        Ok(Ok(_)) => warn!("Voice directory returned no voices, using fallback list"),
        Ok(Err(e)) => warn!("Could not load voices: {}", e),
        Err(_) => warn!("Voice directory timed out after {:?}", timeout),
    }

    if fallback.is_empty() {
        return Err(PipelineError::VoiceUnavailable(
            "no voices available from provider or fallback list".to_string(),
        ));
    }
    Ok(fallback.to_vec())
}

/// Pick the voice to use: the requested one, else the first available.
pub fn select_voice(requested: Option<&str>, available: &[VoiceId]) -> Result<VoiceId, PipelineError> {
    match requested {
        Some(id) => Ok(VoiceId::from(id)),
        None => available.first().cloned().ok_or_else(|| {
            PipelineError::VoiceUnavailable("no voice selected and none available".to_string())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!(ProviderKind::parse("edge-tts"), Some(ProviderKind::Edge));
        assert_eq!(ProviderKind::parse("HTTP"), Some(ProviderKind::Http));
        assert_eq!(ProviderKind::parse("openai"), Some(ProviderKind::Http));
        assert_eq!(ProviderKind::parse("festival"), None);
    }

    #[test]
    fn test_default_voices_non_empty() {
        assert!(!ProviderKind::Edge.default_voices().is_empty());
        assert_eq!(ProviderKind::Http.default_voices()[0], VoiceId::from("alloy"));
    }

    #[test]
    fn test_select_voice() {
        let voices = vec![VoiceId::from("a"), VoiceId::from("b")];
        assert_eq!(select_voice(Some("b"), &voices).unwrap(), VoiceId::from("b"));
        assert_eq!(select_voice(None, &voices).unwrap(), VoiceId::from("a"));
        assert!(matches!(
            select_voice(None, &[]),
            Err(PipelineError::VoiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_voices_prefers_directory() {
        let directory = MockProvider::always_succeeds(vec![1])
            .with_voices(vec![VoiceId::from("x"), VoiceId::from("y")]);
        let voices = resolve_voices(&directory, &[VoiceId::from("fallback")], DEFAULT_VOICE_LIST_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(voices, vec![VoiceId::from("x"), VoiceId::from("y")]);
    }

    #[tokio::test]
    async fn test_resolve_voices_falls_back_on_error() {
        let directory = MockProvider::always_succeeds(vec![1]);
        let voices = resolve_voices(&directory, &[VoiceId::from("fallback")], DEFAULT_VOICE_LIST_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(voices, vec![VoiceId::from("fallback")]);
    }

    #[tokio::test]
    async fn test_resolve_voices_falls_back_on_empty_list() {
        let directory = MockProvider::always_succeeds(vec![1]).with_voices(Vec::new());
        let voices = resolve_voices(&directory, &[VoiceId::from("fallback")], DEFAULT_VOICE_LIST_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(voices, vec![VoiceId::from("fallback")]);
    }

    #[tokio::test]
    async fn test_resolve_voices_both_empty_is_voice_unavailable() {
        let directory = MockProvider::always_succeeds(vec![1]).with_voices(Vec::new());
        let result = resolve_voices(&directory, &[], DEFAULT_VOICE_LIST_TIMEOUT).await;
        assert!(matches!(result, Err(PipelineError::VoiceUnavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_voices_does_not_block_on_slow_directory() {
        let directory = MockProvider::always_succeeds(vec![1])
            .with_voices(vec![VoiceId::from("slow")])
            .with_delay(Duration::from_secs(60));
        let voices = resolve_voices(&directory, &[VoiceId::from("fallback")], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(voices, vec![VoiceId::from("fallback")]);
    }
}
