//! pdf-audiobook configuration management.

use crate::audio::AssemblerKind;
use crate::convert::DEFAULT_CHUNK_TIMEOUT;
use crate::error::PipelineError;
use crate::text::DEFAULT_MAX_CHUNK_SIZE;
use crate::tts::ProviderKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of chunk conversions in flight.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 3;

/// Default number of extra attempts for a failed chunk.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;

const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
const DEFAULT_HTTP_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_HTTP_MODEL: &str = "tts-1";

/// Top-level configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default voice identifier. None means the first voice the provider lists.
    #[serde(default)]
    pub voice: Option<String>,

    /// Which TTS backend to use
    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default)]
    pub edge: EdgeConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Settings for the `edge-tts` provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Path to the edge-tts executable (default: found on PATH)
    #[serde(default)]
    pub program: Option<PathBuf>,
}

/// Settings for an OpenAI-compatible speech endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer token. Falls back to the TTS_API_KEY environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
        }
    }
}

/// Tunables for one conversion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum characters per chunk
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// Chunk conversions allowed in flight at once
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Extra attempts for a chunk after a retryable failure
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay before the first retry, doubled on each further attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound on a single TTS call
    #[serde(default = "default_chunk_timeout_secs")]
    pub chunk_timeout_secs: u64,

    /// Parent directory for task workspaces (default: system temp dir)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    #[serde(default)]
    pub assembler: AssemblerKind,

    /// ffmpeg executable for the ffmpeg assembler (default: found on PATH)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
}

fn default_base_url() -> String {
    DEFAULT_HTTP_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_HTTP_MODEL.to_string()
}

fn default_max_chunk_size() -> usize {
    DEFAULT_MAX_CHUNK_SIZE
}

fn default_concurrency_limit() -> usize {
    DEFAULT_CONCURRENCY_LIMIT
}

fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_retry_backoff_ms() -> u64 {
    DEFAULT_RETRY_BACKOFF_MS
}

fn default_chunk_timeout_secs() -> u64 {
    DEFAULT_CHUNK_TIMEOUT.as_secs()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            concurrency_limit: default_concurrency_limit(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            chunk_timeout_secs: default_chunk_timeout_secs(),
            work_dir: None,
            assembler: AssemblerKind::default(),
            ffmpeg_path: None,
        }
    }
}

impl PipelineConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> std::result::Result<(), PipelineError> {
        if self.max_chunk_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.concurrency_limit == 0 {
            return Err(PipelineError::InvalidConfig(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        if self.chunk_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "chunk_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl AppConfig {
    /// Get the config file path: ~/.config/cli-programs/pdf-audiobook.toml
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cli-programs")
            .join("pdf-audiobook.toml")
    }

    /// Load config from the default location, returning defaults if the file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, returning defaults if the file doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.voice.is_none());
        assert_eq!(config.provider, ProviderKind::Edge);
        assert_eq!(config.pipeline.max_chunk_size, 1000);
        assert_eq!(config.pipeline.concurrency_limit, 3);
        assert_eq!(config.pipeline.retry_attempts, 2);
        assert_eq!(config.pipeline.retry_backoff(), Duration::from_millis(500));
        assert_eq!(config.pipeline.chunk_timeout(), Duration::from_secs(120));
        assert_eq!(config.pipeline.assembler, AssemblerKind::Concat);
        assert_eq!(config.http.model, "tts-1");
    }

    #[test]
    fn test_config_path() {
        assert!(AppConfig::config_path().ends_with("cli-programs/pdf-audiobook.toml"));
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
voice = "en-GB-SoniaNeural"
provider = "http"

[http]
base_url = "http://localhost:8880/v1"
model = "kokoro"

[pipeline]
max_chunk_size = 500
concurrency_limit = 6
assembler = "ffmpeg"
work_dir = "/var/tmp/pdf-audiobook"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.voice.as_deref(), Some("en-GB-SoniaNeural"));
        assert_eq!(config.provider, ProviderKind::Http);
        assert_eq!(config.http.base_url, "http://localhost:8880/v1");
        assert_eq!(config.http.model, "kokoro");
        assert_eq!(config.pipeline.max_chunk_size, 500);
        assert_eq!(config.pipeline.concurrency_limit, 6);
        assert_eq!(config.pipeline.retry_attempts, 2);
        assert_eq!(config.pipeline.assembler, AssemblerKind::Ffmpeg);
        assert_eq!(
            config.pipeline.work_dir,
            Some(PathBuf::from("/var/tmp/pdf-audiobook"))
        );
    }

    #[test]
    fn test_parse_empty_config() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.pipeline, PipelineConfig::default());
        assert_eq!(config.http.base_url, DEFAULT_HTTP_BASE_URL);
    }

    #[test]
    fn test_validate() {
        assert!(PipelineConfig::default().validate().is_ok());

        let zero_chunk = PipelineConfig {
            max_chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(zero_chunk.validate(), Err(PipelineError::InvalidConfig(_))));

        let zero_workers = PipelineConfig {
            concurrency_limit: 0,
            ..Default::default()
        };
        assert!(matches!(zero_workers.validate(), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_save_and_load_from() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("pdf-audiobook.toml");

        let mut config = AppConfig::default();
        config.voice = Some("en-US-GuyNeural".to_string());
        config.pipeline.retry_attempts = 5;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.voice.as_deref(), Some("en-US-GuyNeural"));
        assert_eq!(loaded.pipeline.retry_attempts, 5);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.pipeline, PipelineConfig::default());
    }
}
