//! Microsoft Edge read-aloud voices via the `edge-tts` command line tool.
//!
//! Each call runs `edge-tts` as a subprocess writing MP3 to a temporary file,
//! which is read back and removed before returning.

use super::{TtsProvider, VoiceDirectory, VoiceId};
use crate::error::TtsError;
use async_trait::async_trait;
use log::debug;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Output;
use tokio::process::Command;

const DEFAULT_PROGRAM: &str = "edge-tts";

/// Provider backed by the `edge-tts` CLI.
pub struct EdgeTtsProvider {
    /// Path to the edge-tts executable
    program: PathBuf,
}

impl EdgeTtsProvider {
    /// Create a new provider, using `edge-tts` from PATH when no program is given.
    pub fn new(program: Option<PathBuf>) -> Self {
        Self {
            program: program.unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRAM)),
        }
    }

    async fn run(&self, command: &mut Command) -> Result<Output, TtsError> {
        command.kill_on_drop(true).output().await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                TtsError::ProviderUnavailable(format!(
                    "'{}' not found. Install it with 'pip install edge-tts'.",
                    self.program.display()
                ))
            } else {
                TtsError::Io(e)
            }
        })
    }
}

#[async_trait]
impl TtsProvider for EdgeTtsProvider {
    async fn synthesize(&self, text: &str, voice: &VoiceId) -> Result<Vec<u8>, TtsError> {
        let media = tempfile::Builder::new()
            .prefix("edge-tts-")
            .suffix(".mp3")
            .tempfile()?;

        let output = self
            .run(
                Command::new(&self.program)
                    .arg(format!("--voice={}", voice))
                    .arg(format!("--text={}", text))
                    .arg("--write-media")
                    .arg(media.path()),
            )
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr, voice));
        }

        let audio = tokio::fs::read(media.path()).await?;
        debug!("edge-tts produced {} bytes for {} chars", audio.len(), text.len());
        Ok(audio)
    }

    fn name(&self) -> &'static str {
        "edge-tts"
    }
}

#[async_trait]
impl VoiceDirectory for EdgeTtsProvider {
    async fn list_voices(&self) -> Result<Vec<VoiceId>, TtsError> {
        let output = self
            .run(Command::new(&self.program).arg("--list-voices"))
            .await?;

        if !output.status.success() {
            return Err(TtsError::Provider {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                status_code: None,
            });
        }

        Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Map edge-tts stderr to an error.
fn classify_failure(stderr: &str, voice: &VoiceId) -> TtsError {
    if stderr.contains("Invalid voice") || stderr.contains("voice not found") {
        return TtsError::VoiceNotFound(voice.to_string());
    }
    if stderr.contains("TimeoutError") || stderr.contains("timed out") {
        return TtsError::Timeout;
    }

    let message = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("edge-tts exited with an error")
        .trim()
        .to_string();
    TtsError::Provider {
        message,
        status_code: None,
    }
}

/// Parse `edge-tts --list-voices` output.
///
/// Handles both the older `Name: xx-XX-FooNeural` records and the tabular
/// layout (a `Name ...` header, a dashed rule, then one voice per row).
pub fn parse_voice_list(output: &str) -> Vec<VoiceId> {
    let mut voices = Vec::new();
    let mut in_table = false;

    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(name) = trimmed.strip_prefix("Name:") {
            let name = name.trim();
            if !name.is_empty() {
                voices.push(VoiceId::from(name));
            }
            continue;
        }
        if trimmed.starts_with("---") {
            in_table = true;
            continue;
        }
        if in_table {
            if let Some(name) = trimmed.split_whitespace().next() {
                voices.push(VoiceId::from(name));
            }
        }
    }

    voices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record_format() {
        let output = "Name: en-US-AriaNeural\nGender: Female\n\nName: en-GB-RyanNeural\nGender: Male\n";
        assert_eq!(
            parse_voice_list(output),
            vec![VoiceId::from("en-US-AriaNeural"), VoiceId::from("en-GB-RyanNeural")]
        );
    }

    #[test]
    fn test_parse_table_format() {
        let output = "\
Name                               Gender    ContentCategories      VoicePersonalities
---------------------------------  --------  ---------------------  --------------------------------------
af-ZA-AdriNeural                   Female    General                Friendly, Positive
en-US-GuyNeural                    Male      News, Novel            Passion
";
        assert_eq!(
            parse_voice_list(output),
            vec![VoiceId::from("af-ZA-AdriNeural"), VoiceId::from("en-US-GuyNeural")]
        );
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_voice_list("").is_empty());
    }

    #[test]
    fn test_classify_invalid_voice() {
        let err = classify_failure("ValueError: Invalid voice 'nope'", &VoiceId::from("nope"));
        assert!(matches!(err, TtsError::VoiceNotFound(v) if v == "nope"));
    }

    #[test]
    fn test_classify_other_failure_uses_last_line() {
        let err = classify_failure(
            "Traceback (most recent call last):\n  ...\naiohttp.ClientConnectorError: cannot connect\n\n",
            &VoiceId::from("en-US-AriaNeural"),
        );
        match err {
            TtsError::Provider { message, status_code } => {
                assert_eq!(message, "aiohttp.ClientConnectorError: cannot connect");
                assert_eq!(status_code, None);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_provider_unavailable() {
        let provider = EdgeTtsProvider::new(Some(PathBuf::from("/nonexistent/edge-tts-binary")));
        let err = provider
            .synthesize("hello", &VoiceId::from("en-US-AriaNeural"))
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::ProviderUnavailable(_)));
    }
}
