//! OpenAI-compatible speech API provider
//!
//! Used for services that implement `POST /audio/speech`:
//! - OpenAI
//! - Self-hosted servers exposing the same API (Kokoro-FastAPI, openedai-speech, ...)

use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{TtsProvider, VoiceDirectory, VoiceId};
use crate::error::TtsError;

/// Provider for OpenAI-compatible speech APIs
pub struct HttpTtsProvider {
    model: String,
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpTtsProvider {
    /// Create a new provider
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Result<Self, TtsError> {
        if base_url.trim().is_empty() {
            return Err(TtsError::ProviderUnavailable(
                "http provider requires a base_url".to_string(),
            ));
        }

        Ok(Self {
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: Client::new(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }
}

// Speech API request/response types

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VoicesResponse {
    Wrapped { voices: Vec<VoiceEntry> },
    Bare(Vec<VoiceEntry>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VoiceEntry {
    Id(String),
    Object {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        voice_id: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
}

impl VoicesResponse {
    fn into_ids(self) -> Vec<VoiceId> {
        let entries = match self {
            VoicesResponse::Wrapped { voices } => voices,
            VoicesResponse::Bare(voices) => voices,
        };
        entries
            .into_iter()
            .filter_map(|e| match e {
                VoiceEntry::Id(id) => Some(id),
                VoiceEntry::Object { id, voice_id, name } => id.or(voice_id).or(name),
            })
            .map(VoiceId::from)
            .collect()
    }
}

/// Build the error for a non-success response.
fn error_for_status(status: StatusCode, body: &str, voice: Option<&VoiceId>) -> TtsError {
    let message = if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(body) {
        error_response.error.message
    } else {
        body.to_string()
    };

    if let Some(voice) = voice {
        let mentions_voice = message.to_lowercase().contains("voice");
        if mentions_voice && matches!(status.as_u16(), 400 | 404 | 422) {
            return TtsError::VoiceNotFound(voice.to_string());
        }
    }

    if matches!(status.as_u16(), 408 | 504) {
        return TtsError::Timeout;
    }

    TtsError::Provider {
        message,
        status_code: Some(status.as_u16()),
    }
}

fn request_error(e: reqwest::Error) -> TtsError {
    if e.is_timeout() {
        TtsError::Timeout
    } else {
        TtsError::Provider {
            message: format!("Request failed: {}", e),
            status_code: None,
        }
    }
}

#[async_trait]
impl TtsProvider for HttpTtsProvider {
    async fn synthesize(&self, text: &str, voice: &VoiceId) -> Result<Vec<u8>, TtsError> {
        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: voice.as_str(),
            response_format: "mp3",
        };

        let url = format!("{}/audio/speech", self.base_url);

        let response = self
            .authorize(self.client.post(&url))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, &error_text, Some(voice)));
        }

        let audio = response.bytes().await.map_err(request_error)?;
        Ok(audio.to_vec())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[async_trait]
impl VoiceDirectory for HttpTtsProvider {
    async fn list_voices(&self) -> Result<Vec<VoiceId>, TtsError> {
        let url = format!("{}/voices", self.base_url);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, &error_text, None));
        }

        let voices: VoicesResponse = response.json().await.map_err(|e| TtsError::Provider {
            message: format!("Failed to parse voice list: {}", e),
            status_code: None,
        })?;

        Ok(voices.into_ids())
    }
}
