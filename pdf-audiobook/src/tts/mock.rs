//! Mock TTS provider for testing
//!
//! Scripts per-call behavior (failures, delays, side effects) and counts
//! calls so pipeline behavior can be tested without a real speech service.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{TtsProvider, VoiceDirectory, VoiceId};
use crate::error::TtsError;

type Responder = Box<dyn Fn(usize, &str) -> Result<Vec<u8>, TtsError> + Send + Sync>;
type CallHook = Box<dyn Fn(usize) + Send + Sync>;

/// A minimal MPEG-1 Layer III frame header followed by a payload byte.
pub fn mp3_frame(tag: u8) -> Vec<u8> {
    vec![0xFF, 0xFB, 0x90, 0x64, tag, tag, tag, tag]
}

/// A scripted provider for testing conversion and retry behavior
pub struct MockProvider {
    /// Decides the response for (0-based call number, text)
    respond: Responder,
    /// Runs at the start of every call with the 1-based call number
    on_call: Option<CallHook>,
    /// Current call count
    call_count: AtomicUsize,
    /// Texts seen, in call order
    texts: Mutex<Vec<String>>,
    /// Simulated latency per call
    delay: Duration,
    /// Voices reported by the directory (None = listing fails)
    voices: Option<Vec<VoiceId>>,
}

impl MockProvider {
    /// Create a provider from a response function of (call number, text)
    pub fn from_fn<F>(respond: F) -> Self
    where
        F: Fn(usize, &str) -> Result<Vec<u8>, TtsError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            on_call: None,
            call_count: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            voices: None,
        }
    }

    /// Create a provider that always returns `audio`
    pub fn always_succeeds(audio: Vec<u8>) -> Self {
        Self::from_fn(move |_, _| Ok(audio.clone()))
    }

    /// Create a provider that always fails with a transport error
    pub fn always_fails() -> Self {
        Self::from_fn(|_, _| {
            Err(TtsError::Provider {
                message: "connection reset".to_string(),
                status_code: None,
            })
        })
    }

    /// Create a provider that fails `n` times with a transport error, then succeeds
    pub fn fails_then_succeeds(n: usize, audio: Vec<u8>) -> Self {
        Self::from_fn(move |call, _| {
            if call < n {
                Err(TtsError::Provider {
                    message: "server overloaded".to_string(),
                    status_code: Some(503),
                })
            } else {
                Ok(audio.clone())
            }
        })
    }

    /// Run `hook` with the 1-based call number before each call is answered
    pub fn with_call_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_call = Some(Box::new(hook));
        self
    }

    /// Delay every call by `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make the voice directory answer with `voices`
    pub fn with_voices(mut self, voices: Vec<VoiceId>) -> Self {
        self.voices = Some(voices);
        self
    }

    /// Get the number of times synthesize() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Texts passed to synthesize(), in call order
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TtsProvider for MockProvider {
    async fn synthesize(&self, text: &str, _voice: &VoiceId) -> Result<Vec<u8>, TtsError> {
        let call_num = self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut texts) = self.texts.lock() {
            texts.push(text.to_string());
        }
        if let Some(hook) = &self.on_call {
            hook(call_num + 1);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.respond)(call_num, text)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[async_trait]
impl VoiceDirectory for MockProvider {
    async fn list_voices(&self) -> Result<Vec<VoiceId>, TtsError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.voices
            .clone()
            .ok_or_else(|| TtsError::ProviderUnavailable("mock directory offline".to_string()))
    }
}
