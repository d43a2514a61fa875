//! Streaming speech synthesis client.
//!
//! The service takes one JSON POST per sentence and answers with a raw
//! PCM byte stream; the session plays it while it downloads.

use crate::config::SynthesisConfig;
use crate::error::{LivesubError, Result};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;

/// Streamed synthesis audio.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// One-shot synthesis request returning a byte stream.
#[async_trait]
pub trait SynthesisClient: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<ByteStream>;
}

/// Default voice for a target language, e.g.
/// `FunAudioLLM/CosyVoice2-0.5B:alex` for English.
pub fn default_voice(model: &str, language: &str) -> String {
    let speaker = match language {
        "zh-CN" => "xiaoxiao",
        "ja-JP" => "takeshi",
        _ => "alex",
    };
    format!("{}:{}", model, speaker)
}

/// Creates synthesis clients. The supervisor builds a fresh client on
/// every start because the voice follows the configured target language.
pub trait SynthesisClientFactory: Send + Sync {
    fn create(&self, config: &SynthesisConfig, target_language: &str) -> Arc<dyn SynthesisClient>;
}

/// Factory for the HTTP client.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpSynthesisFactory;

impl SynthesisClientFactory for HttpSynthesisFactory {
    fn create(&self, config: &SynthesisConfig, target_language: &str) -> Arc<dyn SynthesisClient> {
        Arc::new(HttpSynthesisClient::from_config(
            config,
            target_language,
            crate::defaults::PLAYBACK_SAMPLE_RATE,
        ))
    }
}

/// HTTP implementation of [`SynthesisClient`].
pub struct HttpSynthesisClient {
    endpoint: String,
    api_key: String,
    model: String,
    voice: String,
    speed: f32,
    gain: f32,
    sample_rate: u32,
    client: reqwest::Client,
}

impl HttpSynthesisClient {
    /// Build a client from config; an empty configured voice falls back
    /// to the per-language default.
    pub fn from_config(config: &SynthesisConfig, target_language: &str, sample_rate: u32) -> Self {
        let voice = if config.voice.is_empty() {
            default_voice(&config.model, target_language)
        } else {
            config.voice.clone()
        };

        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            voice,
            speed: config.speed,
            gain: config.gain,
            sample_rate,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SynthesisClient for HttpSynthesisClient {
    async fn synthesize(&self, text: &str) -> Result<ByteStream> {
        let payload = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": "pcm",
            "sample_rate": self.sample_rate,
            "stream": true,
            "speed": self.speed,
            "gain": self.gain,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| LivesubError::SynthesisRequest {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LivesubError::SynthesisStatus {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| LivesubError::SynthesisRequest {
                    message: e.to_string(),
                })
        });

        Ok(Box::pin(stream))
    }
}
