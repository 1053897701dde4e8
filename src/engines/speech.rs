//! OpenAI-compatible speech synthesis over HTTP

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use url::Url;

use super::{SynthesisEngine, base_url, endpoint};
use crate::{Error, Result};

/// Synthesizes through `/audio/speech`
///
/// Works with any server speaking the `OpenAI` speech API, including bridges
/// to Edge neural voices such as `fr-FR-DeniseNeural`.
pub struct SpeechApiEngine {
    client: Client,
    base_url: Url,
    model: String,
    api_key: Option<SecretString>,
}

impl SpeechApiEngine {
    /// Create a new engine
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is invalid
    pub fn new(url: &str, model: String, api_key: Option<SecretString>) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            base_url: base_url(url)?,
            model,
            api_key,
        })
    }
}

#[async_trait]
impl SynthesisEngine for SpeechApiEngine {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            response_format: &'static str,
        }

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice,
            response_format: "mp3",
        };

        let mut builder = self
            .client
            .post(endpoint(&self.base_url, "audio/speech")?)
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("TTS error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(format!("failed to read audio: {e}")))?;

        if audio.is_empty() {
            return Err(Error::Synthesis("TTS returned no audio".to_string()));
        }

        Ok(audio.to_vec())
    }

    fn name(&self) -> &'static str {
        "speech-api"
    }
}
