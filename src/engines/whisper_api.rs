//! OpenAI-compatible Whisper transcription over HTTP

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use super::{AudioInput, TaskMode, TranscriptionEngine, base_url, endpoint};
use crate::{Error, Result};

/// Response from the transcription API
#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes through `/audio/transcriptions` (or `/audio/translations`)
pub struct WhisperApiEngine {
    client: Client,
    base_url: Url,
    model: String,
    api_key: Option<SecretString>,
}

impl WhisperApiEngine {
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

    const fn path_for(task: TaskMode) -> &'static str {
        match task {
            TaskMode::Transcribe => "audio/transcriptions",
            TaskMode::Translate => "audio/translations",
        }
    }
}

#[async_trait]
impl TranscriptionEngine for WhisperApiEngine {
    async fn transcribe(
        &self,
        audio: AudioInput<'_>,
        language: &str,
        task: TaskMode,
    ) -> Result<String> {
        let format = audio.buffer.format();
        tracing::debug!(
            audio_bytes = audio.buffer.len(),
            ?format,
            language,
            task = task.as_str(),
            "starting Whisper transcription"
        );

        let part = Part::bytes(audio.buffer.as_bytes().to_vec())
            .file_name(format!("audio.{}", format.extension()))
            .mime_str(format.mime())
            .map_err(|e| Error::Transcription(format!("invalid MIME type: {e}")))?;

        let mut form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "json");

        // The translations endpoint always targets English
        if task == TaskMode::Transcribe {
            form = form.text("language", language.to_string());
        }

        let mut request = self
            .client
            .post(endpoint(&self.base_url, Self::path_for(task))?)
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "Whisper request failed");
            Error::Transcription(format!("request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Transcription(format!(
                "Whisper API error {status}: {body}"
            )));
        }

        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("failed to parse response: {e}")))?;

        Ok(result.text)
    }

    fn name(&self) -> &'static str {
        "whisper-api"
    }
}
