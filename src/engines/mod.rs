//! External model engines
//!
//! The gateway never runs a model itself. Each stage of the pipeline talks to
//! one engine through a trait so the models can be swapped (HTTP service,
//! local binary, test double) without touching the orchestrator.

mod llama;
mod speech;
mod whisper_api;
mod whisper_cli;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

pub use llama::LlamaServerEngine;
pub use speech::SpeechApiEngine;
pub use whisper_api::WhisperApiEngine;
pub use whisper_cli::WhisperCliEngine;

use crate::audio::AudioBuffer;
use crate::config::{Config, SttBackend};
use crate::persona::GenerationRequest;
use crate::{Error, Result};

/// Whether speech is transcribed as-is or translated to English
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskMode {
    #[default]
    Transcribe,
    Translate,
}

impl TaskMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transcribe => "transcribe",
            Self::Translate => "translate",
        }
    }
}

/// Audio handed to a transcription engine
///
/// Engines that upload bytes use `buffer`; engines that read from disk use
/// `path`, a file unique to the current request.
#[derive(Debug, Clone, Copy)]
pub struct AudioInput<'a> {
    pub buffer: &'a AudioBuffer,
    pub path: &'a Path,
}

/// Speech-to-text engine
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Transcribe an utterance
    ///
    /// # Errors
    ///
    /// Returns error if the engine fails to decode or transcribe the audio
    async fn transcribe(&self, audio: AudioInput<'_>, language: &str, task: TaskMode)
    -> Result<String>;

    /// Engine name for logging
    fn name(&self) -> &'static str;
}

/// Text generation engine
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Complete a prompt
    ///
    /// # Errors
    ///
    /// Returns error if the engine fails to produce a completion
    async fn complete(&self, request: &GenerationRequest) -> Result<String>;

    /// Engine name for logging
    fn name(&self) -> &'static str;
}

/// Speech synthesis engine
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Render text to compressed (MP3) audio
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>>;

    /// Engine name for logging
    fn name(&self) -> &'static str;
}

/// The three engines a pipeline needs
#[derive(Clone)]
pub struct Engines {
    pub transcription: Arc<dyn TranscriptionEngine>,
    pub generation: Arc<dyn GenerationEngine>,
    pub synthesis: Arc<dyn SynthesisEngine>,
}

impl Engines {
    /// Build the configured engines
    ///
    /// # Errors
    ///
    /// Returns error if an endpoint URL is invalid or a local binary/model is missing
    pub fn from_config(config: &Config) -> Result<Self> {
        let stt = &config.transcription;
        let transcription: Arc<dyn TranscriptionEngine> = match stt.backend {
            SttBackend::Api => Arc::new(WhisperApiEngine::new(
                &stt.url,
                stt.model.clone(),
                stt.api_key.clone(),
            )?),
            SttBackend::Cli => Arc::new(WhisperCliEngine::new(
                &stt.whisper_bin,
                stt.whisper_model.clone(),
            )?),
        };

        let generation = Arc::new(LlamaServerEngine::new(&config.generation.url)?);

        let tts = &config.synthesis;
        let synthesis = Arc::new(SpeechApiEngine::new(
            &tts.url,
            tts.model.clone(),
            tts.api_key.clone(),
        )?);

        tracing::info!(
            transcription = transcription.name(),
            generation = generation.name(),
            synthesis = synthesis.name(),
            "engines configured"
        );

        Ok(Self {
            transcription,
            generation,
            synthesis,
        })
    }
}

/// Parse an engine base URL, keeping a trailing slash so paths join under it
pub(crate) fn base_url(raw: &str) -> Result<Url> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };

    Url::parse(&with_slash).map_err(|e| Error::Config(format!("invalid engine URL {raw:?}: {e}")))
}

/// Resolve an endpoint path under a base URL
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url> {
    base.join(path.trim_start_matches('/'))
        .map_err(|e| Error::Config(format!("invalid endpoint {path:?}: {e}")))
}
