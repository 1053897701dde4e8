//! Configuration management for the Elise gateway
//!
//! Values resolve `env > TOML file > default`. Defaults reproduce the
//! reference deployment: French transcription, a llama.cpp server for
//! replies and the `fr-FR-DeniseNeural` voice.

pub mod file;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::engines::TaskMode;
use crate::intent::{IntentMatcher, START_PHRASES, STOP_PHRASES};
use crate::persona::{GenerationParams, PersonaTemplate};
use crate::{Error, Result};

use file::EliseConfigFile;

/// Default port of the HTTP API
pub const DEFAULT_PORT: u16 = 5174;

/// Default upload limit (25 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Default synthesis voice
pub const DEFAULT_VOICE: &str = "fr-FR-DeniseNeural";

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub transcription: TranscriptionConfig,
    pub generation: GenerationConfig,
    pub persona: PersonaTemplate,
    pub synthesis: SynthesisConfig,
    pub pipeline: PipelineConfig,
    pub commands: CommandsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub rate_limit_per_minute: Option<u32>,
}

/// Speech-to-text backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SttBackend {
    /// OpenAI-compatible HTTP service
    #[default]
    Api,
    /// Local whisper.cpp binary
    Cli,
}

impl FromStr for SttBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" | "http" => Ok(Self::Api),
            "cli" | "local" => Ok(Self::Cli),
            other => Err(Error::Config(format!("unknown transcription backend: {other}"))),
        }
    }
}

fn parse_task(s: &str) -> Result<TaskMode> {
    match s.trim().to_ascii_lowercase().as_str() {
        "transcribe" => Ok(TaskMode::Transcribe),
        "translate" => Ok(TaskMode::Translate),
        other => Err(Error::Config(format!("unknown transcription task: {other}"))),
    }
}

/// Speech-to-text configuration
#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    pub backend: SttBackend,
    pub url: String,
    pub model: String,
    pub language: String,
    pub task: TaskMode,
    pub api_key: Option<SecretString>,
    pub whisper_bin: String,
    pub whisper_model: PathBuf,
}

/// Text generation configuration
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub url: String,
    pub params: GenerationParams,
}

/// Speech synthesis configuration
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub url: String,
    pub model: String,
    pub voice: String,
    pub api_key: Option<SecretString>,
}

/// Orchestration configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Serialize calls to each engine (one in flight at a time)
    pub serialize_engines: bool,
    pub transcription_timeout: Option<Duration>,
    pub generation_timeout: Option<Duration>,
    pub synthesis_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            serialize_engines: true,
            transcription_timeout: None,
            generation_timeout: None,
            synthesis_timeout: None,
        }
    }
}

/// Command phrase lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandsConfig {
    pub start: Vec<String>,
    pub stop: Vec<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            start: START_PHRASES.iter().map(ToString::to_string).collect(),
            stop: STOP_PHRASES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl CommandsConfig {
    /// Build the validated intent matcher
    ///
    /// # Errors
    ///
    /// Returns error if the phrase lists fail validation
    pub fn matcher(&self) -> Result<IntentMatcher> {
        IntentMatcher::new(&self.start, &self.stop)
    }
}

impl Config {
    /// Load configuration from the process environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(path);
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is invalid
    pub fn from_sources(fc: EliseConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_parsed = |key: &str| env(key).and_then(|v| v.parse().ok());
        let shared_key = env("OPENAI_API_KEY");

        let server = ServerConfig {
            host: env("ELISE_HOST")
                .or(fc.server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env_parsed("ELISE_PORT")
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
            max_upload_bytes: fc
                .server
                .max_upload_bytes
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            rate_limit_per_minute: fc.server.rate_limit_per_minute,
        };

        let stt = fc.transcription;
        let transcription = TranscriptionConfig {
            backend: env("ELISE_STT_BACKEND")
                .or(stt.backend)
                .map(|b| b.parse::<SttBackend>())
                .transpose()?
                .unwrap_or_default(),
            url: env("ELISE_STT_URL")
                .or(stt.url)
                .unwrap_or_else(|| "http://localhost:8000/v1".to_string()),
            model: env("ELISE_STT_MODEL")
                .or(stt.model)
                .unwrap_or_else(|| "small".to_string()),
            language: stt.language.unwrap_or_else(|| "fr".to_string()),
            task: stt.task.as_deref().map(parse_task).transpose()?.unwrap_or_default(),
            api_key: stt.api_key.or_else(|| shared_key.clone()).map(SecretString::from),
            whisper_bin: env("ELISE_WHISPER_BIN")
                .or(stt.whisper_bin)
                .unwrap_or_else(|| "whisper-cli".to_string()),
            whisper_model: env("ELISE_WHISPER_MODEL")
                .or(stt.whisper_model)
                .map_or_else(|| PathBuf::from("models/ggml-small.bin"), PathBuf::from),
        };

        let defaults = GenerationParams::default();
        let gen_fc = fc.generation;
        let generation = GenerationConfig {
            url: env("ELISE_LLM_URL")
                .or(gen_fc.url)
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            params: GenerationParams {
                max_tokens: gen_fc.max_tokens.unwrap_or(defaults.max_tokens),
                temperature: gen_fc.temperature.unwrap_or(defaults.temperature),
                top_p: gen_fc.top_p.unwrap_or(defaults.top_p),
                top_k: gen_fc.top_k.unwrap_or(defaults.top_k),
                repeat_penalty: gen_fc.repeat_penalty.unwrap_or(defaults.repeat_penalty),
            },
        };

        let default_persona = PersonaTemplate::default();
        let persona = PersonaTemplate::new(
            fc.persona
                .instruction
                .unwrap_or_else(|| default_persona.instruction().to_string()),
            fc.persona
                .fallback_reply
                .unwrap_or_else(|| default_persona.fallback_reply().to_string()),
        );

        let tts = fc.synthesis;
        let synthesis = SynthesisConfig {
            url: env("ELISE_TTS_URL")
                .or(tts.url)
                .unwrap_or_else(|| "http://localhost:5050/v1".to_string()),
            model: tts.model.unwrap_or_else(|| "tts-1".to_string()),
            voice: env("ELISE_TTS_VOICE")
                .or(tts.voice)
                .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            api_key: tts.api_key.or(shared_key).map(SecretString::from),
        };

        let pipeline = PipelineConfig {
            serialize_engines: fc.pipeline.serialize_engines.unwrap_or(true),
            transcription_timeout: fc
                .pipeline
                .transcription_timeout_secs
                .map(Duration::from_secs),
            generation_timeout: fc.pipeline.generation_timeout_secs.map(Duration::from_secs),
            synthesis_timeout: fc.pipeline.synthesis_timeout_secs.map(Duration::from_secs),
        };

        let builtin = CommandsConfig::default();
        let commands = CommandsConfig {
            start: fc.commands.start.unwrap_or(builtin.start),
            stop: fc.commands.stop.unwrap_or(builtin.stop),
        };

        let config = Self {
            server,
            transcription,
            generation,
            persona,
            synthesis,
            pipeline,
            commands,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns error describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.server.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be positive".to_string()));
        }
        if self.server.rate_limit_per_minute == Some(0) {
            return Err(Error::Config(
                "rate_limit_per_minute must be positive (omit it to disable)".to_string(),
            ));
        }
        if self.transcription.language.trim().is_empty() {
            return Err(Error::Config("transcription language is empty".to_string()));
        }

        let params = &self.generation.params;
        if params.max_tokens == 0 {
            return Err(Error::Config("max_tokens must be positive".to_string()));
        }
        if !(0.0..=2.0).contains(&params.temperature) {
            return Err(Error::Config(format!(
                "temperature out of range: {}",
                params.temperature
            )));
        }
        if !(params.top_p > 0.0 && params.top_p <= 1.0) {
            return Err(Error::Config(format!("top_p out of range: {}", params.top_p)));
        }
        if params.repeat_penalty <= 0.0 {
            return Err(Error::Config(format!(
                "repeat_penalty must be positive: {}",
                params.repeat_penalty
            )));
        }

        if self.synthesis.voice.trim().is_empty() {
            return Err(Error::Config("synthesis voice is empty".to_string()));
        }

        for (name, timeout) in [
            ("transcription", self.pipeline.transcription_timeout),
            ("generation", self.pipeline.generation_timeout),
            ("synthesis", self.pipeline.synthesis_timeout),
        ] {
            if timeout == Some(Duration::ZERO) {
                return Err(Error::Config(format!("{name} timeout must be positive")));
            }
        }

        Ok(())
    }
}
