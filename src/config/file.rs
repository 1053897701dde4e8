//! TOML configuration file loading
//!
//! Supports `~/.config/elise/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EliseConfigFile {
    #[serde(default)]
    pub server: ServerFileConfig,

    #[serde(default)]
    pub transcription: TranscriptionFileConfig,

    #[serde(default)]
    pub generation: GenerationFileConfig,

    #[serde(default)]
    pub persona: PersonaFileConfig,

    #[serde(default)]
    pub synthesis: SynthesisFileConfig,

    #[serde(default)]
    pub pipeline: PipelineFileConfig,

    /// Command phrase overrides
    #[serde(default)]
    pub commands: CommandsFileConfig,
}

/// HTTP server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Largest accepted upload, in bytes
    pub max_upload_bytes: Option<usize>,
    /// Global request budget; unset disables rate limiting
    pub rate_limit_per_minute: Option<u32>,
}

/// Speech-to-text configuration
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptionFileConfig {
    /// "api" or "cli"
    pub backend: Option<String>,
    pub url: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
    /// "transcribe" or "translate"
    pub task: Option<String>,
    pub api_key: Option<String>,
    /// whisper.cpp binary name or path (cli backend)
    pub whisper_bin: Option<String>,
    /// whisper.cpp model file (cli backend)
    pub whisper_model: Option<String>,
}

/// Text generation configuration
#[derive(Debug, Default, Deserialize)]
pub struct GenerationFileConfig {
    pub url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub repeat_penalty: Option<f32>,
}

/// Persona framing
#[derive(Debug, Default, Deserialize)]
pub struct PersonaFileConfig {
    pub instruction: Option<String>,
    pub fallback_reply: Option<String>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct SynthesisFileConfig {
    pub url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub api_key: Option<String>,
}

/// Orchestration configuration
#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    /// Allow at most one in-flight call per engine
    pub serialize_engines: Option<bool>,
    pub transcription_timeout_secs: Option<u64>,
    pub generation_timeout_secs: Option<u64>,
    pub synthesis_timeout_secs: Option<u64>,
}

/// Command phrase overrides; an absent list keeps the built-in phrases
#[derive(Debug, Default, Deserialize)]
pub struct CommandsFileConfig {
    pub start: Option<Vec<String>>,
    pub stop: Option<Vec<String>>,
}

/// Parse a config file body
///
/// # Errors
///
/// Returns error if the TOML is malformed or has unknown sections
pub fn parse_config(content: &str) -> Result<EliseConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from `path`, or the standard path
///
/// Returns `EliseConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> EliseConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return EliseConfigFile::default();
    };

    if !path.exists() {
        return EliseConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                EliseConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            EliseConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/elise/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("elise").join("config.toml"))
}
