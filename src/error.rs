//! Error types for the Elise gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Elise gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Command phrase table is invalid
    #[error("command table error: {0}")]
    CommandTable(String),

    /// Audio payload error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text engine error
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Text generation engine error
    #[error("generation error: {0}")]
    Generation(String),

    /// Speech synthesis engine error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// The message without its category prefix
    ///
    /// For callers that already name the failing stage in their own error.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Config(msg)
            | Self::CommandTable(msg)
            | Self::Audio(msg)
            | Self::Transcription(msg)
            | Self::Generation(msg)
            | Self::Synthesis(msg) => msg.clone(),
            Self::Io(e) => e.to_string(),
            Self::Toml(e) => e.to_string(),
        }
    }
}
