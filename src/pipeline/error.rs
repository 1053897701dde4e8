//! Pipeline failure taxonomy

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// One unit of the sequential pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Transcription,
    Generation,
    Synthesis,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transcription => "transcription",
            Self::Generation => "generation",
            Self::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecovered pipeline failures
///
/// Generation failures never appear here: they are replaced by the persona's
/// fallback reply inside the generation stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// Missing or unusable audio in the request
    #[error("{0}")]
    Input(String),

    /// Speech-to-text engine failure
    #[error("transcription failed: {0}")]
    Transcription(String),

    /// Speech synthesis engine failure
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// A stage exceeded its configured timeout
    #[error("{stage} timed out after {}ms", after.as_millis())]
    Timeout { stage: Stage, after: Duration },

    /// The caller went away before the stage started
    #[error("request cancelled before {stage}")]
    Cancelled { stage: Stage },

    /// Local resource failure (scratch space)
    #[error("internal error: {0}")]
    Internal(String),
}

impl StageError {
    /// Stage the failure belongs to, if any
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Transcription(_) => Some(Stage::Transcription),
            Self::Synthesis(_) => Some(Stage::Synthesis),
            Self::Timeout { stage, .. } | Self::Cancelled { stage } => Some(*stage),
            Self::Input(_) | Self::Internal(_) => None,
        }
    }

    /// Whether the failure is the caller's fault
    #[must_use]
    pub const fn is_input(&self) -> bool {
        matches!(self, Self::Input(_))
    }
}
