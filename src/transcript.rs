//! Normalized transcripts
//!
//! Everything downstream of transcription (intent matching, prompt
//! rendering) works on a [`Transcript`], never on raw engine output.

use std::fmt;

/// Lowercase and trim a raw transcript
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
#[must_use]
pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase().trim().to_string()
}

/// A normalized (lowercased, trimmed) transcript
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transcript(String);

impl Transcript {
    /// Normalize raw engine output into a transcript
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        Self(normalize(raw))
    }

    /// Borrow the normalized text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the engine heard nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check whether a phrase appears anywhere inside the transcript
    #[must_use]
    pub fn contains(&self, phrase: &str) -> bool {
        self.0.contains(phrase)
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Transcript {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
