//! Command intent matching
//!
//! Classifies a normalized transcript against two curated phrase sets.
//! Matching is substring containment so trailing words or punctuation added
//! by the transcription engine do not defeat a command. The stop set is
//! always checked first: "stop" must never lose to "start".

mod phrases;

use std::collections::HashSet;

use serde::Serialize;

pub use phrases::{START_PHRASES, STOP_PHRASES};

use crate::transcript::{Transcript, normalize};
use crate::{Error, Result};

/// Discrete classification of an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// Start the robot's action (dance)
    StartAction,
    /// Stop the robot's action
    StopAction,
    /// Not a command, hand over to generation
    None,
}

impl Intent {
    /// Machine action sent back to the client for command intents
    #[must_use]
    pub const fn action(self) -> Option<CommandAction> {
        match self {
            Self::StartAction => Some(CommandAction::Dance),
            Self::StopAction => Some(CommandAction::StopDance),
            Self::None => None,
        }
    }
}

/// Action name returned in `{"action": ...}` responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    Dance,
    StopDance,
}

impl CommandAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dance => "dance",
            Self::StopDance => "stop_dance",
        }
    }
}

/// Ordered set of literal phrases associated with one intent
#[derive(Debug, Clone)]
pub struct CommandPhraseSet {
    intent: Intent,
    phrases: Vec<String>,
}

impl CommandPhraseSet {
    /// Build a phrase set, normalizing every phrase
    ///
    /// Duplicates inside the set are dropped (first occurrence wins).
    ///
    /// # Errors
    ///
    /// Returns error if a phrase is empty after normalization, since an
    /// empty phrase would match every transcript
    pub fn new<I, S>(intent: Intent, phrases: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut normalized = Vec::new();

        for phrase in phrases {
            let phrase = normalize(phrase.as_ref());
            if phrase.is_empty() {
                return Err(Error::CommandTable(format!(
                    "empty phrase in {intent:?} set"
                )));
            }
            if seen.insert(phrase.clone()) {
                normalized.push(phrase);
            } else {
                tracing::warn!(?intent, %phrase, "duplicate command phrase ignored");
            }
        }

        Ok(Self {
            intent,
            phrases: normalized,
        })
    }

    #[must_use]
    pub const fn intent(&self) -> Intent {
        self.intent
    }

    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// First phrase of the set contained in the transcript
    #[must_use]
    pub fn find_in(&self, transcript: &Transcript) -> Option<&str> {
        self.phrases
            .iter()
            .find(|p| transcript.contains(p))
            .map(String::as_str)
    }
}

/// Classifies transcripts into command intents
///
/// Built once at startup and shared read-only for the process lifetime.
#[derive(Debug, Clone)]
pub struct IntentMatcher {
    stop: CommandPhraseSet,
    start: CommandPhraseSet,
}

impl IntentMatcher {
    /// Build a matcher from start and stop phrase lists
    ///
    /// # Errors
    ///
    /// Returns error if a phrase is empty or if the same phrase appears in
    /// both sets (it would always resolve to the stop action)
    pub fn new<I, J, S, T>(start: I, stop: J) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let start = CommandPhraseSet::new(Intent::StartAction, start)?;
        let stop = CommandPhraseSet::new(Intent::StopAction, stop)?;

        let stop_phrases: HashSet<&str> = stop.phrases().iter().map(String::as_str).collect();
        let overlap: Vec<&str> = start
            .phrases()
            .iter()
            .map(String::as_str)
            .filter(|p| stop_phrases.contains(p))
            .collect();

        if !overlap.is_empty() {
            return Err(Error::CommandTable(format!(
                "phrases present in both start and stop sets: {}",
                overlap.join(", ")
            )));
        }

        tracing::debug!(
            start_phrases = start.len(),
            stop_phrases = stop.len(),
            "command table loaded"
        );

        Ok(Self { stop, start })
    }

    /// Matcher over the built-in phrase lists
    ///
    /// # Errors
    ///
    /// Returns error if the built-in lists fail validation
    pub fn builtin() -> Result<Self> {
        Self::new(START_PHRASES, STOP_PHRASES)
    }

    /// Classify a normalized transcript
    #[must_use]
    pub fn classify(&self, transcript: &Transcript) -> Intent {
        self.find_match(transcript)
            .map_or(Intent::None, |(intent, _)| intent)
    }

    /// Classify and report which phrase matched
    #[must_use]
    pub fn find_match(&self, transcript: &Transcript) -> Option<(Intent, &str)> {
        [&self.stop, &self.start].into_iter().find_map(|set| {
            set.find_in(transcript).map(|phrase| (set.intent(), phrase))
        })
    }

    #[must_use]
    pub const fn start_phrases(&self) -> &CommandPhraseSet {
        &self.start
    }

    #[must_use]
    pub const fn stop_phrases(&self) -> &CommandPhraseSet {
        &self.stop
    }
}
