//! Built-in command phrases
//!
//! Each list includes the spellings the French transcription model tends to
//! produce for the command ("danse" heard as "donce" or "dense").

/// Phrases that start the dance routine
pub const START_PHRASES: &[&str] = &[
    "bonjour danse",
    "bonjour, danse",
    "bonjour danse.",
    "bonjour, danse.",
    "bonjour donce",
    "bonjour, donce",
    "bonjour donce.",
    "bonjour, dense.",
    "bonjour dense",
    "bonjour, dense",
    "bonjour dense.",
    "danse",
    "danse.",
    "donce",
    "dense",
];

/// Phrases that stop the dance routine
pub const STOP_PHRASES: &[&str] = &[
    "arrête de danser",
    "arrête de dancer.",
    "arrête de doncer",
    "arrête de denser.",
    "stop danse",
    "stop dance.",
    "stop donce",
    "stop dense.",
];
