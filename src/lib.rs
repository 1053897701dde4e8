//! Elise Gateway - voice front door for the Elise avatar
//!
//! One recorded utterance comes in over HTTP and one of two things goes
//! back out: a command for the avatar (`dance`, `stop_dance`) or Elise's
//! spoken reply as MP3.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               HTTP API (POST /translate)             │
//! └────────────────────┬────────────────────────────────┘
//!                      │ multipart `audio`
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Orchestrator                       │
//! │  Transcription ─► Intent ─► Generation ─► Synthesis  │
//! └────────────────────┬────────────────────────────────┘
//!                      │ engine traits
//! ┌────────────────────▼────────────────────────────────┐
//! │                 External engines                     │
//! │   Whisper (API/CLI)  │  llama.cpp  │  Speech API     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod audio;
pub mod config;
pub mod engines;
pub mod error;
pub mod intent;
pub mod persona;
pub mod pipeline;
pub mod transcript;

pub use audio::{AudioBuffer, AudioFormat};
pub use config::Config;
pub use engines::{Engines, GenerationEngine, SynthesisEngine, TaskMode, TranscriptionEngine};
pub use error::{Error, Result};
pub use intent::{CommandAction, Intent, IntentMatcher};
pub use persona::{GenerationParams, GenerationRequest, PersonaTemplate};
pub use pipeline::{CancelFlag, Orchestrator, PipelineOutcome, ResponseEnvelope, StageError};
pub use transcript::Transcript;
