//! Stage wrappers around the external engines
//!
//! Each stage owns one engine plus the policy around calling it: an optional
//! mutual-exclusion guard (one in-flight call per engine) and an optional
//! timeout. Each stage also decides how its failures surface.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use tokio::sync::Mutex;

use super::CancelFlag;
use super::error::{Stage, StageError};
use crate::audio::{AudioBuffer, AudioFormat};
use crate::engines::{AudioInput, GenerationEngine, SynthesisEngine, TaskMode, TranscriptionEngine};
use crate::persona::{GenerationParams, GenerationRequest, PersonaTemplate};
use crate::transcript::Transcript;

/// Why an engine call did not produce output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallError {
    /// Cancellation was observed once the guard was held; the call never started
    Cancelled,
    /// The call outlived the stage timeout
    Elapsed,
}

/// Call policy shared by all stages
#[derive(Debug, Default)]
pub(crate) struct CallPolicy {
    guard: Option<Mutex<()>>,
    timeout: Option<Duration>,
}

impl CallPolicy {
    pub fn new(serialize: bool, timeout: Option<Duration>) -> Self {
        Self {
            guard: serialize.then(|| Mutex::new(())),
            timeout,
        }
    }

    pub const fn is_serialized(&self) -> bool {
        self.guard.is_some()
    }

    /// Run an engine call under the guard and timeout
    ///
    /// The call is only created once the guard is held, so queued requests
    /// never start work on a busy engine. A request cancelled while it was
    /// queued gives up the guard without calling the engine. The timeout
    /// covers the engine call only, not the time spent waiting for the guard.
    async fn run<F, Fut>(
        &self,
        stage: Stage,
        cancel: &CancelFlag,
        call: F,
    ) -> Result<Fut::Output, CallError>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let _permit = match &self.guard {
            Some(guard) => {
                let permit = guard.lock().await;
                tracing::trace!(stage = stage.as_str(), "engine guard acquired");
                Some(permit)
            }
            None => None,
        };

        if cancel.is_cancelled() {
            tracing::debug!(stage = stage.as_str(), "cancelled before engine call");
            return Err(CallError::Cancelled);
        }

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call())
                .await
                .map_err(|_| CallError::Elapsed),
            None => Ok(call().await),
        }
    }

    fn stage_error(&self, stage: Stage, error: CallError) -> StageError {
        match error {
            CallError::Cancelled => StageError::Cancelled { stage },
            CallError::Elapsed => StageError::Timeout {
                stage,
                after: self.timeout.unwrap_or_default(),
            },
        }
    }
}

/// Speech-to-text stage
pub struct TranscriptionStage {
    engine: Arc<dyn TranscriptionEngine>,
    policy: CallPolicy,
    language: String,
    task: TaskMode,
}

impl TranscriptionStage {
    pub(crate) fn new(
        engine: Arc<dyn TranscriptionEngine>,
        policy: CallPolicy,
        language: String,
        task: TaskMode,
    ) -> Self {
        Self {
            engine,
            policy,
            language,
            task,
        }
    }

    #[must_use]
    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    #[must_use]
    pub const fn is_serialized(&self) -> bool {
        self.policy.is_serialized()
    }

    /// Transcribe and normalize an utterance
    ///
    /// # Errors
    ///
    /// Returns `StageError::Transcription` on engine failure,
    /// `StageError::Timeout` if the configured timeout elapses and
    /// `StageError::Cancelled` if the request was cancelled while queued
    pub async fn transcribe(
        &self,
        audio: AudioInput<'_>,
        cancel: &CancelFlag,
    ) -> Result<Transcript, StageError> {
        let raw = self
            .policy
            .run(Stage::Transcription, cancel, || {
                self.engine.transcribe(audio, &self.language, self.task)
            })
            .await
            .map_err(|e| self.policy.stage_error(Stage::Transcription, e))?
            .map_err(|e| StageError::Transcription(e.detail()))?;

        Ok(Transcript::from_raw(&raw))
    }
}

/// Generated (or fallback) reply text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyText {
    text: String,
    fallback: bool,
}

impl ReplyText {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether this is the persona's apology rather than a generated reply
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        self.fallback
    }
}

/// Text generation stage
///
/// Engine failures never surface: any engine error, timeout or empty
/// completion is replaced with the persona's fallback reply. The only error
/// is cancellation observed before the engine call.
pub struct GenerationStage {
    engine: Arc<dyn GenerationEngine>,
    policy: CallPolicy,
    persona: PersonaTemplate,
    params: GenerationParams,
}

impl GenerationStage {
    pub(crate) fn new(
        engine: Arc<dyn GenerationEngine>,
        policy: CallPolicy,
        persona: PersonaTemplate,
        params: GenerationParams,
    ) -> Self {
        Self {
            engine,
            policy,
            persona,
            params,
        }
    }

    #[must_use]
    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    #[must_use]
    pub const fn is_serialized(&self) -> bool {
        self.policy.is_serialized()
    }

    /// Generate a persona-framed reply to the question
    ///
    /// # Errors
    ///
    /// Returns `StageError::Cancelled` if the request was cancelled while
    /// queued; every other failure yields the fallback reply
    pub async fn generate(
        &self,
        question: &Transcript,
        cancel: &CancelFlag,
    ) -> Result<ReplyText, StageError> {
        let request = GenerationRequest::new(&self.persona, self.params, question);

        let outcome = self
            .policy
            .run(Stage::Generation, cancel, || self.engine.complete(&request))
            .await;

        let failure = match outcome {
            Ok(Ok(text)) => {
                let text = text.trim();
                if !text.is_empty() {
                    return Ok(ReplyText {
                        text: text.to_string(),
                        fallback: false,
                    });
                }
                "engine returned an empty reply".to_string()
            }
            Ok(Err(e)) => e.detail(),
            Err(CallError::Cancelled) => {
                return Err(self.policy.stage_error(Stage::Generation, CallError::Cancelled));
            }
            Err(e @ CallError::Elapsed) => {
                self.policy.stage_error(Stage::Generation, e).to_string()
            }
        };

        tracing::error!(error = %failure, "generation failed, using fallback reply");
        Ok(ReplyText {
            text: self.persona.fallback_reply().to_string(),
            fallback: true,
        })
    }
}

/// Speech synthesis stage
pub struct SynthesisStage {
    engine: Arc<dyn SynthesisEngine>,
    policy: CallPolicy,
    voice: String,
}

impl SynthesisStage {
    pub(crate) fn new(engine: Arc<dyn SynthesisEngine>, policy: CallPolicy, voice: String) -> Self {
        Self {
            engine,
            policy,
            voice,
        }
    }

    #[must_use]
    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    #[must_use]
    pub const fn is_serialized(&self) -> bool {
        self.policy.is_serialized()
    }

    /// Render a reply to MP3 audio
    ///
    /// # Errors
    ///
    /// Returns `StageError::Synthesis` on engine failure or empty audio,
    /// `StageError::Timeout` if the configured timeout elapses and
    /// `StageError::Cancelled` if the request was cancelled while queued
    pub async fn synthesize(
        &self,
        reply: &ReplyText,
        cancel: &CancelFlag,
    ) -> Result<AudioBuffer, StageError> {
        let audio = self
            .policy
            .run(Stage::Synthesis, cancel, || {
                self.engine.synthesize(reply.as_str(), &self.voice)
            })
            .await
            .map_err(|e| self.policy.stage_error(Stage::Synthesis, e))?
            .map_err(|e| StageError::Synthesis(e.detail()))?;

        if audio.is_empty() {
            return Err(StageError::Synthesis("engine returned no audio".to_string()));
        }

        Ok(AudioBuffer::new(Bytes::from(audio), AudioFormat::Mp3))
    }
}
