//! Request orchestration
//!
//! Turns one recorded utterance into either a command action or a spoken
//! reply:
//!
//! ```text
//! audio ─► transcription ─► intent ─┬─► action envelope (short-circuit)
//!                                   └─► generation ─► synthesis ─► audio envelope
//! ```
//!
//! Stages run strictly in sequence. Engines are injected at construction, and
//! each can be guarded so only one call is in flight at a time.

mod error;
mod scratch;
mod stages;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::Instrument;
use uuid::Uuid;

pub use error::{Stage, StageError};
pub use scratch::RequestScratch;
pub use stages::{GenerationStage, ReplyText, SynthesisStage, TranscriptionStage};
pub use state::{PipelineState, StageTimings};

use crate::audio::AudioBuffer;
use crate::config::{Config, PipelineConfig};
use crate::engines::{Engines, TaskMode};
use crate::intent::{CommandAction, IntentMatcher};
use crate::persona::{GenerationParams, PersonaTemplate};
use crate::Result;
use stages::CallPolicy;
use state::{RequestTrace, millis};

/// What a request produces: exactly one of an action or audio
#[derive(Debug, Clone)]
pub enum ResponseEnvelope {
    Action(CommandAction),
    Audio(AudioBuffer),
}

impl ResponseEnvelope {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Action(_) => "action",
            Self::Audio(_) => "audio",
        }
    }
}

/// Result of a completed request
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub request_id: Uuid,
    pub envelope: ResponseEnvelope,
    pub timings: StageTimings,
}

/// Cancellation signal shared between the caller and a running pipeline
///
/// The orchestrator checks it before starting each stage, and each stage
/// checks it again once it holds its engine guard, so a request queued
/// behind a busy engine never reaches it. An engine call already in flight
/// is left to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Guard that cancels the flag when dropped, unless disarmed first
    #[must_use]
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop {
            flag: self.clone(),
            armed: true,
        }
    }
}

/// Cancels its flag on drop (see [`CancelFlag::cancel_on_drop`])
#[derive(Debug)]
pub struct CancelOnDrop {
    flag: CancelFlag,
    armed: bool,
}

impl CancelOnDrop {
    /// The owner finished normally; don't cancel
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("caller went away, cancelling pipeline");
            self.flag.cancel();
        }
    }
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    engines: Engines,
    matcher: Arc<IntentMatcher>,
    persona: PersonaTemplate,
    params: GenerationParams,
    language: String,
    task: TaskMode,
    voice: String,
    pipeline: PipelineConfig,
    scratch_root: PathBuf,
}

impl OrchestratorBuilder {
    /// Set the persona framing
    #[must_use]
    pub fn persona(mut self, persona: PersonaTemplate) -> Self {
        self.persona = persona;
        self
    }

    /// Set the generation sampling parameters
    #[must_use]
    pub fn params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Set the transcription source language
    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the transcription task mode
    #[must_use]
    pub fn task(mut self, task: TaskMode) -> Self {
        self.task = task;
        self
    }

    /// Set the synthesis voice
    #[must_use]
    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    /// Set engine serialization and stage timeouts
    #[must_use]
    pub fn pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline = config;
        self
    }

    /// Set the directory under which per-request scratch space is created
    #[must_use]
    pub fn scratch_root(mut self, root: PathBuf) -> Self {
        self.scratch_root = root;
        self
    }

    #[must_use]
    pub fn build(self) -> Orchestrator {
        let serialize = self.pipeline.serialize_engines;

        Orchestrator {
            matcher: self.matcher,
            transcription: TranscriptionStage::new(
                self.engines.transcription,
                CallPolicy::new(serialize, self.pipeline.transcription_timeout),
                self.language,
                self.task,
            ),
            generation: GenerationStage::new(
                self.engines.generation,
                CallPolicy::new(serialize, self.pipeline.generation_timeout),
                self.persona,
                self.params,
            ),
            synthesis: SynthesisStage::new(
                self.engines.synthesis,
                CallPolicy::new(serialize, self.pipeline.synthesis_timeout),
                self.voice,
            ),
            scratch_root: self.scratch_root,
        }
    }
}

/// Sequences the stages of one request
pub struct Orchestrator {
    matcher: Arc<IntentMatcher>,
    transcription: TranscriptionStage,
    generation: GenerationStage,
    synthesis: SynthesisStage,
    scratch_root: PathBuf,
}

impl Orchestrator {
    /// Start building an orchestrator around injected engines
    #[must_use]
    pub fn builder(engines: Engines, matcher: Arc<IntentMatcher>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            engines,
            matcher,
            persona: PersonaTemplate::default(),
            params: GenerationParams::default(),
            language: "fr".to_string(),
            task: TaskMode::Transcribe,
            voice: crate::config::DEFAULT_VOICE.to_string(),
            pipeline: PipelineConfig::default(),
            scratch_root: std::env::temp_dir(),
        }
    }

    /// Build an orchestrator from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the command phrase lists are invalid
    pub fn from_config(config: &Config, engines: Engines) -> Result<Self> {
        let matcher = Arc::new(config.commands.matcher()?);

        Ok(Self::builder(engines, matcher)
            .persona(config.persona.clone())
            .params(config.generation.params)
            .language(config.transcription.language.clone())
            .task(config.transcription.task)
            .voice(config.synthesis.voice.clone())
            .pipeline_config(config.pipeline.clone())
            .build())
    }

    #[must_use]
    pub fn matcher(&self) -> &IntentMatcher {
        &self.matcher
    }

    #[must_use]
    pub const fn transcription(&self) -> &TranscriptionStage {
        &self.transcription
    }

    #[must_use]
    pub const fn generation(&self) -> &GenerationStage {
        &self.generation
    }

    #[must_use]
    pub const fn synthesis(&self) -> &SynthesisStage {
        &self.synthesis
    }

    /// Process one request end to end
    ///
    /// # Errors
    ///
    /// Returns `StageError::Input` if no usable audio was supplied, and the
    /// transcription/synthesis failures, timeouts or cancellation otherwise
    pub async fn handle(
        &self,
        audio: Option<AudioBuffer>,
        cancel: &CancelFlag,
    ) -> std::result::Result<PipelineOutcome, StageError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("request", %request_id);

        async move {
            let mut trace = RequestTrace::new(request_id);
            let result = self.run(&mut trace, audio, cancel).await;
            if result.is_err() {
                trace.advance(PipelineState::Errored);
            }
            let timings = trace.finish();

            match &result {
                Ok(envelope) => tracing::info!(
                    outcome = envelope.kind(),
                    transcription_ms = timings.transcription.map(millis),
                    generation_ms = timings.generation.map(millis),
                    synthesis_ms = timings.synthesis.map(millis),
                    total_ms = millis(timings.total),
                    "request complete"
                ),
                Err(e) => tracing::warn!(
                    outcome = "error",
                    error = %e,
                    total_ms = millis(timings.total),
                    "request failed"
                ),
            }

            result.map(|envelope| PipelineOutcome {
                request_id,
                envelope,
                timings,
            })
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        trace: &mut RequestTrace,
        audio: Option<AudioBuffer>,
        cancel: &CancelFlag,
    ) -> std::result::Result<ResponseEnvelope, StageError> {
        let audio = audio.ok_or_else(|| StageError::Input("no audio file received".to_string()))?;
        if audio.is_empty() {
            return Err(StageError::Input("audio file is empty".to_string()));
        }
        if cancel.is_cancelled() {
            return Err(StageError::Cancelled {
                stage: Stage::Transcription,
            });
        }

        trace.advance(PipelineState::Transcribing);
        self.log_audio(&audio);

        let started = Instant::now();
        let scratch = RequestScratch::spool(&self.scratch_root, trace.request_id, &audio)
            .await
            .map_err(|e| StageError::Internal(format!("failed to spool audio: {e}")))?;
        let transcript = self
            .transcription
            .transcribe(scratch.input(&audio), cancel)
            .await;
        if let Err(e) = scratch.close().await {
            tracing::warn!(error = %e, "failed to remove scratch directory");
        }
        trace.record(Stage::Transcription, started.elapsed());
        let transcript = transcript?;

        tracing::info!(transcript = %transcript, "transcribed");

        if let Some((intent, phrase)) = self.matcher.find_match(&transcript)
            && let Some(action) = intent.action()
        {
            tracing::info!(?intent, phrase, action = action.as_str(), "command recognized");
            trace.advance(PipelineState::ShortCircuited);
            return Ok(ResponseEnvelope::Action(action));
        }

        if cancel.is_cancelled() {
            return Err(StageError::Cancelled {
                stage: Stage::Generation,
            });
        }

        trace.advance(PipelineState::Generating);
        let started = Instant::now();
        let reply = self.generation.generate(&transcript, cancel).await;
        trace.record(Stage::Generation, started.elapsed());
        let reply = reply?;
        tracing::info!(reply = reply.as_str(), fallback = reply.is_fallback(), "reply ready");

        if cancel.is_cancelled() {
            return Err(StageError::Cancelled {
                stage: Stage::Synthesis,
            });
        }

        trace.advance(PipelineState::Synthesizing);
        let started = Instant::now();
        let speech = self.synthesis.synthesize(&reply, cancel).await;
        trace.record(Stage::Synthesis, started.elapsed());
        let speech = speech?;

        trace.advance(PipelineState::Responded);
        Ok(ResponseEnvelope::Audio(speech))
    }

    fn log_audio(&self, audio: &AudioBuffer) {
        let format = audio.format();
        match audio.wav_info() {
            Ok(info) => tracing::debug!(
                bytes = audio.len(),
                ?format,
                sample_rate = info.sample_rate,
                channels = info.channels,
                duration_ms = millis(info.duration),
                engine = self.transcription.engine_name(),
                "audio received"
            ),
            Err(_) => tracing::debug!(
                bytes = audio.len(),
                ?format,
                engine = self.transcription.engine_name(),
                "audio received"
            ),
        }
    }
}
