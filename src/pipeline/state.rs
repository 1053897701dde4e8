//! Per-request state machine and timing record

use std::time::{Duration, Instant};

use uuid::Uuid;

use super::error::Stage;

/// Where a request is in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    Transcribing,
    ShortCircuited,
    Generating,
    Synthesizing,
    Responded,
    Errored,
}

impl PipelineState {
    /// Whether `next` is a legal transition from this state
    ///
    /// Generation itself never fails, so `Generating -> Errored` only happens
    /// when the request is cancelled.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::Transcribing | Self::Errored)
                | (
                    Self::Transcribing,
                    Self::ShortCircuited | Self::Generating | Self::Errored
                )
                | (Self::Generating, Self::Synthesizing | Self::Errored)
                | (Self::Synthesizing, Self::Responded | Self::Errored)
        )
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::ShortCircuited | Self::Responded | Self::Errored)
    }
}

/// Wall-clock duration of each stage that ran
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub transcription: Option<Duration>,
    pub generation: Option<Duration>,
    pub synthesis: Option<Duration>,
    pub total: Duration,
}

impl StageTimings {
    fn record(&mut self, stage: Stage, elapsed: Duration) {
        let slot = match stage {
            Stage::Transcription => &mut self.transcription,
            Stage::Generation => &mut self.generation,
            Stage::Synthesis => &mut self.synthesis,
        };
        *slot = Some(elapsed);
    }
}

/// Milliseconds for log fields
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Tracks one request's state and timings
#[derive(Debug)]
pub(crate) struct RequestTrace {
    pub request_id: Uuid,
    state: PipelineState,
    started: Instant,
    timings: StageTimings,
}

impl RequestTrace {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            state: PipelineState::Received,
            started: Instant::now(),
            timings: StageTimings::default(),
        }
    }

    pub const fn state(&self) -> PipelineState {
        self.state
    }

    pub fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal pipeline transition {:?} -> {next:?}",
            self.state
        );
        tracing::debug!(from = ?self.state, to = ?next, "pipeline transition");
        self.state = next;
    }

    /// Record a stage duration and log it
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        tracing::info!(stage = stage.as_str(), elapsed_ms = millis(elapsed), "stage complete");
        self.timings.record(stage, elapsed);
    }

    /// Stop the clock
    pub fn finish(mut self) -> StageTimings {
        self.timings.total = self.started.elapsed();
        self.timings
    }
}
