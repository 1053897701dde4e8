//! Health check endpoints

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::ApiState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Readiness response describing the wired pipeline
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub engines: EngineChecks,
    pub commands: CommandCounts,
    pub rate_limited: bool,
}

/// Engine bound to each stage
#[derive(Serialize)]
pub struct EngineChecks {
    pub transcription: EngineStatus,
    pub generation: EngineStatus,
    pub synthesis: EngineStatus,
}

#[derive(Serialize)]
pub struct EngineStatus {
    pub engine: &'static str,
    pub serialized: bool,
}

/// Number of phrases per command set
#[derive(Serialize)]
pub struct CommandCounts {
    pub start: usize,
    pub stop: usize,
}

/// Liveness check - is the service running?
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check - which engines will serve the next request
async fn ready(State(state): State<Arc<ApiState>>) -> Json<ReadinessResponse> {
    let orchestrator = &state.orchestrator;
    let matcher = orchestrator.matcher();

    Json(ReadinessResponse {
        status: "ok",
        engines: EngineChecks {
            transcription: EngineStatus {
                engine: orchestrator.transcription().engine_name(),
                serialized: orchestrator.transcription().is_serialized(),
            },
            generation: EngineStatus {
                engine: orchestrator.generation().engine_name(),
                serialized: orchestrator.generation().is_serialized(),
            },
            synthesis: EngineStatus {
                engine: orchestrator.synthesis().engine_name(),
                serialized: orchestrator.synthesis().is_serialized(),
            },
        },
        commands: CommandCounts {
            start: matcher.start_phrases().len(),
            stop: matcher.stop_phrases().len(),
        },
        rate_limited: state.rate_limiter.is_some(),
    })
}

/// Build health router (liveness only, no state needed)
#[must_use]
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

/// Build readiness router (needs state for checks)
#[must_use]
pub fn ready_router(state: Arc<ApiState>) -> Router {
    Router::new().route("/ready", get(ready)).with_state(state)
}
