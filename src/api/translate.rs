//! `POST /translate`: one recorded utterance in, an action or spoken reply out

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Serialize;

use super::ApiState;
use crate::audio::AudioBuffer;
use crate::intent::CommandAction;
use crate::pipeline::{CancelFlag, ResponseEnvelope, StageError};

/// Multipart field carrying the recording
pub const AUDIO_FIELD: &str = "audio";

/// File name offered to the client for the spoken reply
pub const REPLY_FILE_NAME: &str = "translated_audio.mp3";

/// Response header carrying the pipeline's request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the pipeline router
#[must_use]
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/translate", post(translate))
        .with_state(state)
}

/// Body of a command short-circuit
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub action: CommandAction,
}

async fn translate(
    State(state): State<Arc<ApiState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, TranslateError> {
    let multipart = multipart.map_err(|e| TranslateError::Multipart(e.status(), e.body_text()))?;
    let audio = read_audio_field(multipart).await?;

    // The pipeline outlives this future if the client disconnects; the
    // guard flags it so no further stage is started.
    let cancel = CancelFlag::new();
    let guard = cancel.cancel_on_drop();
    let orchestrator = state.orchestrator.clone();
    let task = tokio::spawn(async move { orchestrator.handle(audio, &cancel).await });

    let outcome = task
        .await
        .map_err(|e| TranslateError::Stage(StageError::Internal(format!("pipeline task failed: {e}"))))?;
    guard.disarm();

    let outcome = outcome.map_err(TranslateError::Stage)?;
    let request_id = [(REQUEST_ID_HEADER, outcome.request_id.to_string())];

    Ok(match outcome.envelope {
        ResponseEnvelope::Action(action) => {
            (request_id, Json(ActionResponse { action })).into_response()
        }
        ResponseEnvelope::Audio(speech) => (
            StatusCode::OK,
            request_id,
            [
                (header::CONTENT_TYPE, speech.format().mime().to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{REPLY_FILE_NAME}\""),
                ),
            ],
            speech.bytes(),
        )
            .into_response(),
    })
}

/// Pull the `audio` part out of the form, skipping any other fields
async fn read_audio_field(mut multipart: Multipart) -> Result<Option<AudioBuffer>, TranslateError> {
    while let Some(field) = multipart.next_field().await.map_err(TranslateError::from)? {
        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.map_err(TranslateError::from)?;

        return Ok(Some(AudioBuffer::from_upload(
            data,
            content_type.as_deref(),
            file_name.as_deref(),
        )));
    }

    Ok(None)
}

/// Translate endpoint errors
#[derive(Debug)]
pub enum TranslateError {
    /// The request body was not a readable multipart form
    Multipart(StatusCode, String),
    Stage(StageError),
}

impl From<MultipartError> for TranslateError {
    fn from(e: MultipartError) -> Self {
        Self::Multipart(e.status(), e.body_text())
    }
}

impl TranslateError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Multipart(status, _) if status.is_client_error() => *status,
            Self::Multipart(..) | Self::Stage(StageError::Input(_)) => StatusCode::BAD_REQUEST,
            Self::Stage(StageError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Stage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TranslateError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        let status = self.status();
        let error = match self {
            Self::Multipart(_, msg) => msg,
            Self::Stage(e) => e.to_string(),
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}
