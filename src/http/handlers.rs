use super::state::AppState;
use crate::audio::{AudioSourceMode, WAV_MIME_TYPE};
use crate::error::CaptureError;
use crate::session::{SessionStats, SessionStatus};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// Requested source (default: microphone)
    pub mode: Option<AudioSourceMode>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub status: SessionStatus,
    pub warning: Option<String>,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ArtifactSummary {
    pub session_id: String,
    pub mime_type: String,
    pub total_bytes: u64,
    pub duration_ms: u64,
    pub chunk_count: usize,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub status: SessionStatus,
    pub artifact: Option<ArtifactSummary>,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
/// Start a new capture session
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Response {
    let mode = req.mode.unwrap_or(AudioSourceMode::Microphone);
    info!("Start requested ({})", mode);

    match state.controller.start(mode).await {
        Ok(()) => {
            let stats = state.controller.stats();
            (
                StatusCode::OK,
                Json(StartSessionResponse {
                    status: stats.status,
                    warning: stats.warning.clone(),
                    stats,
                }),
            )
                .into_response()
        }
        Err(e @ CaptureError::DeviceUnavailable { .. }) => {
            error!("Failed to start session: {}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Err(e) => {
            error!("Failed to start session: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /session/stop
/// Stop the active session and finalize its artifact
pub async fn stop_session(State(state): State<AppState>) -> Response {
    match state.controller.stop().await {
        Ok(artifact) => {
            let artifact = artifact.map(|a| ArtifactSummary {
                session_id: a.session_id.clone(),
                mime_type: a.mime_type.to_string(),
                total_bytes: a.total_bytes,
                duration_ms: a.duration_ms,
                chunk_count: a.chunk_count(),
            });
            let stats = state.controller.stats();
            (
                StatusCode::OK,
                Json(StopSessionResponse {
                    status: stats.status,
                    artifact,
                    stats,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to stop session: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /session/stats
/// Current statistics and chunk log
pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.controller.stats()))
}

/// GET /session/artifact
/// Last finished recording as a WAV file
pub async fn get_artifact(State(state): State<AppState>) -> Response {
    let Some(artifact) = state.controller.last_artifact().await else {
        return error_response(StatusCode::NOT_FOUND, "No recording available".to_string());
    };

    match artifact.to_wav() {
        Ok(wav) => (StatusCode::OK, [(header::CONTENT_TYPE, WAV_MIME_TYPE)], wav).into_response(),
        Err(e) => {
            error!("Failed to encode artifact: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
