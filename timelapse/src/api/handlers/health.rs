use axum::{Json, extract::State};

use crate::{AppState, api::models::HealthResponse};

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    summary = "Health check",
    description = "Reports whether the FFmpeg executable can currently be found. Always answers 200.",
    responses(
        (status = 200, description = "Transcoder availability", body = HealthResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ffmpeg_available = state.transcoder.locate().is_some();
    Json(HealthResponse::from_availability(ffmpeg_available))
}
