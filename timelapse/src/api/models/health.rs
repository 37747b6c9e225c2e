use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Health probe result. The service is healthy exactly when the transcoder can be found.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub ffmpeg_available: bool,
}

impl HealthResponse {
    pub fn from_availability(ffmpeg_available: bool) -> Self {
        let status = if ffmpeg_available {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        Self { status, ffmpeg_available }
    }
}
