use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Multipart form accepted by `POST /upload`. Only used for documentation; the handler reads
/// the fields as a stream.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// The video to speed up
    #[schema(value_type = String, format = Binary)]
    pub video: Vec<u8>,
    /// Playback speed multiplier, must be greater than 0
    #[schema(default = 4.0, example = 8.0)]
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    /// Where the finished timelapse can be downloaded
    #[schema(example = "http://localhost:5000/static/videos/clip_timelapse.mp4")]
    pub download_url: String,
    #[schema(example = "Video processed successfully")]
    pub message: String,
}
