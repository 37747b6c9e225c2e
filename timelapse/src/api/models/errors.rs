use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human readable description of what went wrong
    pub error: String,
    /// Remediation hint, present when the transcoder is missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    /// Transcoder diagnostics, present when it exited unsuccessfully
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            help: None,
            details: None,
        }
    }
}
