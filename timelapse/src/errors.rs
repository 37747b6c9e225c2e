use crate::api::models::ErrorResponse;
use crate::transcoder::{InvalidSpeed, TranscodeError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// No transcoder executable could be found
    #[error("FFmpeg is not installed or not found in PATH. Please install FFmpeg first.")]
    TranscoderUnavailable { help: String },

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Upload exceeded the configured size limit
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// The transcoder ran and timed out or failed
    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    /// Filesystem operation on a known path failed
    #[error("{operation} {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::TranscoderUnavailable { .. }
            | Error::Transcode(_)
            | Error::Io { .. }
            | Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The JSON body sent to the client
    pub fn to_response_body(&self) -> ErrorResponse {
        match self {
            Error::TranscoderUnavailable { help } => ErrorResponse {
                error: self.to_string(),
                help: Some(help.clone()),
                details: None,
            },
            Error::BadRequest { message } | Error::PayloadTooLarge { message } => ErrorResponse::new(message.clone()),
            Error::Transcode(TranscodeError::TimedOut { .. }) => ErrorResponse::new("Video processing timed out"),
            Error::Transcode(TranscodeError::Failed { stderr, .. }) => ErrorResponse {
                error: "Video processing failed".to_string(),
                help: None,
                details: Some(stderr.clone()),
            },
            Error::Transcode(_) | Error::Io { .. } | Error::Internal { .. } => {
                ErrorResponse::new(format!("Unexpected error: {self}"))
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Transcode(TranscodeError::Failed { status, stderr }) => {
                tracing::error!(exit_code = ?status, stderr = %stderr, "FFmpeg exited unsuccessfully");
            }
            Error::TranscoderUnavailable { .. } | Error::Transcode(_) | Error::Io { .. } | Error::Internal { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::BadRequest { .. } | Error::PayloadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), Json(self.to_response_body())).into_response()
    }
}

impl From<InvalidSpeed> for Error {
    fn from(err: InvalidSpeed) -> Self {
        Error::BadRequest { message: err.to_string() }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
