//! API request and response data models.
//!
//! These structures define the public JSON contract of the service and are annotated with
//! `utoipa` so they appear in the generated OpenAPI document.
//!
//! - [`upload`]: the multipart upload form and its success response
//! - [`health`]: the health probe response
//! - [`errors`]: the body of every non-2xx response

pub mod errors;
pub mod health;
pub mod upload;

pub use errors::ErrorResponse;
pub use health::{HealthResponse, HealthStatus};
pub use upload::{UploadForm, UploadResponse};
