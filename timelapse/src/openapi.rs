//! OpenAPI documentation for the HTTP surface.
//!
//! The document is served at `/openapi.json` and rendered with Scalar at `/docs`.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Timelapse API",
        description = "Upload a video and download a sped-up, silent timelapse of it. \
                       Finished videos are served under the configured static prefix."
    ),
    paths(
        api::handlers::upload::upload_video,
        api::handlers::health::health_check,
    ),
    components(schemas(
        api::models::UploadForm,
        api::models::UploadResponse,
        api::models::HealthResponse,
        api::models::HealthStatus,
        api::models::ErrorResponse,
    )),
    tags(
        (name = "timelapse", description = "Video upload and processing"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_both_operations() {
        let doc = ApiDoc::openapi();

        assert!(doc.paths.paths.contains_key("/upload"));
        assert!(doc.paths.paths.contains_key("/health"));

        let schemas = doc.components.expect("components present").schemas;
        for name in ["UploadResponse", "HealthResponse", "ErrorResponse"] {
            assert!(schemas.contains_key(name), "missing schema {name}");
        }
    }
}
