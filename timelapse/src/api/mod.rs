//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for `/upload` and `/health`
//! - **[`models`]**: Request/response data structures for API communication
//!
//! All endpoints are documented with `utoipa` annotations; the document is served at
//! `/openapi.json` and rendered at `/docs`.

pub mod handlers;
pub mod models;
