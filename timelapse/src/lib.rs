//! # timelapse: turn uploaded videos into timelapses
//!
//! `timelapse` is a small HTTP service. A client uploads a video together with a speed factor; the
//! service runs FFmpeg to produce a silent MP4 that plays that many times faster, publishes it
//! under a static URL and answers with the download link.
//!
//! ## Request Flow
//!
//! `POST /upload` is handled synchronously by [`api::handlers::upload`]:
//!
//! 1. The FFmpeg executable is located ([`transcoder::Transcoder::locate`]). Without it the request
//!    fails with a remediation hint.
//! 2. The multipart body is streamed. The `video` part is written to a work file keyed on a fresh
//!    request id ([`storage::Workspace`]), so concurrent uploads of the same name stay apart.
//! 3. The video, its file name and the `speed` factor are validated.
//! 4. FFmpeg runs with a wall-clock timeout ([`transcoder::Transcoder::run`]).
//! 5. The output is renamed into the upload directory, which is served at the static prefix,
//!    and the link is returned.
//!
//! Work files belong to a scope guard, so whichever step fails, they are removed before the
//! error response is sent.
//!
//! `GET /health` reports whether FFmpeg can be found. The OpenAPI document is served at
//! `/openapi.json` with an interactive reference at `/docs`.
//!
//! ## Configuration
//!
//! See [`config`] for the YAML/environment layering. Tracing is set up by [`telemetry`] and
//! Prometheus metrics are optional (`enable_metrics`).

pub mod api;
pub mod config;
pub mod errors;
pub mod metrics;
mod openapi;
pub mod storage;
pub mod telemetry;
pub mod transcoder;

#[cfg(test)]
mod test_utils;

use crate::config::CorsOrigin;
use crate::openapi::ApiDoc;
use crate::storage::Workspace;
use crate::transcoder::Transcoder;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{
    Json, Router,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Headroom above `max_upload_size` for multipart boundaries and the `speed` field.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config.clone())
///     .transcoder(Transcoder::new(config.transcoder.clone()))
///     .workspace(Workspace::new(&config.storage))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub transcoder: Transcoder,
    pub workspace: Workspace,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.cors;

    // A literal `*` in an origin list is rejected by tower-http, so the wildcard maps to `any`
    let allow_origin = if cors_config
        .allowed_origins
        .iter()
        .any(|origin| matches!(origin, CorsOrigin::Wildcard))
    {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(cors_config.allow_credentials);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router: API routes, documentation, static serving of published
/// outputs and the CORS, metrics and tracing layers.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let storage = &state.config.storage;
    let body_limit = usize::try_from(storage.max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);
    let static_prefix = storage.static_prefix.trim_end_matches('/').to_string();
    let outputs = ServeDir::new(state.workspace.upload_dir());
    let cors_layer = create_cors_layer(&state.config)?;
    let enable_metrics = state.config.enable_metrics;

    let router = Router::new()
        .route(
            "/upload",
            post(api::handlers::upload::upload_video).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/health", get(api::handlers::health::health_check))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest_service(&static_prefix, outputs)
        .with_state(state)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let mut router = router.layer(cors_layer);

    if enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Prepare directories, report transcoder availability and build the router.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting timelapse with configuration: {:#?}", config);

        let workspace = Workspace::new(&config.storage);
        workspace.prepare().await?;

        let transcoder = Transcoder::new(config.transcoder.clone());
        match transcoder.locate() {
            Some(path) => info!(path = %path.display(), "FFmpeg is available"),
            None => warn!("FFmpeg is not available - please install it first. {}", transcoder.install_help()),
        }

        let state = AppState::builder()
            .config(config.clone())
            .transcoder(transcoder)
            .workspace(workspace)
            .build();
        let router = build_router(state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Timelapse listening on http://{}, outputs published under {}{}",
            bind_addr,
            self.config.public_url.as_str().trim_end_matches('/'),
            self.config.storage.static_prefix
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
