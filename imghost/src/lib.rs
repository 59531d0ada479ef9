//! # imghost: a minimal self-hostable image host
//!
//! `imghost` accepts a single image per request as a multipart form upload, writes it to a local
//! directory under a freshly generated name, and answers with the absolute URL the file can be
//! fetched from. The same directory is served read-only under a URL prefix, so the returned link
//! works straight away.
//!
//! ## Architecture
//!
//! - [`storage`]: naming and exclusive, streaming writes into the storage root
//! - [`api`]: the upload handler and its response model, plus a plain-text landing route
//! - [`urls`]: turns the request's scheme and host into public file URLs
//! - [`config`]: YAML + environment configuration via figment
//! - [`errors`]: error type that maps to HTTP status codes and JSON bodies
//! - [`telemetry`]: console logging with optional OTLP export
//!
//! ## Request flow
//!
//! A `POST /upload` is checked against the configured size and content type limits while it
//! streams. Bytes go straight into a file opened with `create_new` under a
//! `<unix millis>-<random><ext>` name, and the file only survives if the whole part was received.
//! Everything else below the mount prefix is handled by [`tower_http::services::ServeDir`].
//!
//! ## Getting started
//!
//! ```bash
//! cargo run -- -f config.yaml
//! curl -F image=@photo.jpg http://localhost:3000/upload
//! ```

pub mod api;
pub mod config;
pub mod errors;
pub mod openapi;
pub mod storage;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
pub mod urls;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{self, Method},
    routing::{get, post},
};
use bon::Builder;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;

pub use config::Config;
use config::CorsOrigin;
use openapi::ApiDoc;
use storage::DiskStorage;

/// Room for multipart boundaries and part headers on top of the file itself.
///
/// The request body limit is `max_file_size` plus this, so the handler's own byte count is what
/// normally rejects an oversized file.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Shared state handed to every handler.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub storage: Arc<DiskStorage>,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.cors;

    let allow_origin = if cors_config.allowed_origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                // Browsers send the origin without a trailing slash
                origins.push(url.as_str().trim_end_matches('/').parse::<http::HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([http::header::CONTENT_TYPE])
        .allow_credentials(cors_config.allow_credentials);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(max_age);
    }

    Ok(cors)
}

/// Build the application router.
///
/// - `GET /` and `GET /healthz`
/// - `POST /upload`, with the request body capped just above `uploads.max_file_size`
/// - `GET /api-docs/openapi.json`
/// - read-only static serving of `storage.root` under `storage.mount_prefix`
/// - CORS and request tracing on everything
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let body_limit = state.config.uploads.max_file_size.saturating_add(MULTIPART_OVERHEAD_BYTES);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    let mount_path = state.config.storage.mount_path();
    debug!(mount_path = %mount_path, root = %state.storage.root().display(), "Serving storage root");

    let router = Router::new()
        .route("/", get(api::handlers::landing::landing))
        .route("/healthz", get(|| async { "OK" }))
        .route(
            "/upload",
            post(api::handlers::uploads::upload_image).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest_service(&mount_path, ServeDir::new(state.storage.root()))
        .with_state(state.clone());

    let cors_layer = create_cors_layer(&state.config)?;
    let router = router.layer(cors_layer);

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The image host, from startup to graceful shutdown.
///
/// 1. **Create**: [`Application::new`] validates the storage root and builds the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
///    shutdown future resolves, letting in-flight uploads finish
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting image host with configuration: {:#?}", config);

        let storage = Arc::new(DiskStorage::new(&config.storage.root));
        if config.storage.create_root {
            storage.ensure_root().await?;
        } else if !storage.root().is_dir() {
            tracing::warn!(
                root = %storage.root().display(),
                "Storage root does not exist and create_root is disabled; uploads will fail"
            );
        }

        let app_state = AppState::builder().config(config.clone()).storage(storage).build();
        let router = build_router(&app_state)?;

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
            "Image host listening on http://{}, uploads served under {}",
            bind_addr,
            self.config.storage.mount_path()
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_app, create_test_config};
    use axum::http::StatusCode;
    use url::Url;

    #[tokio::test]
    async fn test_healthz() {
        let dir = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(dir.path())).await;

        let response = server.get("/healthz").await;

        response.assert_status_ok();
        response.assert_text("OK");
    }

    #[tokio::test]
    async fn test_landing_describes_upload_field() {
        let dir = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(dir.path())).await;

        let response = server.get("/").await;

        response.assert_status_ok();
        let text = response.text();
        assert!(text.contains("`image`"));
        assert!(text.contains("/upload"));
        assert!(text.contains("/uploads/"));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(dir.path())).await;

        server.get("/uploads/1718000000000-1.jpg").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_existing_file_is_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1-2.png"), b"png bytes").unwrap();
        let server = create_test_app(create_test_config(dir.path())).await;

        let response = server.get("/uploads/1-2.png").await;

        response.assert_status_ok();
        assert_eq!(&response.as_bytes()[..], b"png bytes");
        assert_eq!(
            response.headers().get("content-type").map(|v| v.to_str().unwrap()),
            Some("image/png")
        );
    }

    #[tokio::test]
    async fn test_upload_route_rejects_get() {
        let dir = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(dir.path())).await;

        server.get("/upload").await.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_storage_root_is_created_on_startup() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("uploads");

        let _server = create_test_app(create_test_config(&root)).await;

        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_unusable_storage_root_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads");
        std::fs::write(&root, b"").unwrap();

        assert!(Application::new(create_test_config(&root)).await.is_err());
    }

    #[tokio::test]
    async fn test_openapi_json_is_served() {
        let dir = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(dir.path())).await;

        let response = server.get("/api-docs/openapi.json").await;

        response.assert_status_ok();
        let doc: serde_json::Value = response.json();
        assert!(doc["paths"]["/upload"].is_object());
    }

    #[tokio::test]
    async fn test_cors_preflight_for_upload() {
        let dir = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(dir.path())).await;

        let response = server
            .method(Method::OPTIONS, "/upload")
            .add_header("origin", "https://app.example.com")
            .add_header("access-control-request-method", "POST")
            .await;

        assert_eq!(
            response.headers().get("access-control-allow-origin").map(|v| v.to_str().unwrap()),
            Some("*")
        );
    }

    #[tokio::test]
    async fn test_cors_explicit_origin() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config(dir.path());
        config.cors.allowed_origins = vec![CorsOrigin::Url(Url::parse("https://app.example.com").unwrap())];
        config.cors.allow_credentials = true;
        let server = create_test_app(config).await;

        let allowed = server.get("/healthz").add_header("origin", "https://app.example.com").await;
        assert_eq!(
            allowed.headers().get("access-control-allow-origin").map(|v| v.to_str().unwrap()),
            Some("https://app.example.com")
        );

        let other = server.get("/healthz").add_header("origin", "https://evil.example.com").await;
        assert!(other.headers().get("access-control-allow-origin").is_none());
    }
}
