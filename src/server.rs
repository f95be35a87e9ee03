//! HTTP front end.
//!
//! | Route | Response |
//! |---|---|
//! | `GET /{width}` | random image, height derived from the aspect ratio |
//! | `GET /{width}/{height}` | random image in a `width`×`height` box |
//! | `GET /health` | `ok` |
//! | `GET /stats` | image count and cache counters as JSON |
//!
//! Image routes take the query parameters `blur` (float, default 0),
//! `grayscale` (bool, default false) and `resizemode` (`none`, `fill` or
//! `fit`, default `fit`). Rendering runs on the blocking pool.
//!
//! Malformed or out-of-range parameters are answered with 400, everything
//! else that goes wrong with 500. Out of range covers blur above
//! `rendering.max_blur` and any output edge, requested or derived from the
//! aspect ratio, above `rendering.max_dimension`. Error bodies are JSON:
//! `{"error": "...", "status": 400}`.

use crate::config::ServiceConfig;
use crate::imaging::{MIME_JPEG, ParamsError, ResizeMode, TransformParams};
use crate::service::{ImageService, ServeError};
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info};

/// How long in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to load TLS certificate: {0}")]
    Tls(#[source] std::io::Error),
}

/// Errors returned by request handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Serve(#[from] ServeError),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<ParamsError> for ApiError {
    fn from(e: ParamsError) -> Self {
        ApiError::Serve(ServeError::InvalidParams(e))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Serve(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16()
        }));
        (status, body).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    service: Arc<ImageService>,
}

/// Raw query parameters. Parsed by hand so every malformed value is a 400
/// with a message naming the parameter.
#[derive(Debug, Default, Deserialize)]
pub struct ImageQuery {
    pub blur: Option<String>,
    pub grayscale: Option<String>,
    pub resizemode: Option<String>,
}

impl ImageQuery {
    pub fn to_params(&self, width: u32, height: u32) -> Result<TransformParams, ApiError> {
        let blur = match self.blur.as_deref() {
            Some(raw) => raw
                .parse::<f64>()
                .map_err(|_| ApiError::BadRequest(format!("Invalid blur '{raw}'")))?,
            None => 0.0,
        };
        let grayscale = match self.grayscale.as_deref() {
            Some(raw) => parse_bool(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("Invalid grayscale '{raw}'")))?,
            None => false,
        };
        let resize_mode = match self.resizemode.as_deref() {
            Some(raw) => raw.parse::<ResizeMode>()?,
            None => ResizeMode::default(),
        };
        Ok(TransformParams::new(width, height)
            .with_blur(blur)
            .with_grayscale(grayscale)
            .with_resize_mode(resize_mode))
    }
}

/// Accepts `1`, `t`, `true` and `0`, `f`, `false` in the usual casings.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn parse_dimension(name: &str, raw: &str) -> Result<u32, ApiError> {
    raw.parse::<u32>()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {name} '{raw}'")))
}

pub fn router(service: Arc<ImageService>, timeout: Duration) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/:width", get(image_by_width))
        .route("/:width/:height", get(image_by_box))
        .layer(TimeoutLayer::new(timeout))
        .layer(trace_layer)
        .with_state(AppState { service })
}

async fn health() -> &'static str {
    "ok"
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.stats())
}

async fn image_by_width(
    State(state): State<AppState>,
    Path(width): Path<String>,
    Query(query): Query<ImageQuery>,
) -> Result<Response, ApiError> {
    let width = parse_dimension("width", &width)?;
    random_image(state, query.to_params(width, 0)?).await
}

async fn image_by_box(
    State(state): State<AppState>,
    Path((width, height)): Path<(String, String)>,
    Query(query): Query<ImageQuery>,
) -> Result<Response, ApiError> {
    let width = parse_dimension("width", &width)?;
    let height = parse_dimension("height", &height)?;
    random_image(state, query.to_params(width, height)?).await
}

async fn random_image(state: AppState, params: TransformParams) -> Result<Response, ApiError> {
    let service = state.service.clone();
    let bytes = tokio::task::spawn_blocking(move || service.serve_random(&params))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(([(header::CONTENT_TYPE, MIME_JPEG)], bytes).into_response())
}

/// Serve until Ctrl-C or SIGTERM. Uses TLS when the config names a
/// certificate and key.
pub async fn serve(service: Arc<ImageService>, config: &ServiceConfig) -> Result<(), ServerError> {
    let app = router(
        service,
        Duration::from_secs(config.server.request_timeout_secs),
    );
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    match config.tls() {
        Some((cert, key)) => {
            let tls = RustlsConfig::from_pem_file(cert, key)
                .await
                .map_err(ServerError::Tls)?;
            let handle = axum_server::Handle::new();
            let shutdown = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
            });

            info!(%addr, "Listening on https");
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = TcpListener::bind(addr).await?;
            info!(addr = %listener.local_addr()?, "Listening on http");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
