use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::Extension,
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tally_store::{classify, LogKind, LogStore, StoreError};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::RuntimeConfig;

#[derive(Clone)]
struct HttpState {
    store: Arc<LogStore>,
}

/// Handler-boundary error wrapper. Save and read failures carry different
/// response envelopes: writes answer `{"ok":false,"error":..}`, reads a
/// bare `{"error":..}`.
#[derive(Debug)]
enum ApiError {
    Save(StoreError),
    Read(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Save(err) => {
                let status = if err.is_invalid_input() {
                    StatusCode::BAD_REQUEST
                } else {
                    tracing::error!("save failed: {err}");
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (
                    status,
                    Json(json!({ "ok": false, "error": err.to_string() })),
                )
                    .into_response()
            }
            ApiError::Read(err) => {
                tracing::error!("read failed: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": err.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

/// Build the collection router over an injected store handle.
pub fn router(store: Arc<LogStore>, cors_origins: &[String]) -> Router {
    let state = HttpState { store };

    Router::new()
        .route("/save", post(save))
        .route("/results", get(get_results))
        .route("/feedback", get(get_feedback))
        .route("/health", get(health))
        .layer(Extension(state))
        .layer(build_cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// Bind and run the HTTP server until the process is terminated.
pub async fn serve(config: RuntimeConfig) -> Result<()> {
    let store = Arc::new(LogStore::new(&config.data_dir));
    let router = router(store, &config.cors_origins);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.host, config.port))?;

    tracing::info!(
        "tallyd listening on {addr}, data dir {}",
        config.data_dir.display()
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind tallyd to {addr}"))?;

    axum::serve(listener, router.into_make_service())
        .await
        .context("HTTP server encountered an unrecoverable error")?;

    Ok(())
}

// The body is taken raw rather than through the Json extractor so that a
// malformed payload gets this API's own 400 envelope, not a framework
// rejection. Nothing of the stored record is echoed back.
async fn save(
    Extension(state): Extension<HttpState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let record = classify(&body).map_err(ApiError::Save)?;
    state.store.append(&record).map_err(ApiError::Save)?;
    Ok(Json(json!({ "ok": true })))
}

async fn get_results(
    Extension(state): Extension<HttpState>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let rows = state
        .store
        .read_all(LogKind::Results)
        .map_err(ApiError::Read)?;
    Ok(Json(rows))
}

async fn get_feedback(
    Extension(state): Extension<HttpState>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let rows = state
        .store
        .read_all(LogKind::Feedback)
        .map_err(ApiError::Read)?;
    Ok(Json(rows))
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    if !origins.is_empty() {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        if !parsed.is_empty() {
            return layer.allow_origin(AllowOrigin::list(parsed));
        }
    }

    layer
}
