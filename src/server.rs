//! HTTP surface for the acquisition service.
//!
//! Every acquisition endpoint takes the same JSON payload and differs only in
//! the mode it runs. Failures always answer with `{error, details}`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::crawler::EngineFactory;
use crate::error::Error;
use crate::request::{AcquisitionPayload, Mode};
use crate::service::{AcquisitionResponse, AcquisitionService};

/// Build the axum Router with all endpoints.
pub fn router<F: EngineFactory>(service: Arc<AcquisitionService<F>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/crawler", post(crawl::<F>))
        .route("/api/crawler/scrape", post(scrape::<F>))
        .route("/api/crawler/render", post(render::<F>))
        .route("/api/crawler/extract-text", post(extract_text::<F>))
        .route("/api/crawler/monitor", post(monitor::<F>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve the API on `addr` until the listener fails.
pub async fn start<F: EngineFactory>(
    addr: SocketAddr,
    service: Arc<AcquisitionService<F>>,
) -> anyhow::Result<()> {
    let app = router(service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Error body returned by every endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// An error answered with a status code and an [`ErrorBody`]
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    /// Map a service error for the endpoint serving `mode`
    pub fn from_error(mode: Mode, err: Error) -> Self {
        match err {
            Error::Validation(message) => Self {
                status: StatusCode::BAD_REQUEST,
                body: ErrorBody {
                    error: message,
                    details: None,
                },
            },
            err => {
                let status = if err.is_client_error() {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                Self {
                    status,
                    body: ErrorBody {
                        error: failure_message(mode).to_string(),
                        details: Some(err.to_string()),
                    },
                }
            }
        }
    }

    fn bad_body(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: "Invalid request body".to_string(),
                details: Some(rejection.body_text()),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Short failure message of each endpoint
pub fn failure_message(mode: Mode) -> &'static str {
    match mode {
        Mode::Crawl => "Failed to crawl website",
        Mode::Scrape => "Failed to scrape website",
        Mode::Render => "Failed to render website",
        Mode::ExtractText => "Failed to extract text",
        Mode::Monitor => "Failed to monitor website",
    }
}

// ── Handlers ────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Run `payload` in `mode` and map the outcome to a response
async fn acquire<F: EngineFactory>(
    service: &AcquisitionService<F>,
    payload: Result<Json<AcquisitionPayload>, JsonRejection>,
    mode: Mode,
) -> Result<Json<AcquisitionResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        warn!(%mode, "Rejected request body: {}", rejection.body_text());
        ApiError::bad_body(rejection)
    })?;

    let request = payload
        .into_request(mode)
        .map_err(|e| ApiError::from_error(mode, e))?;

    match service.handle(request).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            if e.is_client_error() {
                warn!(%mode, "Request rejected: {}", e);
            } else {
                error!(%mode, "Request failed: {}", e);
            }
            Err(ApiError::from_error(mode, e))
        }
    }
}

async fn crawl<F: EngineFactory>(
    State(service): State<Arc<AcquisitionService<F>>>,
    payload: Result<Json<AcquisitionPayload>, JsonRejection>,
) -> Result<Json<AcquisitionResponse>, ApiError> {
    acquire(&service, payload, Mode::Crawl).await
}

async fn scrape<F: EngineFactory>(
    State(service): State<Arc<AcquisitionService<F>>>,
    payload: Result<Json<AcquisitionPayload>, JsonRejection>,
) -> Result<Json<AcquisitionResponse>, ApiError> {
    acquire(&service, payload, Mode::Scrape).await
}

async fn render<F: EngineFactory>(
    State(service): State<Arc<AcquisitionService<F>>>,
    payload: Result<Json<AcquisitionPayload>, JsonRejection>,
) -> Result<Json<AcquisitionResponse>, ApiError> {
    acquire(&service, payload, Mode::Render).await
}

async fn extract_text<F: EngineFactory>(
    State(service): State<Arc<AcquisitionService<F>>>,
    payload: Result<Json<AcquisitionPayload>, JsonRejection>,
) -> Result<Json<AcquisitionResponse>, ApiError> {
    acquire(&service, payload, Mode::ExtractText).await
}

async fn monitor<F: EngineFactory>(
    State(service): State<Arc<AcquisitionService<F>>>,
    payload: Result<Json<AcquisitionPayload>, JsonRejection>,
) -> Result<Json<AcquisitionResponse>, ApiError> {
    acquire(&service, payload, Mode::Monitor).await
}
