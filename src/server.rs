//! HTTP service: the upload endpoint plus render and export helpers.
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | `GET`  | `/health` | | `{status, version}` |
//! | `POST` | `/api/extract` | multipart, field `file` | record JSON |
//! | `POST` | `/api/render` | record JSON | [`ReceiptView`] JSON |
//! | `POST` | `/api/export/:format` | record JSON | `json` or `csv` attachment |
//!
//! Failures use one envelope, `{"error": "...", "rawText": "..."}`, where
//! `rawText` is present only when the model answered with something that
//! could not be parsed.

use crate::config::ExtractionConfig;
use crate::error::ReceiptError;
use crate::export::{self, ExportFormat};
use crate::extract;
use crate::pipeline::intake::Upload;
use crate::receipt::ExtractedRecord;
use crate::render::{self, ReceiptView};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared, read-only request context.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ExtractionConfig>,
}

impl AppState {
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }
}

/// Build the router.
pub fn router(config: ExtractionConfig) -> Router {
    let body_limit = config.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);
    let state = AppState::new(config);

    Router::new()
        .route("/health", get(health))
        .route("/api/extract", post(extract_receipt))
        .route("/api/render", post(render_receipt))
        .route("/api/export/:format", post(export_receipt))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, config: ExtractionConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(config)).await
}

// ── Error envelope ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

impl ReceiptError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream { .. } | Self::EmptyResponse | Self::Parse { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ReceiptError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_client_error() {
            tracing::warn!(status = status.as_u16(), "Rejected request: {}", self);
        } else {
            tracing::error!(status = status.as_u16(), "Request failed: {}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            raw_text: self.raw_text().map(str::to_string),
        });
        (status, body).into_response()
    }
}

fn bad_json(rejection: JsonRejection) -> ReceiptError {
    ReceiptError::invalid_input(format!("invalid record body: {}", rejection.body_text()))
}

// ── Handlers ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /api/extract`: the first field named `file` is the upload; any
/// other field is ignored.
async fn extract_receipt(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ExtractedRecord>, ReceiptError> {
    let mut upload: Option<Upload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ReceiptError::invalid_input(format!("failed to read upload: {}", e.body_text())))?
    {
        if field.name() != Some("file") || upload.is_some() {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        tracing::debug!(?filename, ?content_type, "Received file field");

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ReceiptError::invalid_input(format!("failed to read file data: {}", e.body_text())))?;
        upload = Some(Upload::new(filename, content_type, bytes.to_vec()));
    }

    let upload = upload.unwrap_or_default();
    let record = extract::submit(upload, state.config()).await?;
    Ok(Json(record))
}

/// `POST /api/render`
async fn render_receipt(
    State(state): State<AppState>,
    body: Result<Json<ExtractedRecord>, JsonRejection>,
) -> Result<Json<ReceiptView>, ReceiptError> {
    let Json(record) = body.map_err(bad_json)?;
    Ok(Json(render::render_with_currency(&record, &state.config().currency)))
}

/// `POST /api/export/:format`
async fn export_receipt(
    Path(format): Path<String>,
    body: Result<Json<ExtractedRecord>, JsonRejection>,
) -> Result<Response, ReceiptError> {
    let format: ExportFormat = format.parse()?;
    let Json(record) = body.map_err(bad_json)?;

    let bytes = export::export_as(&record, format)?;
    let filename = export::export_filename(&record, format);
    tracing::info!(%format, %filename, rows = record.len(), "Exported receipt");

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}
