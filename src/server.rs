//! HTTP front-end.
//!
//! Serves every configured page over a JSON API. A client opens a session,
//! uploads artifacts, asks questions on a page's tabs and reads the
//! session history back. Sessions live in memory and end on `DELETE`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/pages` | Configured pages with their tabs and accepted files |
//! | `POST`   | `/sessions` | Start a session |
//! | `DELETE` | `/sessions/{id}` | End a session and drop its history |
//! | `GET`    | `/sessions/{id}/history` | Interaction history (`?page=` filters) |
//! | `GET`    | `/pages/{page}/status` | Model, artifact counts, indexed chunks |
//! | `POST`   | `/pages/{page}/upload` | Store base64 files, ingest if anything new |
//! | `POST`   | `/pages/{page}/ask` | Run a query on a tab |
//! | `POST`   | `/pages/{page}/clear` | Delete the page's knowledge base |
//! | `GET`    | `/pages/{page}/generated` | Generated files by category |
//! | `DELETE` | `/pages/{page}/generated?path=` | Delete one generated file |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "precondition", "message": "Please enter a query" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `precondition` (422),
//! `upstream` (502), `filesystem` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted for browser clients.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

use crate::artifacts::Category;
use crate::controller::{App, PageSummary, UploadFile};
use crate::error::Error;
use crate::session::SharedSession;

/// Build the router. Split from [`run_server`] so tests can drive it
/// without a socket.
pub fn router(app: Arc<App>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/pages", get(handle_pages))
        .route("/sessions", post(handle_start_session))
        .route("/sessions/{id}", axum::routing::delete(handle_end_session))
        .route("/sessions/{id}/history", get(handle_history))
        .route("/pages/{page}/status", get(handle_status))
        .route("/pages/{page}/upload", post(handle_upload))
        .route("/pages/{page}/ask", post(handle_ask))
        .route("/pages/{page}/clear", post(handle_clear))
        .route(
            "/pages/{page}/generated",
            get(handle_generated).delete(handle_delete_generated),
        )
        .layer(cors)
        .with_state(app)
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(app: Arc<App>) -> anyhow::Result<()> {
    let bind_addr = app.config().server.bind.clone();
    let pages = app.pages().count();
    let router = router(app);

    info!(%bind_addr, pages, "starting HTTP front-end");
    println!("Review harness listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Precondition(_) => (StatusCode::UNPROCESSABLE_ENTITY, "precondition"),
            Error::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream"),
            Error::Filesystem { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "filesystem"),
            Error::PartialDelete(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

fn parse_session_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| bad_request(format!("invalid session id: {}", raw)))
}

async fn session(app: &App, raw: &str) -> Result<SharedSession, AppError> {
    let id = parse_session_id(raw)?;
    Ok(app.sessions.get(id).await?)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /pages ============

#[derive(Serialize)]
struct PagesResponse {
    pages: Vec<PageSummary>,
}

async fn handle_pages(State(app): State<Arc<App>>) -> Json<PagesResponse> {
    Json(PagesResponse {
        pages: app.pages().map(|p| p.summary()).collect(),
    })
}

// ============ Sessions ============

#[derive(Serialize)]
struct SessionResponse {
    session_id: Uuid,
}

async fn handle_start_session(State(app): State<Arc<App>>) -> (StatusCode, Json<SessionResponse>) {
    let (id, _) = app.sessions.create().await;
    info!(session = %id, "session started");
    (StatusCode::CREATED, Json(SessionResponse { session_id: id }))
}

async fn handle_end_session(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_session_id(&id)?;
    app.sessions.end(id).await?;
    info!(session = %id, "session ended");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct HistoryQuery {
    page: Option<String>,
}

async fn handle_history(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> ApiResult<serde_json::Value> {
    let shared = session(&app, &id).await?;
    let ctx = shared.lock().await;
    let history: Vec<_> = match &q.page {
        Some(page) => ctx.history_for(page).collect(),
        None => ctx.history.iter().collect(),
    };
    Ok(Json(serde_json::json!({
        "session_id": ctx.id,
        "uploader_generation": ctx.uploader_generation,
        "history": history,
    })))
}

// ============ Pages ============

async fn handle_status(
    State(app): State<Arc<App>>,
    Path(page): Path<String>,
) -> ApiResult<crate::controller::PageStatus> {
    let page = app.page(&page)?;
    Ok(Json(page.status().await?))
}

#[derive(Deserialize)]
struct UploadRequest {
    session_id: String,
    category: Category,
    files: Vec<UploadedFile>,
}

#[derive(Deserialize)]
struct UploadedFile {
    filename: String,
    /// File content, standard base64.
    content: String,
}

async fn handle_upload(
    State(app): State<Arc<App>>,
    Path(page): Path<String>,
    Json(req): Json<UploadRequest>,
) -> ApiResult<crate::controller::UploadReport> {
    let page = app.page(&page)?;
    let shared = session(&app, &req.session_id).await?;

    let mut files = Vec::with_capacity(req.files.len());
    for f in req.files {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(f.content.as_bytes())
            .map_err(|e| bad_request(format!("{}: invalid base64: {}", f.filename, e)))?;
        files.push(UploadFile {
            filename: f.filename,
            bytes,
        });
    }

    let ctx = shared.lock().await;
    Ok(Json(page.upload(&ctx, req.category, files).await?))
}

#[derive(Deserialize)]
struct AskRequest {
    session_id: String,
    tab: String,
    query: String,
    #[serde(default)]
    options: BTreeMap<String, String>,
}

async fn handle_ask(
    State(app): State<Arc<App>>,
    Path(page): Path<String>,
    Json(req): Json<AskRequest>,
) -> ApiResult<crate::controller::Submission> {
    let page = app.page(&page)?;
    let shared = session(&app, &req.session_id).await?;
    let mut ctx = shared.lock().await;
    Ok(Json(
        page.submit(&mut ctx, &req.tab, &req.query, &req.options)
            .await?,
    ))
}

#[derive(Deserialize)]
struct ClearRequest {
    session_id: String,
}

async fn handle_clear(
    State(app): State<Arc<App>>,
    Path(page): Path<String>,
    Json(req): Json<ClearRequest>,
) -> ApiResult<serde_json::Value> {
    let page = app.page(&page)?;
    let shared = session(&app, &req.session_id).await?;
    let mut ctx = shared.lock().await;
    let report = page.clear(&mut ctx).await;
    Ok(Json(serde_json::json!({
        "complete": report.is_complete(),
        "report": report,
        "uploader_generation": ctx.uploader_generation,
    })))
}

async fn handle_generated(
    State(app): State<Arc<App>>,
    Path(page): Path<String>,
) -> ApiResult<serde_json::Value> {
    let page = app.page(&page)?;
    Ok(Json(serde_json::json!({ "files": page.generated()? })))
}

#[derive(Deserialize)]
struct DeleteGeneratedQuery {
    path: String,
}

async fn handle_delete_generated(
    State(app): State<Arc<App>>,
    Path(page): Path<String>,
    Query(q): Query<DeleteGeneratedQuery>,
) -> Result<StatusCode, AppError> {
    let page = app.page(&page)?;
    page.delete_generated(&q.path)?;
    Ok(StatusCode::NO_CONTENT)
}
