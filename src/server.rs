//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `GET`  | `/health` | none | Health check (returns version) |
//! | `POST` | `/auth/login` | none | Exchange email + password for a session token |
//! | `POST` | `/xml/upload` | master | Import an uploaded feed file (multipart field `xmlFile`) |
//! | `POST` | `/xml/process-url` | master | Fetch and import a remote feed |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "url and portal are required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `malformed_input` (400),
//! `unrecognized_format` (400), `unauthorized` (401), `forbidden` (403),
//! `transport` (502), `internal` (500).
//!
//! # Import response
//!
//! ```json
//! {
//!   "message": "XML processado com sucesso",
//!   "results": { "total_processados": 3, "inseridos": 2, "atualizados": 0, "erros": 1 },
//!   "errors": [ { "codigo": "X9", "error": "..." } ]
//! }
//! ```

use anyhow::{Context, Result};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, Request, State,
    },
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use estate_harness_core::{ImportError, ImportReport, Portal, RecordFailure, Role};

use crate::auth::{token_from_headers, TokenSigner, TOKEN_COOKIE};
use crate::config::Config;
use crate::db;
use crate::import::{Importer, StagedUpload};
use crate::migrate;
use crate::schedule::{start_scheduler, FeedSweep};
use crate::sqlite_store::SqliteStore;
use crate::users;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub importer: Arc<Importer>,
    pub signer: Arc<TokenSigner>,
}

impl AppState {
    pub fn new(config: &Config, pool: SqlitePool) -> Result<Self> {
        let importer = Importer::for_store(SqliteStore::new(pool.clone()), config)?;
        Ok(Self {
            config: Arc::new(config.clone()),
            signer: Arc::new(TokenSigner::new(
                &config.auth.secret,
                config.auth.token_ttl_hours,
            )),
            pool,
            importer: Arc::new(importer),
        })
    }
}

/// Starts the HTTP server, plus the feed scheduler when enabled.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let state = AppState::new(config, pool.clone())?;

    let _scheduler = if config.import.scheduler_enabled {
        let sweep = FeedSweep::from_config(state.importer.clone(), SqliteStore::new(pool), config);
        Some(start_scheduler(Arc::new(sweep), &config.import.schedule).await?)
    } else {
        None
    };

    let app = build_router(state)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    println!("Estate API listening on http://{}", config.server.bind);
    tracing::info!(bind = %config.server.bind, "server started");

    axum::serve(listener, app).await?;
    Ok(())
}

fn cors_layer(origin: Option<&str>) -> Result<CorsLayer> {
    match origin {
        None => Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)),
        Some(origin) => {
            let origin: HeaderValue = origin
                .parse()
                .with_context(|| format!("invalid server.cors_origin: {}", origin))?;
            Ok(CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                .allow_credentials(true))
        }
    }
}

pub fn build_router(state: AppState) -> Result<Router> {
    let cors = cors_layer(state.config.server.cors_origin.as_deref())?;
    let body_limit = state.config.import.max_upload_bytes;

    let imports = Router::new()
        .route("/xml/upload", post(handle_upload))
        .route("/xml/process-url", post(handle_process_url))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_master));

    Ok(Router::new()
        .route("/health", get(handle_health))
        .route("/auth/login", post(handle_login))
        .merge(imports)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state))
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

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
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

fn error(status: StatusCode, code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code,
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn unauthorized(message: impl Into<String>) -> AppError {
    error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

fn forbidden(message: impl Into<String>) -> AppError {
    error(StatusCode::FORBIDDEN, "forbidden", message)
}

fn internal(message: impl Into<String>) -> AppError {
    error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

/// Oversized bodies are 413 `payload_too_large`; any other multipart failure is a 400.
fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return error(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", err.body_text());
    }
    bad_request(err.body_text())
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        let message = err.to_string();
        match err {
            ImportError::MalformedInput(_) => {
                error(StatusCode::BAD_REQUEST, "malformed_input", message)
            }
            ImportError::UnrecognizedFormat => {
                error(StatusCode::BAD_REQUEST, "unrecognized_format", message)
            }
            ImportError::UnsupportedPortal(_) => bad_request(message),
            ImportError::Transport(_) => error(StatusCode::BAD_GATEWAY, "transport", message),
            ImportError::Staging(_) | ImportError::Storage(_) => {
                tracing::error!(error = %message, "import failed");
                internal(message)
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{:#}", err), "request failed");
        internal(format!("{:#}", err))
    }
}

// ============ Auth guard ============

/// Admits only requests carrying a valid token for a `master` account.
async fn require_master(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = token_from_headers(request.headers())
        .ok_or_else(|| unauthorized("authentication required"))?;
    let claims = state
        .signer
        .verify(&token)
        .map_err(|e| unauthorized(e.to_string()))?;
    // The account's current role wins over the role baked into the token.
    let user = users::find_by_id(&state.pool, claims.uid)
        .await?
        .ok_or_else(|| unauthorized("account no longer exists"))?;
    if user.role != Role::Master {
        return Err(forbidden("master role required"));
    }
    tracing::debug!(uid = user.id, "master request admitted");
    Ok(next.run(request).await)
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

// ============ POST /auth/login ============

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user: users::User,
}

async fn handle_login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(bad_request("email and password are required"));
    }

    let user = users::find_by_email(&state.pool, &req.email)
        .await?
        .filter(|u| users::verify_password(u, &req.password))
        .ok_or_else(|| unauthorized("invalid email or password"))?;

    let token = state.signer.issue(user.id, user.role)?;
    let cookie = format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        TOKEN_COOKIE,
        token,
        state.signer.ttl_secs()
    );
    tracing::info!(uid = user.id, role = %user.role, "login");

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse { token, user }),
    )
        .into_response())
}

// ============ Import responses ============

#[derive(Debug, Serialize)]
pub struct ImportResults {
    pub total_processados: usize,
    pub inseridos: usize,
    pub atualizados: usize,
    pub erros: usize,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub message: String,
    pub results: ImportResults,
    pub errors: Vec<RecordFailure>,
}

impl ImportResponse {
    fn new(message: &str, report: ImportReport) -> Self {
        Self {
            message: message.to_string(),
            results: ImportResults {
                total_processados: report.total,
                inseridos: report.inserted,
                atualizados: report.updated,
                erros: report.error_count(),
            },
            errors: report.failures,
        }
    }
}

// ============ POST /xml/upload ============

/// Multipart field names accepted for the feed file.
const UPLOAD_FIELDS: [&str; 2] = ["xmlFile", "file"];

fn looks_like_xml(file_name: Option<&str>, content_type: Option<&str>) -> bool {
    let by_name = file_name
        .map(|n| n.to_ascii_lowercase().ends_with(".xml"))
        .unwrap_or(false);
    let by_type = content_type
        .map(|t| {
            let t = t.to_ascii_lowercase();
            t.starts_with("text/xml") || t.starts_with("application/xml")
        })
        .unwrap_or(false);
    by_name || by_type
}

async fn stage_upload(dir: &Path, data: &[u8]) -> Result<StagedUpload, AppError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| internal(format!("could not create upload directory: {}", e)))?;
    let staged = StagedUpload::new(dir.join(format!("{}.xml", Uuid::new_v4())));
    tokio::fs::write(staged.path(), data)
        .await
        .map_err(|e| internal(format!("could not stage upload: {}", e)))?;
    Ok(staged)
}

async fn handle_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImportResponse>, AppError> {
    let mut multipart = multipart.map_err(|e| bad_request(e.body_text()))?;
    let mut staged = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if !UPLOAD_FIELDS.contains(&field.name().unwrap_or_default()) {
            continue;
        }
        if !looks_like_xml(field.file_name(), field.content_type()) {
            return Err(bad_request("only XML files are accepted"));
        }
        let data = field.bytes().await.map_err(multipart_error)?;
        staged = Some(stage_upload(&state.config.import.upload_dir, &data).await?);
        break;
    }

    let staged = staged.ok_or_else(|| bad_request("no XML file uploaded (field 'xmlFile')"))?;
    let report = state.importer.import_upload(staged).await?;
    Ok(Json(ImportResponse::new("XML processado com sucesso", report)))
}

// ============ POST /xml/process-url ============

#[derive(Deserialize)]
struct ProcessUrlRequest {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    portal: Option<String>,
}

async fn handle_process_url(
    State(state): State<AppState>,
    payload: Result<Json<ProcessUrlRequest>, JsonRejection>,
) -> Result<Json<ImportResponse>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;
    let (Some(url), Some(portal)) = (
        req.url.filter(|u| !u.trim().is_empty()),
        req.portal.filter(|p| !p.trim().is_empty()),
    ) else {
        return Err(bad_request("url and portal are required"));
    };
    let portal: Portal = portal.parse()?;

    let report = state.importer.import_url(url.trim(), portal).await?;
    Ok(Json(ImportResponse::new(
        "XML da URL processado com sucesso",
        report,
    )))
}
