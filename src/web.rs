//! Axum-based HTTP transport with optional OpenAPI (utoipa) and Swagger UI
//!
//! Every session operation answers with a structured result body. Caller
//! errors map to 4xx codes and storage failures to 500; a rejected sample
//! is a normal outcome and answers 200 with `success: false`.

use crate::error::{ChargelogError, Result};
use crate::file_store::FileStore;
use crate::persistence::DATE_DIR_FORMAT;
use crate::sample::ChargingSample;
use crate::session::{PushOutcome, SessionManager, SessionSnapshot, SessionSummary};
use crate::validation::ValidationOutcome;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Json, Router,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Largest accepted upload body
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub files: FileStore,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        let files = FileStore::new(sessions.data_root());
        Self { sessions, files }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VehicleBody {
    pub vehicle_id: String,
}

/// Answer to session start and end requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SessionResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SessionSummary>,
}

/// Answer to a sample push
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SampleResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<ValidationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<u64>,
}

/// Answer to a bulk file upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FileTransferResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub size: u64,
}

fn status_for(err: &ChargelogError) -> StatusCode {
    match err {
        ChargelogError::EmptyIdentifier
        | ChargelogError::InvalidIdentifier { .. }
        | ChargelogError::Validation { .. }
        | ChargelogError::Parse { .. } => StatusCode::BAD_REQUEST,
        ChargelogError::NoActiveSession { .. } | ChargelogError::NotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        ChargelogError::SessionAlreadyActive { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Run synchronous session or file work off the async executor
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ChargelogError::generic(format!("Worker task failed: {e}")))?
}

fn session_failure(err: &ChargelogError) -> (StatusCode, Json<SessionResult>) {
    (
        status_for(err),
        Json(SessionResult {
            success: false,
            message: err.to_string(),
            ..SessionResult::default()
        }),
    )
}

fn bad_body(rejection: &JsonRejection) -> (StatusCode, String) {
    (rejection.status(), rejection.body_text())
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/health", responses(
    (status = 200, description = "Service is healthy")
)))]
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/sessions/start",
    request_body = VehicleBody,
    responses(
        (status = 200, body = SessionResult),
        (status = 400, body = SessionResult),
        (status = 409, body = SessionResult),
    )
))]
async fn start_session(
    State(state): State<AppState>,
    body: std::result::Result<Json<VehicleBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            let (status, message) = bad_body(&rejection);
            return (
                status,
                Json(SessionResult {
                    success: false,
                    message,
                    ..SessionResult::default()
                }),
            );
        }
    };

    let sessions = Arc::clone(&state.sessions);
    match blocking(move || sessions.start_session(&body.vehicle_id)).await {
        Ok(session_id) => (
            StatusCode::OK,
            Json(SessionResult {
                success: true,
                message: "Session started successfully".to_string(),
                session_id: Some(session_id),
                summary: None,
            }),
        ),
        Err(e) => session_failure(&e),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/sessions/end",
    request_body = VehicleBody,
    responses(
        (status = 200, body = SessionResult),
        (status = 404, body = SessionResult),
    )
))]
async fn end_session(
    State(state): State<AppState>,
    body: std::result::Result<Json<VehicleBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            let (status, message) = bad_body(&rejection);
            return (
                status,
                Json(SessionResult {
                    success: false,
                    message,
                    ..SessionResult::default()
                }),
            );
        }
    };

    let sessions = Arc::clone(&state.sessions);
    match blocking(move || sessions.end_session(&body.vehicle_id)).await {
        Ok(summary) => (
            StatusCode::OK,
            Json(SessionResult {
                success: true,
                message: format!(
                    "Session ended successfully. Processed {} samples",
                    summary.sample_count
                ),
                session_id: Some(summary.session_id.clone()),
                summary: Some(summary),
            }),
        ),
        Err(e) => session_failure(&e),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/samples",
    request_body = ChargingSample,
    responses(
        (status = 200, body = SampleResult),
        (status = 404, body = SampleResult),
    )
))]
async fn push_sample(
    State(state): State<AppState>,
    body: std::result::Result<Json<ChargingSample>, JsonRejection>,
) -> impl IntoResponse {
    let Json(sample) = match body {
        Ok(body) => body,
        Err(rejection) => {
            let (status, message) = bad_body(&rejection);
            return (
                status,
                Json(SampleResult {
                    success: false,
                    message,
                    ..SampleResult::default()
                }),
            );
        }
    };

    let sessions = Arc::clone(&state.sessions);
    match blocking(move || sessions.push_sample(&sample)).await {
        Ok(PushOutcome::Accepted { sample_count }) => (
            StatusCode::OK,
            Json(SampleResult {
                success: true,
                message: "Sample processed successfully".to_string(),
                rejection_reason: None,
                sample_count: Some(sample_count),
            }),
        ),
        Ok(PushOutcome::Rejected(outcome)) => (
            StatusCode::OK,
            Json(SampleResult {
                success: false,
                message: outcome.reason().to_string(),
                rejection_reason: Some(outcome),
                sample_count: None,
            }),
        ),
        Err(e) => (
            status_for(&e),
            Json(SampleResult {
                success: false,
                message: e.to_string(),
                ..SampleResult::default()
            }),
        ),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/sessions", responses(
    (status = 200, body = [SessionSnapshot]),
    (status = 500, body = SessionResult),
)))]
async fn sessions(State(state): State<AppState>) -> Response {
    // Snapshots wait on session locks that are held during disk writes
    let sessions = Arc::clone(&state.sessions);
    let list: Result<Vec<SessionSnapshot>> = blocking(move || Ok(sessions.active_sessions())).await;
    match list {
        Ok(list) => Json(list).into_response(),
        Err(e) => session_failure(&e).into_response(),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/events", responses((status = 200))))]
async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.sessions.events().subscribe();
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(|msg| {
        // Lagged receivers skip what they missed
        let event = msg.ok()?;
        Event::default()
            .event(event.kind.as_str())
            .json_data(&event)
            .ok()
            .map(Ok::<Event, std::convert::Infallible>)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/uploads/{vehicle_id}/{file_name}",
    params(
        ("vehicle_id" = String, Path, description = "Vehicle identifier"),
        ("file_name" = String, Path, description = "Name to store the file under"),
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, body = FileTransferResult),
        (status = 400, body = FileTransferResult),
    )
))]
async fn upload_file(
    State(state): State<AppState>,
    Path((vehicle_id, file_name)): Path<(String, String)>,
    content: Bytes,
) -> impl IntoResponse {
    let files = state.files.clone();
    let size = content.len() as u64;
    match blocking(move || files.upload(&vehicle_id, &file_name, &content)).await {
        Ok(path) => (
            StatusCode::OK,
            Json(FileTransferResult {
                success: true,
                message: "File uploaded successfully".to_string(),
                path: Some(path.display().to_string()),
                size,
            }),
        ),
        Err(e) => (
            status_for(&e),
            Json(FileTransferResult {
                success: false,
                message: e.to_string(),
                ..FileTransferResult::default()
            }),
        ),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(get,
    path = "/api/files/{vehicle_id}/{date}/sessions/{session_id}",
    params(
        ("vehicle_id" = String, Path, description = "Vehicle identifier"),
        ("date" = String, Path, description = "Session day as yyyy-MM-dd"),
        ("session_id" = String, Path, description = "Session identifier"),
    ),
    responses(
        (status = 200, description = "Accepted-sample log", content_type = "text/csv"),
        (status = 404, body = FileTransferResult),
    )
))]
async fn download_session(
    State(state): State<AppState>,
    Path((vehicle_id, date, session_id)): Path<(String, String, String)>,
) -> Response {
    let failure = |e: &ChargelogError| {
        (
            status_for(e),
            Json(FileTransferResult {
                success: false,
                message: e.to_string(),
                ..FileTransferResult::default()
            }),
        )
            .into_response()
    };

    let date = match NaiveDate::parse_from_str(&date, DATE_DIR_FORMAT) {
        Ok(date) => date,
        Err(e) => return failure(&ChargelogError::from(e)),
    };

    let files = state.files.clone();
    let name = format!("session_{session_id}.csv");
    match blocking(move || files.download_session(&vehicle_id, &session_id, date)).await {
        Ok(bytes) => {
            let mut resp = Response::new(bytes.into());
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("text/csv; charset=utf-8"),
            );
            if let Ok(value) =
                header::HeaderValue::from_str(&format!("attachment; filename=\"{name}\""))
            {
                resp.headers_mut().insert(header::CONTENT_DISPOSITION, value);
            }
            resp
        }
        Err(e) => failure(&e),
    }
}

#[cfg(feature = "openapi")]
#[utoipa::path(get, path = "/api/config/schema", responses((status = 200)))]
async fn get_config_schema() -> impl IntoResponse {
    let schema = schemars::schema_for!(crate::config::Config);
    Json(serde_json::to_value(&schema).unwrap_or(serde_json::json!({"error":"schema"})))
}

#[cfg(feature = "openapi")]
#[derive(utoipa::OpenApi)]
#[openapi(
    paths(
        health, start_session, end_session, push_sample, sessions, events,
        upload_file, download_session, get_config_schema,
    ),
    components(schemas(
        VehicleBody, SessionResult, SampleResult, FileTransferResult,
        SessionSnapshot, SessionSummary, ChargingSample, ValidationOutcome,
        crate::sample::Triad, crate::events::TransferEvent, crate::events::TransferEventKind,
    )),
    tags((name = "chargelog", description = "Chargelog telemetry ingestion API"))
)]
pub struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/health", get(health))
        .route("/api/sessions", get(sessions))
        .route("/api/sessions/start", post(start_session))
        .route("/api/sessions/end", post(end_session))
        .route("/api/samples", post(push_sample))
        .route("/api/events", get(events))
        .route(
            "/api/uploads/{vehicle_id}/{file_name}",
            post(upload_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/api/files/{vehicle_id}/{date}/sessions/{session_id}",
            get(download_session),
        );

    #[cfg(feature = "openapi")]
    let router = {
        use utoipa::OpenApi;
        router
            .route("/api/config/schema", get(get_config_schema))
            .merge(utoipa_swagger_ui::SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
    };

    router
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until `shutdown` resolves
pub async fn serve<F>(state: AppState, host: &str, port: u16, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(state);

    let logger = crate::logging::get_logger("web");
    logger.info(&format!(
        "Starting web server; requested host={host}, port={port}"
    ));

    let addr = if let Ok(ip) = host.parse::<IpAddr>() {
        SocketAddr::new(ip, port)
    } else {
        logger.warn(&format!("Invalid host '{host}'; falling back to 127.0.0.1"));
        ([127, 0, 0, 1], port).into()
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{} (API /api)",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
