//! Browser UI shell: live recognition, registration and management surfaces.

use crate::engine::{EngineError, EngineHandle};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use facerec_service::{Outcome, SessionState, Toast};
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

const INDEX_HTML: &str = include_str!("../assets/index.html");
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Header carrying the per-tab session id chosen by the page.
pub const SESSION_HEADER: &str = "x-facerec-session";

/// Values the page needs to drive its streams.
#[derive(Debug, Clone, Serialize)]
pub struct UiSettings {
    pub stream_interval_ms: u64,
    pub similarity_threshold: f32,
}

impl UiSettings {
    pub fn new(stream_interval: Duration, similarity_threshold: f32) -> Self {
        Self {
            stream_interval_ms: stream_interval.as_millis() as u64,
            similarity_threshold,
        }
    }
}

/// Application state shared across handlers.
pub struct AppState {
    engine: EngineHandle,
    /// One state per UI session, replaced wholesale after each action.
    sessions: RwLock<HashMap<String, SessionState>>,
    settings: UiSettings,
    start_time: Instant,
}

impl AppState {
    pub fn new(engine: EngineHandle, settings: UiSettings) -> Self {
        Self {
            engine,
            sessions: RwLock::new(HashMap::new()),
            settings,
            start_time: Instant::now(),
        }
    }

    /// Replace the state of session `id` with `update` applied to it.
    ///
    /// Requests without a session id (the CLI) start from a fresh state that
    /// is not kept.
    async fn advance_session(
        &self,
        id: Option<String>,
        update: impl FnOnce(SessionState) -> SessionState,
    ) -> SessionState {
        let Some(id) = id else {
            return update(SessionState::new());
        };
        let mut sessions = self.sessions.write().await;
        let next = update(sessions.remove(&id).unwrap_or_default());
        sessions.insert(id, next.clone());
        next
    }

    async fn session(&self, id: Option<&str>) -> SessionState {
        match id {
            Some(id) => self.sessions.read().await.get(id).cloned().unwrap_or_default(),
            None => SessionState::new(),
        }
    }
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("could not decode image: {0}")]
    BadImage(image::ImageError),
    #[error("could not encode image: {0}")]
    Encode(image::ImageError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadImage(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(_) | ApiError::Encode(_) => {
                tracing::error!(error = %self, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub registered_faces: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FacesResponse {
    pub names: Vec<String>,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct OutcomeResponse {
    pub message: String,
    pub success: bool,
    pub toast: Option<Toast>,
    pub session: SessionState,
}

impl OutcomeResponse {
    fn new(outcome: Outcome, session: SessionState) -> Self {
        Self {
            toast: outcome.toast(),
            message: outcome.message,
            success: outcome.success,
            session,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterQuery {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    #[serde(default)]
    pub old_name: String,
    #[serde(default)]
    pub new_name: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
}

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/v1/health", get(health))
        .route("/api/v1/settings", get(settings))
        .route("/api/v1/predict", post(predict))
        .route("/api/v1/register/preview", post(preview))
        .route("/api/v1/register", post(register))
        .route("/api/v1/faces", get(faces))
        .route("/api/v1/faces/rename", post(rename))
        .route("/api/v1/faces/delete", post(delete))
        .route("/api/v1/session", get(session))
        .layer(DefaultBodyLimit::max(MAX_FRAME_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "facerecd listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("facerecd shutting down");
        })
        .await
}

fn decode_frame(bytes: &[u8]) -> Result<RgbImage, image::ImageError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

fn jpeg_response(frame: RgbImage) -> Result<Response, ApiError> {
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(frame)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .map_err(ApiError::Encode)?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], buf.into_inner()).into_response())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    let registered_faces = state.engine.count().await?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        registered_faces,
    }))
}

async fn settings(State(state): State<Arc<AppState>>) -> Json<UiSettings> {
    Json(state.settings.clone())
}

/// Empty body means the camera has not produced a frame yet.
async fn predict(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, ApiError> {
    if body.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    let frame = decode_frame(&body).map_err(ApiError::BadImage)?;
    jpeg_response(state.engine.predict(frame).await?)
}

async fn preview(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, ApiError> {
    if body.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    let frame = decode_frame(&body).map_err(ApiError::BadImage)?;
    jpeg_response(state.engine.preview(frame).await?)
}

async fn register(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RegisterQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<OutcomeResponse>, ApiError> {
    let snapshot = if body.is_empty() {
        None
    } else {
        match decode_frame(&body) {
            Ok(frame) => Some(frame),
            Err(err) => {
                tracing::warn!(error = %err, "undecodable registration snapshot");
                None
            }
        }
    };

    let outcome = state.engine.register(query.name, snapshot).await?;

    let session = state
        .advance_session(session_id(&headers), |s| s.with_registration(outcome.clone()))
        .await;
    Ok(Json(OutcomeResponse::new(outcome, session)))
}

async fn faces(State(state): State<Arc<AppState>>) -> Result<Json<FacesResponse>, ApiError> {
    let names = state.engine.list_names().await?;
    let count = state.engine.count().await?;
    Ok(Json(FacesResponse { names, count }))
}

async fn rename(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RenameRequest>,
) -> Result<Json<OutcomeResponse>, ApiError> {
    let outcome = state
        .engine
        .rename(req.old_name, req.new_name, req.password)
        .await?;

    let session = state
        .advance_session(session_id(&headers), |s| s.with_management(outcome.clone()))
        .await;
    Ok(Json(OutcomeResponse::new(outcome, session)))
}

async fn delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<OutcomeResponse>, ApiError> {
    let outcome = state.engine.delete(req.name, req.password).await?;

    let session = state
        .advance_session(session_id(&headers), |s| s.with_management(outcome.clone()))
        .await;
    Ok(Json(OutcomeResponse::new(outcome, session)))
}

async fn session(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Json<SessionState> {
    Json(state.session(session_id(&headers).as_deref()).await)
}
