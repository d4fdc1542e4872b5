//! HTTP and websocket front door.
//!
//! Serves:
//! - `GET|POST /rooms`, `DELETE /rooms/{room_id}`: room registry
//! - `POST /new_discussion`, `/additional_discussion`, `/discussion_end`
//! - `POST /next_accessible_message`: reveal one line to viewers
//! - `GET /ws/chat`: viewer websocket
//! - `GET /system/config_list`, `/system/agenda/{agenda_file}`
//! - `GET /health`, `/metrics`

pub mod handlers;
pub mod system;
pub mod ws;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::error::{ConfigError, SessionError};
use crate::session::RoomRegistry;

/// Shared state of the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    /// Directory holding debate files and agenda lists.
    pub config_dir: PathBuf,
}

impl AppState {
    pub fn new(registry: Arc<RoomRegistry>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            config_dir: config_dir.into(),
        }
    }
}

/// Error returned by handlers, rendered as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.detail });
        (self.status, Json(body)).into_response()
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        let status = match &err {
            ConfigError::NotFound(_) => StatusCode::NOT_FOUND,
            ConfigError::Parse { .. } | ConfigError::InvalidValue { .. } => {
                StatusCode::BAD_REQUEST
            }
            ConfigError::UnknownModel(_) | ConfigError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        if let SessionError::Config(inner) = err {
            return inner.into();
        }
        let status = match &err {
            SessionError::RoomNotFound(_) => StatusCode::NOT_FOUND,
            SessionError::Busy | SessionError::NotStarted | SessionError::DuplicateExecutor => {
                StatusCode::CONFLICT
            }
            SessionError::Cache { .. } => StatusCode::BAD_REQUEST,
            SessionError::Config(_) | SessionError::Debate(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Build the axum router.
///
/// An empty `allowed_origins` allows any origin.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/rooms", get(handlers::list_rooms).post(handlers::create_room))
        .route("/rooms/{room_id}", delete(handlers::delete_room))
        .route("/new_discussion", post(handlers::new_discussion))
        .route(
            "/next_accessible_message",
            post(handlers::next_accessible_message),
        )
        .route("/additional_discussion", post(handlers::additional_discussion))
        .route("/discussion_end", post(handlers::discussion_end))
        .route("/ws/chat", get(ws::chat_socket))
        .route("/system/config_list", get(system::config_list))
        .route("/system/agenda/{agenda_file}", get(system::agenda))
        .route("/health", get(health_check))
        .route("/metrics", get(crate::metrics::metrics_handler))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the listener fails.
pub async fn start_server(
    host: &str,
    port: u16,
    state: AppState,
    allowed_origins: &[String],
) -> anyhow::Result<()> {
    let app = build_router(state, allowed_origins);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    tracing::info!("debate-forge server starting on http://{}", addr);
    tracing::info!("   Viewers: ws://{}/ws/chat", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// GET /health
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
