//! Room and discussion endpoints.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::system::{config_file_path, plain_file_name};
use super::{ApiError, ApiResult, AppState};
use crate::debate::{DebateSpec, Lang};
use crate::error::SessionError;
use crate::session::{Message, RoomSummary, StartRequest};

/// Body of `POST /new_discussion`.
///
/// The whole body is also handed over to other clients with the start
/// message, so unknown fields are kept there.
#[derive(Debug, Deserialize)]
pub struct NewDiscussionRequest {
    pub config_file: String,
    #[serde(default)]
    pub lang: Lang,
    #[serde(default)]
    pub tech_enable: bool,
    pub agenda_text: String,
    #[serde(default)]
    pub is_select_agenda: bool,
    #[serde(default)]
    pub agenda_id: Option<Value>,
}

impl NewDiscussionRequest {
    /// Cache file name for a preset agenda: `<agenda_id>_<config stem>.json`.
    ///
    /// An id that would escape the cache directory is a bad request.
    pub fn cache_file(&self) -> ApiResult<Option<String>> {
        if !self.is_select_agenda {
            return Ok(None);
        }
        let Some(agenda_id) = self.agenda_id.as_ref() else {
            return Ok(None);
        };
        let agenda_id = match agenda_id {
            Value::String(id) => id.clone(),
            other => other.to_string(),
        };
        let stem = std::path::Path::new(&self.config_file)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = format!("{}_{}.json", agenda_id, stem);
        plain_file_name(&name)?;
        Ok(Some(name))
    }
}

/// Body of `POST /additional_discussion`.
#[derive(Debug, Deserialize)]
pub struct AdditionalDiscussionRequest {
    pub msg_text: String,
    #[serde(default)]
    pub tech_enable: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub room_name: String,
}

/// Read `room_id` from a body; numbers and numeric strings are accepted.
fn room_id(body: &Value) -> ApiResult<u64> {
    let raw = body
        .get("room_id")
        .ok_or_else(|| ApiError::bad_request("room_id is required"))?;
    match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| ApiError::bad_request(format!("invalid room_id: {}", raw)))
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Value) -> ApiResult<T> {
    serde_json::from_value(body.clone()).map_err(|e| ApiError::bad_request(e.to_string()))
}

// ============================================================================
// Rooms
// ============================================================================

/// GET /rooms
pub async fn list_rooms(State(state): State<AppState>) -> Json<BTreeMap<u64, RoomSummary>> {
    Json(state.registry.rooms().await)
}

/// POST /rooms
pub async fn create_room(
    State(state): State<AppState>,
    Json(body): Json<CreateRoomRequest>,
) -> Json<Value> {
    let room = state.registry.create_room(&body.room_name).await;
    Json(json!({ "status": "success", "room_id": room.room_id }))
}

/// DELETE /rooms/{room_id}
pub async fn delete_room(
    State(state): State<AppState>,
    Path(room_id): Path<u64>,
) -> ApiResult<Json<Value>> {
    state.registry.delete_room(room_id).await?;
    Ok(Json(json!({ "status": "success" })))
}

// ============================================================================
// Discussion
// ============================================================================

/// POST /new_discussion
pub async fn new_discussion(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let room_id = room_id(&body)?;
    let session = state.registry.session(room_id).await.map_err(|e| {
        tracing::error!(room_id, "new_discussion: room not found");
        ApiError::from(e)
    })?;
    let request: NewDiscussionRequest = parse_body(&body)?;

    let cache_file = request.cache_file()?;
    let spec = DebateSpec::load(config_file_path(&state.config_dir, &request.config_file)?)?;
    let start = StartRequest {
        spec,
        agenda: request.agenda_text.clone(),
        lang: request.lang,
        use_strategy: request.tech_enable,
        cache_file,
        handover: body,
    };

    match session.start_discussion(start).await {
        Ok(outcome) => Ok(Json(json!({
            "status": "succeeded",
            "exist_cache": outcome.exist_cache,
        }))),
        Err(SessionError::Busy) => Ok(Json(json!({ "status": "failed" }))),
        Err(e) => {
            tracing::error!(room_id, error = %e, "new_discussion failed");
            Err(e.into())
        }
    }
}

/// POST /next_accessible_message
pub async fn next_accessible_message(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Vec<Message>>> {
    let session = state.registry.session(room_id(&body)?).await?;
    Ok(Json(session.reveal_next().await))
}

/// POST /additional_discussion
pub async fn additional_discussion(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let room_id = room_id(&body)?;
    let session = state.registry.session(room_id).await?;
    let request: AdditionalDiscussionRequest = parse_body(&body)?;

    match session
        .continue_discussion(request.msg_text, request.tech_enable, body)
        .await
    {
        Ok(()) => Ok(Json(json!({ "status": "success" }))),
        Err(SessionError::Busy) => Ok(Json(json!({ "status": "failed" }))),
        Err(e) => {
            tracing::error!(room_id, error = %e, "additional_discussion failed");
            Err(e.into())
        }
    }
}

/// POST /discussion_end
pub async fn discussion_end(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let session = state.registry.session(room_id(&body)?).await?;
    session.stop_discussion().await;
    Ok(Json(json!({ "status": "stop discussion" })))
}
