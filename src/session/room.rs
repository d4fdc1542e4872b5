//! Room registry.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::controller::{SessionController, SessionSettings};
use crate::error::{SessionError, SessionResult};
use crate::metrics::MetricsCollector;

/// Name of the room created at startup.
pub const DEFAULT_ROOM_NAME: &str = "Room 1";
/// Id of the first room.
pub const DEFAULT_ROOM_ID: u64 = 1;

/// A room and the session it owns.
#[derive(Debug, Clone)]
pub struct Room {
    pub room_id: u64,
    pub room_name: String,
    pub created_at: DateTime<FixedOffset>,
    pub session: Arc<SessionController>,
}

/// Room listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    pub room_id: u64,
    pub room_name: String,
    pub created_at: DateTime<FixedOffset>,
}

impl From<&Room> for RoomSummary {
    fn from(room: &Room) -> Self {
        Self {
            room_id: room.room_id,
            room_name: room.room_name.clone(),
            created_at: room.created_at,
        }
    }
}

/// All rooms, keyed by id. New ids are the current maximum plus one.
pub struct RoomRegistry {
    rooms: RwLock<BTreeMap<u64, Room>>,
    settings: Arc<SessionSettings>,
}

impl RoomRegistry {
    /// Registry holding the default room.
    pub fn new(settings: Arc<SessionSettings>) -> Self {
        let room = build_room(&settings, DEFAULT_ROOM_ID, DEFAULT_ROOM_NAME);
        let rooms = BTreeMap::from([(room.room_id, room)]);
        MetricsCollector::new().set_room_count(rooms.len());
        Self {
            rooms: RwLock::new(rooms),
            settings,
        }
    }

    /// Current time in the configured display offset.
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.settings.now()
    }

    pub async fn rooms(&self) -> BTreeMap<u64, RoomSummary> {
        self.rooms
            .read()
            .await
            .iter()
            .map(|(id, room)| (*id, RoomSummary::from(room)))
            .collect()
    }

    pub async fn create_room(&self, room_name: &str) -> RoomSummary {
        let mut rooms = self.rooms.write().await;
        let room_id = rooms
            .keys()
            .next_back()
            .map_or(DEFAULT_ROOM_ID, |max| max + 1);
        let room = build_room(&self.settings, room_id, room_name);
        let summary = RoomSummary::from(&room);
        rooms.insert(room_id, room);
        MetricsCollector::new().set_room_count(rooms.len());
        tracing::info!(room_id, room_name, "Room created");
        summary
    }

    /// Remove a room, stop its debate and close its viewers.
    pub async fn delete_room(&self, room_id: u64) -> SessionResult<RoomSummary> {
        let room = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.remove(&room_id).ok_or_else(|| {
                tracing::error!(room_id, "Room not deleted: not found");
                SessionError::RoomNotFound(room_id)
            })?;
            MetricsCollector::new().set_room_count(rooms.len());
            room
        };
        room.session.shutdown().await;
        tracing::info!(room_id, room_name = %room.room_name, "Room deleted");
        Ok(RoomSummary::from(&room))
    }

    pub async fn session(&self, room_id: u64) -> SessionResult<Arc<SessionController>> {
        self.rooms
            .read()
            .await
            .get(&room_id)
            .map(|room| Arc::clone(&room.session))
            .ok_or(SessionError::RoomNotFound(room_id))
    }
}

fn build_room(settings: &Arc<SessionSettings>, room_id: u64, room_name: &str) -> Room {
    Room {
        room_id,
        room_name: room_name.to_string(),
        created_at: settings.now(),
        session: Arc::new(SessionController::new(room_id, Arc::clone(settings))),
    }
}
