//! Connected viewers of one room.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};

/// Close code sent to a second executor connection.
pub const DUPLICATE_EXECUTOR_CLOSE_CODE: u16 = 1008;
pub const DUPLICATE_EXECUTOR_REASON: &str = "duplicate executor";
/// Close code sent to every viewer of a deleted room.
pub const ROOM_CLOSED_CLOSE_CODE: u16 = 1001;
pub const ROOM_CLOSED_REASON: &str = "room deleted";

/// Identifier assigned when a connection is accepted.
pub type ConnectionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomMode {
    View,
    Exec,
}

/// Screen the client is showing; informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenName {
    Chat,
    Typing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewerInfo {
    pub room_id: u64,
    pub mode: RoomMode,
    pub screen: ScreenName,
    pub accepted_at: DateTime<FixedOffset>,
}

/// Frames queued for a viewer's socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Full visible message set as JSON.
    Snapshot(String),
    Close { code: u16, reason: String },
}

struct Viewer {
    info: ViewerInfo,
    sender: mpsc::UnboundedSender<Outbound>,
}

/// Viewer table keyed by connection id.
#[derive(Default)]
pub struct ViewerRegistry {
    viewers: HashMap<ConnectionId, Viewer>,
}

impl ViewerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    pub fn has_executor(&self) -> bool {
        self.viewers.values().any(|v| v.info.mode == RoomMode::Exec)
    }

    /// At most one executor per room.
    pub fn validate(&self, mode: RoomMode) -> SessionResult<()> {
        if mode == RoomMode::Exec && self.has_executor() {
            return Err(SessionError::DuplicateExecutor);
        }
        Ok(())
    }

    pub fn register(
        &mut self,
        info: ViewerInfo,
        sender: mpsc::UnboundedSender<Outbound>,
    ) -> SessionResult<ConnectionId> {
        self.validate(info.mode)?;
        let id = Uuid::new_v4();
        self.viewers.insert(id, Viewer { info, sender });
        self.log_connections();
        Ok(id)
    }

    pub fn remove(&mut self, id: &ConnectionId) -> Option<ViewerInfo> {
        let removed = self.viewers.remove(id).map(|v| v.info);
        if removed.is_some() {
            self.log_connections();
        }
        removed
    }

    pub fn info(&self, id: &ConnectionId) -> Option<&ViewerInfo> {
        self.viewers.get(id).map(|v| &v.info)
    }

    /// Queue a frame for one viewer; a closed channel removes it.
    pub fn send(&mut self, id: &ConnectionId, frame: Outbound) -> bool {
        let delivered = self
            .viewers
            .get(id)
            .map(|v| v.sender.send(frame).is_ok())
            .unwrap_or(false);
        if !delivered {
            self.remove(id);
        }
        delivered
    }

    /// Send `snapshot` to every viewer. Returns the ids that were dropped.
    pub fn broadcast(&mut self, snapshot: &str) -> Vec<ConnectionId> {
        let dead: Vec<ConnectionId> = self
            .viewers
            .iter()
            .filter(|(_, v)| v.sender.send(Outbound::Snapshot(snapshot.to_string())).is_err())
            .map(|(id, _)| *id)
            .collect();
        for id in &dead {
            tracing::warn!(connection = %id, "Viewer gone during broadcast");
            self.viewers.remove(id);
        }
        dead
    }

    /// Send a close frame to every viewer and forget them. Returns how many
    /// were registered.
    pub fn close_all(&mut self, code: u16, reason: &str) -> usize {
        let closed = self.viewers.len();
        for (_, viewer) in self.viewers.drain() {
            let _ = viewer.sender.send(Outbound::Close {
                code,
                reason: reason.to_string(),
            });
        }
        if closed > 0 {
            self.log_connections();
        }
        closed
    }

    fn log_connections(&self) {
        if self.viewers.is_empty() {
            tracing::info!("Active connections: empty");
            return;
        }
        for (id, viewer) in &self.viewers {
            tracing::info!(
                connection = %id,
                room_id = viewer.info.room_id,
                mode = ?viewer.info.mode,
                screen = ?viewer.info.screen,
                accepted_at = %viewer.info.accepted_at,
                "Active connection"
            );
        }
    }
}
