//! Rooms, sessions and paced transcript delivery.
//!
//! Each room owns one [`SessionController`]. The controller runs the debate
//! in a background task and pushes every generated line into a hidden
//! [`MessageStore`]. Lines become visible only when the executor client asks
//! for the next one ([`SessionController::reveal_next`]); every change of the
//! visible set is broadcast to the room's websocket viewers.
//!
//! ```ignore
//! use debate_forge::session::{RoomRegistry, SessionSettings, StartRequest};
//!
//! let registry = RoomRegistry::new(Arc::new(SessionSettings::new(models)));
//! let session = registry.session(1).await?;
//! session.start_discussion(request).await?;
//! let visible = session.reveal_next().await;
//! ```

pub mod controller;
pub mod message;
pub mod room;
pub mod store;
pub mod viewers;

pub use controller::{
    load_cache, SessionController, SessionSettings, StartOutcome, StartRequest, TranscriptCache,
    CACHE_ERROR_TEXT, ERROR_SPEAKER, SYSTEM_IMAGE,
};
pub use message::{strip_wrapping_quotes, Message, MessageType};
pub use room::{Room, RoomRegistry, RoomSummary, DEFAULT_ROOM_ID, DEFAULT_ROOM_NAME};
pub use store::MessageStore;
pub use viewers::{
    ConnectionId, Outbound, RoomMode, ScreenName, ViewerInfo, ViewerRegistry,
    DUPLICATE_EXECUTOR_CLOSE_CODE, DUPLICATE_EXECUTOR_REASON, ROOM_CLOSED_CLOSE_CODE,
    ROOM_CLOSED_REASON,
};
