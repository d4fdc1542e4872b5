//! Transport messages sent to viewers.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::debate::DebateEvent;

/// Wire message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Message,
    SystemInfo,
    OptInfo,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::SystemInfo => "system_info",
            Self::OptInfo => "opt_info",
        }
    }

    pub fn from_wire(kind: &str) -> Option<Self> {
        match kind {
            "message" => Some(Self::Message),
            "system_info" => Some(Self::SystemInfo),
            "opt_info" => Some(Self::OptInfo),
            _ => None,
        }
    }
}

/// One transcript line as the front-end renders it.
///
/// Unset fields serialize as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: Option<MessageType>,
    pub user_name: Option<String>,
    pub msg_text: Option<String>,
    pub timestamp: Option<String>,
    pub time: Option<String>,
    pub user_img: Option<String>,
    pub handover_datum: Option<serde_json::Value>,
}

impl Message {
    pub fn new(kind: MessageType, user_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            user_name: Some(user_name.into()),
            msg_text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_handover(mut self, handover: serde_json::Value) -> Self {
        self.handover_datum = Some(handover);
        self
    }

    /// `None` for events that carry no transcript line.
    pub fn from_event(event: &DebateEvent) -> Option<Self> {
        let kind = MessageType::from_wire(event.kind()?)?;
        Some(Self::new(kind, event.speaker()?, event.text()?))
    }

    /// Fill creation time and display image, and drop one layer of 「」.
    pub fn stamp(&mut self, now: DateTime<FixedOffset>, user_img: String) {
        if let Some(text) = self.msg_text.take() {
            self.msg_text = Some(strip_wrapping_quotes(&text).to_string());
        }
        let shifted = now.naive_local().and_utc();
        self.timestamp = Some(format!(
            "{:.6}",
            shifted.timestamp_micros() as f64 / 1_000_000.0
        ));
        self.time = Some(now.format("%H:%M").to_string());
        self.user_img = Some(user_img);
    }
}

/// Remove a single enclosing 「…」 pair.
pub fn strip_wrapping_quotes(text: &str) -> &str {
    text.strip_prefix('「')
        .and_then(|rest| rest.strip_suffix('」'))
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_strip_wrapping_quotes() {
        assert_eq!(strip_wrapping_quotes("「賛成です」"), "賛成です");
        assert_eq!(strip_wrapping_quotes("「「二重」」"), "「二重」");
        assert_eq!(strip_wrapping_quotes("「open"), "「open");
        assert_eq!(strip_wrapping_quotes("plain"), "plain");
        assert_eq!(strip_wrapping_quotes("「」"), "");
        assert_eq!(strip_wrapping_quotes(""), "");
    }

    #[test]
    fn test_stamp() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 4, 1, 13, 5, 0).unwrap();
        let mut msg = Message::new(MessageType::Message, "Alice", "「hello」");
        msg.stamp(now, "/images/alice.png".to_string());

        assert_eq!(msg.msg_text.as_deref(), Some("hello"));
        assert_eq!(msg.time.as_deref(), Some("13:05"));
        assert_eq!(msg.user_img.as_deref(), Some("/images/alice.png"));
        let expected = tz.with_ymd_and_hms(2024, 4, 1, 13, 5, 0).unwrap().naive_local().and_utc().timestamp();
        assert_eq!(msg.timestamp, Some(format!("{}.000000", expected)));
    }

    #[test]
    fn test_wire_shape() {
        let msg = Message::new(MessageType::SystemInfo, "system", "start")
            .with_handover(serde_json::json!({"room_id": 1}));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "system_info");
        assert_eq!(value["user_name"], "system");
        assert_eq!(value["msg_text"], "start");
        assert_eq!(value["handover_datum"]["room_id"], 1);
        assert!(value["timestamp"].is_null());
    }

    #[test]
    fn test_from_event() {
        let event = DebateEvent::InterventionNotice { text: "busy".to_string() };
        let msg = Message::from_event(&event).unwrap();
        assert_eq!(msg.kind, Some(MessageType::OptInfo));
        assert_eq!(msg.user_name.as_deref(), Some("optimizer"));
        assert!(Message::from_event(&DebateEvent::RoundComplete).is_none());
    }
}
