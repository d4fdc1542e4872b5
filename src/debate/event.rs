//! Events produced by a running debate round.

use serde::{Deserialize, Serialize};

/// Display language of system texts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Lang {
    Ja,
    #[default]
    En,
}

impl Lang {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Ja => "ja",
            Self::En => "en",
        }
    }

    pub fn turn_announcement(&self, turn: u32) -> String {
        match self {
            Self::Ja => format!("======== ターン{} ========", turn),
            Self::En => format!("======== Turn {} ========", turn),
        }
    }

    pub fn intervention_notice(&self) -> &'static str {
        match self {
            Self::Ja => "ファシリテータAIの議論への介入中",
            Self::En => "Intervening in the discussion by a facilitator AI",
        }
    }

    pub fn discussion_started(&self) -> &'static str {
        match self {
            Self::Ja => "議論開始",
            Self::En => "Discussion started",
        }
    }

    pub fn discussion_finished(&self) -> &'static str {
        match self {
            Self::Ja => "議論終了",
            Self::En => "Discussion finished",
        }
    }
}

/// Anything other than `ja` is English.
impl From<&str> for Lang {
    fn from(code: &str) -> Self {
        if code.eq_ignore_ascii_case("ja") {
            Self::Ja
        } else {
            Self::En
        }
    }
}

impl From<String> for Lang {
    fn from(code: String) -> Self {
        Self::from(code.as_str())
    }
}

impl From<Lang> for String {
    fn from(lang: Lang) -> Self {
        lang.code().to_string()
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Speaker name of turn announcements.
pub const SYSTEM_SPEAKER: &str = "system";
/// Speaker name of intervention notices.
pub const OPTIMIZER_SPEAKER: &str = "optimizer";

/// One step of a debate round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DebateEvent {
    TurnAnnouncement { turn: u32, text: String },
    /// Emitted before a strategist-selected comment.
    InterventionNotice { text: String },
    Comment { speaker: String, text: String },
    /// The round finished; no further events follow.
    RoundComplete,
}

impl DebateEvent {
    /// Wire message type, `None` for [`DebateEvent::RoundComplete`].
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            Self::TurnAnnouncement { .. } => Some("system_info"),
            Self::InterventionNotice { .. } => Some("opt_info"),
            Self::Comment { .. } => Some("message"),
            Self::RoundComplete => None,
        }
    }

    pub fn speaker(&self) -> Option<&str> {
        match self {
            Self::TurnAnnouncement { .. } => Some(SYSTEM_SPEAKER),
            Self::InterventionNotice { .. } => Some(OPTIMIZER_SPEAKER),
            Self::Comment { speaker, .. } => Some(speaker),
            Self::RoundComplete => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::TurnAnnouncement { text, .. }
            | Self::InterventionNotice { text }
            | Self::Comment { text, .. } => Some(text),
            Self::RoundComplete => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::RoundComplete)
    }
}
