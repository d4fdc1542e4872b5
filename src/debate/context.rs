//! Running debate state: panelists, agendas and the discussion log.

use serde::{Deserialize, Serialize};

use super::config::PromptTemplates;
use super::event::Lang;
use super::panelist::Panelist;

/// One generated comment and the agenda it was produced under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub agenda: String,
    pub panelist_id: String,
    pub panelist_name: String,
    pub panelist_persona: String,
    pub comment: String,
}

/// Append-only record of every comment in the session.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct DiscussionLog {
    entries: Vec<LogEntry>,
}

impl DiscussionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every comment in order.
    pub fn comments(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.comment.clone()).collect()
    }

    /// Entries on `agenda` made since `panelist_id` last spoke, oldest first.
    ///
    /// If the panelist never spoke, the whole log is unseen.
    pub fn unseen_by(&self, panelist_id: &str, agenda: &str) -> Vec<&LogEntry> {
        let start = self
            .entries
            .iter()
            .rposition(|e| e.panelist_id == panelist_id)
            .map_or(0, |i| i + 1);
        self.entries[start..]
            .iter()
            .filter(|e| e.agenda == agenda)
            .collect()
    }
}

/// Mutable state of one debate session.
#[derive(Debug)]
pub struct DebateContext {
    pub panelists: Vec<Panelist>,
    pub prompts: PromptTemplates,
    pub num_discussion_turn: u32,
    /// Agenda stack; the last element is current.
    pub agendas: Vec<String>,
    pub use_strategy: bool,
    pub lang: Lang,
    pub discussion_log: DiscussionLog,
}

impl DebateContext {
    pub fn new(panelists: Vec<Panelist>, prompts: PromptTemplates, num_discussion_turn: u32) -> Self {
        Self {
            panelists,
            prompts,
            num_discussion_turn,
            agendas: Vec::new(),
            use_strategy: false,
            lang: Lang::default(),
            discussion_log: DiscussionLog::new(),
        }
    }

    /// Last agenda pushed, or empty.
    pub fn current_agenda(&self) -> &str {
        self.agendas.last().map(String::as_str).unwrap_or("")
    }

    /// Second-to-last agenda, or empty.
    pub fn last_agenda(&self) -> &str {
        match self.agendas.len() {
            n if n >= 2 => &self.agendas[n - 2],
            _ => "",
        }
    }
}
