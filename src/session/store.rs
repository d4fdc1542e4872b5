//! Generated vs. visible transcript.

use super::message::Message;

/// All generated messages plus the prefix revealed to viewers.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    visible: usize,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the hidden tail.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Reveal exactly one more message. Returns `false` when nothing is pending.
    pub fn reveal_next(&mut self) -> bool {
        if self.visible < self.messages.len() {
            self.visible += 1;
            true
        } else {
            false
        }
    }

    pub fn visible(&self) -> &[Message] {
        &self.messages[..self.visible]
    }

    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending(&self) -> usize {
        self.messages.len() - self.visible
    }

    pub fn reset(&mut self) {
        self.messages.clear();
        self.visible = 0;
    }

    /// Visible messages as the JSON array sent to viewers.
    pub fn visible_json(&self) -> String {
        serde_json::to_string(self.visible()).unwrap_or_else(|_| "[]".to_string())
    }
}
