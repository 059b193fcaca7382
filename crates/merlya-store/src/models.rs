//! Conversation/message data model, grounded in
//! `athena_ai/memory/conversation_manager/models.py`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rough whitespace-based token estimate, standing in for the original's
/// `count_tokens` (a real tokenizer import out of scope for this crate).
/// Good enough for budget bookkeeping, not for billing.
pub fn estimate_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    ((text.split_whitespace().count() as f32) * 1.3).ceil() as u32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub tokens: u32,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let tokens = estimate_tokens(&content);
        Self {
            role: role.into(),
            content,
            timestamp: Utc::now(),
            tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub token_count: u32,
    pub compacted: bool,
}

impl Conversation {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            token_count: 0,
            compacted: false,
        }
    }

    pub fn add_message(&mut self, role: impl Into<String>, content: impl Into<String>) -> &Message {
        let message = Message::new(role, content);
        self.token_count += message.tokens;
        self.updated_at = Utc::now();
        self.messages.push(message);
        self.messages.last().unwrap()
    }

    /// Recomputes `token_count` and every message's own `tokens` field
    /// from scratch — useful after an import, when stored counts may be
    /// stale or estimated by a different tokenizer.
    pub fn recalculate_tokens(&mut self) -> u32 {
        for message in &mut self.messages {
            message.tokens = estimate_tokens(&message.content);
        }
        self.token_count = self.messages.iter().map(|m| m.tokens).sum();
        self.token_count
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub token_count: u32,
    pub current: bool,
    pub message_count: u32,
}

/// Export envelope wrapping one or many conversations, grounded in
/// `ConversationStore`'s `EXPORT_VERSION` constant and export/import pair.
pub const EXPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationExport {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub conversation: Conversation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllConversationsExport {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub conversations: Vec<Conversation>,
    pub count: usize,
}
