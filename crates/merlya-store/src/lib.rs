//! Pluggable conversation storage: a backend-agnostic trait plus a SQLite
//! and a JSON-file implementation.
//!
//! Grounded in `athena_ai/memory/conversation_manager/` (`models.py`,
//! `storage.py`).

pub mod error;
pub mod json;
pub mod models;
pub mod sqlite;
pub mod store;

pub use error::{Result, StoreError};
pub use json::JsonStore;
pub use models::{AllConversationsExport, Conversation, ConversationExport, ConversationSummary, Message, EXPORT_VERSION};
pub use sqlite::SqliteStore;
pub use store::ConversationStore;
