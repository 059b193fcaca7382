//! The pluggable storage trait, grounded in
//! `athena_ai/memory/conversation_manager/storage.py::ConversationStore`.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AllConversationsExport, Conversation, ConversationExport, ConversationSummary, Message};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn save_conversation(&self, conversation: &Conversation) -> Result<()>;
    async fn save_message(&self, conversation_id: &str, message: &Message) -> Result<()>;
    async fn load_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;
    async fn load_current(&self) -> Result<Option<Conversation>>;
    async fn set_current(&self, conversation_id: &str) -> Result<()>;
    async fn archive(&self, conversation_id: &str) -> Result<()>;
    async fn delete(&self, conversation_id: &str) -> Result<bool>;
    async fn list_all(&self, limit: u32) -> Result<Vec<ConversationSummary>>;
    async fn export_conversation(&self, conversation_id: &str) -> Result<Option<ConversationExport>>;
    async fn import_conversation(&self, export: ConversationExport) -> Result<Option<String>>;
    async fn export_all(&self) -> Result<AllConversationsExport>;
}
