//! JSON-file-backed [`ConversationStore`], grounded in
//! `athena_ai/memory/conversation_manager/storage.py::JsonStore`.
//!
//! Conversations live as one file per id (`conv_*.json` for archived /
//! listable ones); the "current" conversation is additionally mirrored
//! to `current.json`, matching the original's `save_conversation` always
//! writing there regardless of id.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Result, StoreError};
use crate::models::{AllConversationsExport, Conversation, ConversationExport, ConversationSummary, Message, EXPORT_VERSION};
use crate::store::ConversationStore;

pub struct JsonStore {
    storage_dir: PathBuf,
}

impl JsonStore {
    pub async fn new(storage_dir: impl Into<PathBuf>) -> Result<Self> {
        let storage_dir = storage_dir.into();
        tokio::fs::create_dir_all(&storage_dir).await?;
        Ok(Self { storage_dir })
    }

    fn current_file(&self) -> PathBuf {
        self.storage_dir.join("current.json")
    }

    fn conversation_file(&self, id: &str) -> PathBuf {
        self.storage_dir.join(format!("{id}.json"))
    }

    async fn read_conversation(&self, path: &Path) -> Result<Option<Conversation>> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    async fn write_conversation(&self, path: &Path, conversation: &Conversation) -> Result<()> {
        let data = serde_json::to_string_pretty(conversation)?;
        tokio::fs::write(path, data).await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for JsonStore {
    async fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.write_conversation(&self.current_file(), conversation).await
    }

    /// The original's JSON store deliberately ignores per-message saves —
    /// it persists the whole conversation at once via `save_conversation`.
    async fn save_message(&self, _conversation_id: &str, _message: &Message) -> Result<()> {
        Ok(())
    }

    async fn load_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        self.read_conversation(&self.conversation_file(conversation_id)).await
    }

    async fn load_current(&self) -> Result<Option<Conversation>> {
        self.read_conversation(&self.current_file()).await
    }

    async fn set_current(&self, conversation_id: &str) -> Result<()> {
        if let Some(conversation) = self.load_conversation(conversation_id).await? {
            self.save_conversation(&conversation).await?;
        }
        Ok(())
    }

    async fn archive(&self, conversation_id: &str) -> Result<()> {
        if let Some(current) = self.load_current().await? {
            if current.id == conversation_id {
                self.write_conversation(&self.conversation_file(conversation_id), &current).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<bool> {
        let path = self.conversation_file(conversation_id);
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(&path).await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn list_all(&self, limit: u32) -> Result<Vec<ConversationSummary>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.storage_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("conv_") && name.ends_with(".json") {
                entries.push(entry.path());
            }
        }
        entries.sort();
        entries.reverse();

        let mut summaries = Vec::new();
        for path in entries.into_iter().take(limit as usize) {
            if let Some(conversation) = self.read_conversation(&path).await? {
                summaries.push(ConversationSummary {
                    id: conversation.id,
                    title: conversation.title,
                    created_at: conversation.created_at,
                    updated_at: conversation.updated_at,
                    token_count: conversation.token_count,
                    current: false,
                    message_count: conversation.messages.len() as u32,
                });
            }
        }
        Ok(summaries)
    }

    async fn export_conversation(&self, conversation_id: &str) -> Result<Option<ConversationExport>> {
        let Some(conversation) = self.load_conversation(conversation_id).await? else {
            return Ok(None);
        };
        Ok(Some(ConversationExport {
            version: EXPORT_VERSION.to_string(),
            exported_at: Utc::now(),
            conversation,
        }))
    }

    async fn import_conversation(&self, export: ConversationExport) -> Result<Option<String>> {
        let mut conversation = export.conversation;
        if conversation.id.is_empty() {
            return Err(StoreError::MissingConversationField);
        }

        if tokio::fs::try_exists(self.conversation_file(&conversation.id)).await? {
            conversation.id = format!("conv_{}_imported", Utc::now().timestamp());
        }

        self.write_conversation(&self.conversation_file(&conversation.id), &conversation).await?;
        Ok(Some(conversation.id))
    }

    async fn export_all(&self) -> Result<AllConversationsExport> {
        let mut dir = tokio::fs::read_dir(&self.storage_dir).await?;
        let mut conversations = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("conv_") && name.ends_with(".json") {
                if let Some(conversation) = self.read_conversation(&entry.path()).await? {
                    conversations.push(conversation);
                }
            }
        }
        Ok(AllConversationsExport {
            version: EXPORT_VERSION.to_string(),
            exported_at: Utc::now(),
            count: conversations.len(),
            conversations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (JsonStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn save_and_load_current_round_trips() {
        let (store, _dir) = store().await;
        let mut conversation = Conversation::new("conv_1", "test thread");
        conversation.add_message("user", "hello there");
        store.save_conversation(&conversation).await.unwrap();

        let loaded = store.load_current().await.unwrap().unwrap();
        assert_eq!(loaded.id, "conv_1");
        assert_eq!(loaded.messages.len(), 1);
    }

    #[tokio::test]
    async fn set_current_writes_named_file_too() {
        let (store, _dir) = store().await;
        let mut conversation = Conversation::new("conv_named", "named");
        conversation.add_message("user", "hi");
        store.save_conversation(&conversation).await.unwrap();
        store.write_conversation(&store.conversation_file("conv_named"), &conversation).await.unwrap();

        store.set_current("conv_named").await.unwrap();
        let current = store.load_current().await.unwrap().unwrap();
        assert_eq!(current.id, "conv_named");
    }

    #[tokio::test]
    async fn delete_removes_named_file() {
        let (store, _dir) = store().await;
        let conversation = Conversation::new("conv_del", "to delete");
        store.write_conversation(&store.conversation_file("conv_del"), &conversation).await.unwrap();

        assert!(store.delete("conv_del").await.unwrap());
        assert!(store.load_conversation("conv_del").await.unwrap().is_none());
        assert!(!store.delete("conv_del").await.unwrap());
    }

    #[tokio::test]
    async fn import_reassigns_id_on_collision() {
        let (store, _dir) = store().await;
        let existing = Conversation::new("conv_dup", "first");
        store.write_conversation(&store.conversation_file("conv_dup"), &existing).await.unwrap();

        let export = ConversationExport {
            version: EXPORT_VERSION.to_string(),
            exported_at: Utc::now(),
            conversation: Conversation::new("conv_dup", "second"),
        };
        let new_id = store.import_conversation(export).await.unwrap().unwrap();
        assert_ne!(new_id, "conv_dup");
        assert!(store.load_conversation(&new_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_all_only_picks_up_conv_prefixed_files() {
        let (store, _dir) = store().await;
        let conversation = Conversation::new("conv_listed", "listed");
        store.write_conversation(&store.conversation_file("conv_listed"), &conversation).await.unwrap();
        store.save_conversation(&conversation).await.unwrap();

        let summaries = store.list_all(10).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, "conv_listed");
    }
}
