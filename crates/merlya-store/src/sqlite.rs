//! SQLite-backed [`ConversationStore`], grounded in
//! `athena_ai/memory/conversation_manager/storage.py::SQLiteStore`.
//!
//! The original opens and closes a raw `sqlite3.Connection` per method
//! call via a context manager. `sqlx::SqlitePool` is the idiomatic
//! equivalent here — each call still checks a connection out of the pool
//! and returns it when the query finishes, so no connection is held
//! across an `.await` boundary between calls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{AllConversationsExport, Conversation, ConversationExport, ConversationSummary, Message, EXPORT_VERSION};
use crate::store::ConversationStore;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.as_ref().display()))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                title TEXT,
                created_at TEXT,
                updated_at TEXT,
                token_count INTEGER DEFAULT 0,
                compacted INTEGER DEFAULT 0,
                is_current INTEGER DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT,
                role TEXT,
                content TEXT,
                timestamp TEXT,
                tokens INTEGER DEFAULT 0,
                FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_conv ON messages(conversation_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO conversations (id, title, created_at, updated_at, token_count, compacted, is_current)
             VALUES (?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(&conversation.id)
        .bind(&conversation.title)
        .bind(conversation.created_at.to_rfc3339())
        .bind(conversation.updated_at.to_rfc3339())
        .bind(conversation.token_count as i64)
        .bind(conversation.compacted as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_message(&self, conversation_id: &str, message: &Message) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO messages (conversation_id, role, content, timestamp, tokens) VALUES (?, ?, ?, ?, ?)")
            .bind(conversation_id)
            .bind(&message.role)
            .bind(&message.content)
            .bind(message.timestamp.to_rfc3339())
            .bind(message.tokens as i64)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE conversations SET updated_at = ?, token_count = token_count + ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(message.tokens as i64)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn load_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query("SELECT id, title, created_at, updated_at, token_count, compacted FROM conversations WHERE id = ?")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else { return Ok(None) };

        let mut conversation = Conversation {
            id: row.get::<String, _>("id"),
            title: row.get::<String, _>("title"),
            messages: Vec::new(),
            created_at: parse_timestamp(&row.get::<String, _>("created_at")),
            updated_at: parse_timestamp(&row.get::<String, _>("updated_at")),
            token_count: row.get::<i64, _>("token_count") as u32,
            compacted: row.get::<i64, _>("compacted") != 0,
        };

        let message_rows = sqlx::query("SELECT role, content, timestamp, tokens FROM messages WHERE conversation_id = ? ORDER BY timestamp ASC")
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await?;

        conversation.messages = message_rows
            .into_iter()
            .map(|row| Message {
                role: row.get::<String, _>("role"),
                content: row.get::<String, _>("content"),
                timestamp: parse_timestamp(&row.get::<String, _>("timestamp")),
                tokens: row.get::<i64, _>("tokens") as u32,
            })
            .collect();

        Ok(Some(conversation))
    }

    async fn load_current(&self) -> Result<Option<Conversation>> {
        let row = sqlx::query("SELECT id FROM conversations WHERE is_current = 1 LIMIT 1").fetch_optional(&self.pool).await?;
        match row {
            Some(row) => self.load_conversation(&row.get::<String, _>("id")).await,
            None => Ok(None),
        }
    }

    async fn set_current(&self, conversation_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE conversations SET is_current = 0").execute(&mut *tx).await?;
        sqlx::query("UPDATE conversations SET is_current = 1 WHERE id = ?")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn archive(&self, conversation_id: &str) -> Result<()> {
        sqlx::query("UPDATE conversations SET is_current = 0 WHERE id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?").bind(conversation_id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_all(&self, limit: u32) -> Result<Vec<ConversationSummary>> {
        let rows = sqlx::query(
            "SELECT c.id, c.title, c.created_at, c.updated_at, c.token_count, c.is_current, COUNT(m.id) as message_count
             FROM conversations c
             LEFT JOIN messages m ON c.id = m.conversation_id
             GROUP BY c.id
             ORDER BY c.updated_at DESC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ConversationSummary {
                id: row.get::<String, _>("id"),
                title: row.get::<String, _>("title"),
                created_at: parse_timestamp(&row.get::<String, _>("created_at")),
                updated_at: parse_timestamp(&row.get::<String, _>("updated_at")),
                token_count: row.get::<i64, _>("token_count") as u32,
                current: row.get::<i64, _>("is_current") != 0,
                message_count: row.get::<i64, _>("message_count") as u32,
            })
            .collect())
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
        if self.load_conversation(&conversation.id).await?.is_some() {
            conversation.id = format!("conv_{}_imported", &Uuid::new_v4().simple().to_string()[..12]);
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO conversations (id, title, created_at, updated_at, token_count, compacted, is_current)
             VALUES (?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(&conversation.id)
        .bind(&conversation.title)
        .bind(conversation.created_at.to_rfc3339())
        .bind(conversation.updated_at.to_rfc3339())
        .bind(conversation.token_count as i64)
        .bind(conversation.compacted as i64)
        .execute(&mut *tx)
        .await?;

        for message in &conversation.messages {
            sqlx::query("INSERT INTO messages (conversation_id, role, content, timestamp, tokens) VALUES (?, ?, ?, ?, ?)")
                .bind(&conversation.id)
                .bind(&message.role)
                .bind(&message.content)
                .bind(message.timestamp.to_rfc3339())
                .bind(message.tokens as i64)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(Some(conversation.id))
    }

    async fn export_all(&self) -> Result<AllConversationsExport> {
        let rows = sqlx::query("SELECT id FROM conversations ORDER BY updated_at DESC").fetch_all(&self.pool).await?;

        let mut conversations = Vec::new();
        for row in rows {
            if let Some(conversation) = self.load_conversation(&row.get::<String, _>("id")).await? {
                conversations.push(conversation);
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

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("conversations.db")).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn save_and_load_conversation_with_messages() {
        let (store, _dir) = store().await;
        let mut conversation = Conversation::new("conv_1", "ops chat");
        store.save_conversation(&conversation).await.unwrap();

        conversation.add_message("user", "check db01 status");
        store.save_message("conv_1", &conversation.messages[0]).await.unwrap();

        let loaded = store.load_conversation("conv_1").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].content, "check db01 status");
    }

    #[tokio::test]
    async fn set_current_is_exclusive() {
        let (store, _dir) = store().await;
        store.save_conversation(&Conversation::new("a", "a")).await.unwrap();
        store.save_conversation(&Conversation::new("b", "b")).await.unwrap();

        store.set_current("a").await.unwrap();
        store.set_current("b").await.unwrap();

        let current = store.load_current().await.unwrap().unwrap();
        assert_eq!(current.id, "b");
    }

    #[tokio::test]
    async fn deleting_conversation_cascades_messages() {
        let (store, _dir) = store().await;
        let mut conversation = Conversation::new("conv_cascade", "will be deleted");
        store.save_conversation(&conversation).await.unwrap();
        conversation.add_message("user", "hello");
        store.save_message("conv_cascade", &conversation.messages[0]).await.unwrap();

        assert!(store.delete("conv_cascade").await.unwrap());
        assert!(store.load_conversation("conv_cascade").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn import_reassigns_id_on_collision() {
        let (store, _dir) = store().await;
        store.save_conversation(&Conversation::new("conv_dup", "original")).await.unwrap();

        let export = ConversationExport {
            version: EXPORT_VERSION.to_string(),
            exported_at: Utc::now(),
            conversation: Conversation::new("conv_dup", "imported"),
        };
        let new_id = store.import_conversation(export).await.unwrap().unwrap();
        assert_ne!(new_id, "conv_dup");
    }

    #[tokio::test]
    async fn export_all_round_trips_through_json() {
        let (store, _dir) = store().await;
        store.save_conversation(&Conversation::new("conv_x", "x")).await.unwrap();
        store.save_conversation(&Conversation::new("conv_y", "y")).await.unwrap();

        let export = store.export_all().await.unwrap();
        assert_eq!(export.count, 2);
        assert_eq!(export.version, EXPORT_VERSION);
    }
}
