//! SQLite client for conversations and messages.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use super::migrations::MigrationRunner;
use crate::debate::{HistoryEntry, Role};
use crate::error::StorageError;

/// A stored debate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub topic: String,
    pub bot_stance: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<&StoredMessage> for HistoryEntry {
    fn from(message: &StoredMessage) -> Self {
        HistoryEntry::new(message.role, message.content.clone())
    }
}

/// Fields to change on a conversation. `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct ConversationUpdate {
    pub topic: Option<String>,
    pub bot_stance: Option<String>,
    pub is_active: Option<bool>,
}

impl ConversationUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_bot_stance(mut self, bot_stance: impl Into<String>) -> Self {
        self.bot_stance = Some(bot_stance.into());
        self
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.topic.is_none() && self.bot_stance.is_none() && self.is_active.is_none()
    }
}

/// Conversation store backed by a SQLite pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database at `database_url`,
    /// e.g. `sqlite://kopi.db`.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let opts = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StorageError::ConnectionFailed(format!("{}: {}", database_url, e)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        tracing::debug!(url = database_url, "Database opened");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn migrations(&self) -> MigrationRunner {
        MigrationRunner::new(self.pool.clone())
    }

    /// Applies pending migrations; returns how many ran.
    pub async fn run_migrations(&self) -> Result<usize, StorageError> {
        self.migrations().run_migrations().await
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    pub async fn create_conversation(
        &self,
        topic: &str,
        bot_stance: &str,
    ) -> Result<Conversation, StorageError> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            bot_stance: bot_stance.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO conversations (id, topic, bot_stance, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(conversation.id.to_string())
        .bind(&conversation.topic)
        .bind(&conversation.bot_stance)
        .bind(conversation.is_active)
        .bind(format_timestamp(now))
        .bind(format_timestamp(now))
        .execute(&self.pool)
        .await?;

        Ok(conversation)
    }

    pub async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StorageError> {
        let row = sqlx::query(
            "SELECT id, topic, bot_stance, is_active, created_at, updated_at \
             FROM conversations WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(conversation_from_row).transpose()
    }

    /// Conversations, most recently updated first.
    pub async fn list_conversations(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<Conversation>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, topic, bot_stance, is_active, created_at, updated_at \
             FROM conversations ORDER BY updated_at DESC, rowid DESC LIMIT ?",
        )
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(conversation_from_row).collect()
    }

    pub async fn update_conversation(
        &self,
        id: Uuid,
        update: ConversationUpdate,
    ) -> Result<Conversation, StorageError> {
        let mut conversation = self
            .get_conversation(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("conversation {}", id)))?;

        if let Some(topic) = update.topic {
            conversation.topic = topic;
        }
        if let Some(bot_stance) = update.bot_stance {
            conversation.bot_stance = bot_stance;
        }
        if let Some(is_active) = update.is_active {
            conversation.is_active = is_active;
        }
        conversation.updated_at = Utc::now();

        sqlx::query(
            "UPDATE conversations SET topic = ?, bot_stance = ?, is_active = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&conversation.topic)
        .bind(&conversation.bot_stance)
        .bind(conversation.is_active)
        .bind(format_timestamp(conversation.updated_at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(conversation)
    }

    /// Deletes a conversation and its messages. Returns whether it existed.
    pub async fn delete_conversation(&self, id: Uuid) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Messages
    // =========================================================================

    pub async fn create_message(
        &self,
        conversation_id: Uuid,
        role: Role,
        content: &str,
    ) -> Result<StoredMessage, StorageError> {
        let mut tx = self.pool.begin().await?;
        let message = insert_message(&mut tx, conversation_id, role, content).await?;
        touch_conversation(&mut tx, conversation_id, message.created_at).await?;
        tx.commit().await?;
        Ok(message)
    }

    /// Stores a user message and the bot's reply together, in that order.
    pub async fn append_turn(
        &self,
        conversation_id: Uuid,
        user_message: &str,
        bot_response: &str,
    ) -> Result<(StoredMessage, StoredMessage), StorageError> {
        let mut tx = self.pool.begin().await?;
        let user = insert_message(&mut tx, conversation_id, Role::User, user_message).await?;
        let bot = insert_message(&mut tx, conversation_id, Role::Bot, bot_response).await?;
        touch_conversation(&mut tx, conversation_id, bot.created_at).await?;
        tx.commit().await?;
        Ok((user, bot))
    }

    /// The first `limit` messages (all when `None`), oldest first.
    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<StoredMessage>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, role, content, created_at FROM messages \
             WHERE conversation_id = ? ORDER BY created_at ASC, rowid ASC LIMIT ?",
        )
        .bind(conversation_id.to_string())
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    /// The last `limit` messages, oldest first.
    pub async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, role, content, created_at FROM messages \
             WHERE conversation_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(conversation_id.to_string())
        .bind(sql_limit(Some(limit)))
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows
            .iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    pub async fn last_user_message(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<String>, StorageError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT content FROM messages WHERE conversation_id = ? AND role = 'user' \
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )
        .bind(conversation_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(content,)| content))
    }

    pub async fn count_messages(&self, conversation_id: Uuid) -> Result<i64, StorageError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM messages WHERE conversation_id = ?")
                .bind(conversation_id.to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

async fn insert_message(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    conversation_id: Uuid,
    role: Role,
    content: &str,
) -> Result<StoredMessage, StorageError> {
    let message = StoredMessage {
        id: Uuid::new_v4(),
        conversation_id,
        role,
        content: content.to_string(),
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO messages (id, conversation_id, role, content, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(message.id.to_string())
    .bind(conversation_id.to_string())
    .bind(role.as_str())
    .bind(&message.content)
    .bind(format_timestamp(message.created_at))
    .execute(&mut **tx)
    .await?;

    Ok(message)
}

async fn touch_conversation(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    conversation_id: Uuid,
    at: DateTime<Utc>,
) -> Result<(), StorageError> {
    sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
        .bind(format_timestamp(at))
        .bind(conversation_id.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn conversation_from_row(row: &SqliteRow) -> Result<Conversation, StorageError> {
    Ok(Conversation {
        id: parse_uuid(row.get("id"))?,
        topic: row.get("topic"),
        bot_stance: row.get("bot_stance"),
        is_active: row.get("is_active"),
        created_at: parse_timestamp(row.get("created_at"))?,
        updated_at: parse_timestamp(row.get("updated_at"))?,
    })
}

fn message_from_row(row: &SqliteRow) -> Result<StoredMessage, StorageError> {
    let role: String = row.get("role");
    Ok(StoredMessage {
        id: parse_uuid(row.get("id"))?,
        conversation_id: parse_uuid(row.get("conversation_id"))?,
        role: role.parse().map_err(StorageError::Corrupt)?,
        content: row.get("content"),
        created_at: parse_timestamp(row.get("created_at"))?,
    })
}

fn parse_uuid(text: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(text).map_err(|e| StorageError::Corrupt(format!("id '{}': {}", text, e)))
}

/// Fixed-width UTC timestamp text, sortable as a string.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("timestamp '{}': {}", text, e)))
}

/// SQLite treats a negative LIMIT as "no limit".
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX)).unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_db(dir: &tempfile::TempDir) -> Database {
        let url = format!("sqlite://{}", dir.path().join("kopi.db").display());
        let db = Database::connect(&url).await.expect("connect");
        db.run_migrations().await.expect("migrate");
        db
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir).await;

        assert_eq!(db.run_migrations().await.expect("second run"), 0);
        let applied = db
            .migrations()
            .list_applied_migrations()
            .await
            .expect("list");
        assert_eq!(applied.len(), super::super::schema::all_migrations().len());
        assert!(db
            .migrations()
            .pending_migrations()
            .await
            .expect("pending")
            .is_empty());
    }

    #[tokio::test]
    async fn test_conversation_crud() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir).await;

        let created = db
            .create_conversation("Vaccine Safety", "Vaccines pose significant risks")
            .await
            .expect("create");
        assert!(created.is_active);

        let fetched = db
            .get_conversation(created.id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(fetched.topic, "Vaccine Safety");
        assert_eq!(fetched.bot_stance, "Vaccines pose significant risks");

        let updated = db
            .update_conversation(created.id, ConversationUpdate::new().with_topic("Vaccines"))
            .await
            .expect("update");
        assert_eq!(updated.topic, "Vaccines");
        assert_eq!(updated.bot_stance, "Vaccines pose significant risks");

        assert_eq!(db.list_conversations(None).await.expect("list").len(), 1);
        assert!(db.delete_conversation(created.id).await.expect("delete"));
        assert!(!db.delete_conversation(created.id).await.expect("delete again"));
        assert!(db.get_conversation(created.id).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_update_missing_conversation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir).await;

        let err = db
            .update_conversation(Uuid::new_v4(), ConversationUpdate::new().with_active(false))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_messages_ordered_and_windowed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir).await;
        let conversation = db.create_conversation("t", "s").await.expect("create");

        for i in 0..4 {
            db.append_turn(conversation.id, &format!("user {}", i), &format!("bot {}", i))
                .await
                .expect("append");
        }

        let all = db.list_messages(conversation.id, None).await.expect("list");
        assert_eq!(all.len(), 8);
        assert_eq!(all[0].role, Role::User);
        assert_eq!(all[0].content, "user 0");
        assert_eq!(all[1].role, Role::Bot);
        assert_eq!(all[7].content, "bot 3");

        let first = db.list_messages(conversation.id, Some(3)).await.expect("list");
        assert_eq!(first.len(), 3);
        assert_eq!(first[2].content, "user 1");

        let recent = db.recent_messages(conversation.id, 3).await.expect("recent");
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["bot 2", "user 3", "bot 3"]);

        assert_eq!(
            db.last_user_message(conversation.id).await.expect("last"),
            Some("user 3".to_string())
        );
        assert_eq!(db.count_messages(conversation.id).await.expect("count"), 8);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_messages() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir).await;
        let conversation = db.create_conversation("t", "s").await.expect("create");
        db.create_message(conversation.id, Role::User, "hello")
            .await
            .expect("message");

        db.delete_conversation(conversation.id).await.expect("delete");
        assert_eq!(db.count_messages(conversation.id).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn test_message_requires_conversation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir).await;

        let result = db.create_message(Uuid::new_v4(), Role::User, "orphan").await;
        assert!(matches!(result, Err(StorageError::Query(_))));
    }

    #[tokio::test]
    async fn test_last_user_message_empty_conversation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir).await;
        let conversation = db.create_conversation("t", "s").await.expect("create");

        assert_eq!(db.last_user_message(conversation.id).await.expect("last"), None);
    }

    #[tokio::test]
    async fn test_reset_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir).await;
        db.create_conversation("t", "s").await.expect("create");

        db.migrations().reset_database().await.expect("reset");
        assert!(db.list_conversations(None).await.is_err());

        db.run_migrations().await.expect("re-migrate");
        assert!(db.list_conversations(None).await.expect("list").is_empty());
    }

    #[test]
    fn test_timestamp_text_is_fixed_width() {
        let a = format_timestamp(Utc::now());
        assert!(a.ends_with('Z'));
        assert_eq!(a.len(), "2026-01-01T00:00:00.000000Z".len());
        assert_eq!(format_timestamp(parse_timestamp(&a).expect("parse")), a);
    }

    #[test]
    fn test_sql_limit() {
        assert_eq!(sql_limit(None), -1);
        assert_eq!(sql_limit(Some(10)), 10);
    }
}
