//! SQLite schema for conversations and their messages.
//!
//! Identifiers are stored as hyphenated UUID text and timestamps as
//! fixed-width RFC 3339 text (microseconds, `Z` suffix) so that text order
//! matches time order.

/// Conversations: one debate each, with its fixed topic and stance.
pub const CREATE_CONVERSATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id          TEXT    PRIMARY KEY,
    topic       TEXT    NOT NULL,
    bot_stance  TEXT    NOT NULL,
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT    NOT NULL,
    updated_at  TEXT    NOT NULL
)
"#;

/// Messages belong to exactly one conversation and go with it on delete.
pub const CREATE_MESSAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id               TEXT PRIMARY KEY,
    conversation_id  TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    role             TEXT NOT NULL CHECK (role IN ('user', 'bot')),
    content          TEXT NOT NULL,
    created_at       TEXT NOT NULL
)
"#;

pub const CREATE_MESSAGES_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_messages_conversation_created
    ON messages(conversation_id, created_at)
"#;

pub const CREATE_CONVERSATIONS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_conversations_updated
    ON conversations(updated_at)
"#;

/// Named migrations in application order.
pub fn all_migrations() -> Vec<(&'static str, &'static str)> {
    vec![
        ("0001_create_conversations", CREATE_CONVERSATIONS_TABLE),
        ("0002_create_messages", CREATE_MESSAGES_TABLE),
        ("0003_index_messages", CREATE_MESSAGES_INDEX),
        ("0004_index_conversations", CREATE_CONVERSATIONS_INDEX),
    ]
}

/// Tables dropped by a reset, children first.
pub const ALL_TABLES: &[&str] = &["messages", "conversations", "_migrations"];
