//! SQLite persistence for conversations and messages.
//!
//! ```rust,ignore
//! use kopi_debate::storage::Database;
//! use kopi_debate::debate::Role;
//!
//! let db = Database::connect("sqlite://kopi.db").await?;
//! db.run_migrations().await?;
//!
//! let conversation = db.create_conversation("Remote Work", "Offices beat remote work").await?;
//! db.append_turn(conversation.id, "Home is better", "Is it, though?").await?;
//! let recent = db.recent_messages(conversation.id, 7).await?;
//! ```

pub mod database;
pub mod migrations;
pub mod schema;

pub use database::{Conversation, ConversationUpdate, Database, StoredMessage};
pub use migrations::{AppliedMigration, MigrationRunner};
