//! Versioned schema migrations tracked in a `_migrations` table.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::schema;
use crate::error::StorageError;

/// Applies pending migrations to a SQLite pool.
pub struct MigrationRunner {
    pool: SqlitePool,
}

impl MigrationRunner {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Runs all pending migrations. Already-applied ones are skipped, so this
    /// is safe to call on every start.
    pub async fn run_migrations(&self) -> Result<usize, StorageError> {
        self.ensure_migrations_table().await?;

        let mut applied = 0;
        for (name, statement) in schema::all_migrations() {
            if !self.is_migration_applied(name).await? {
                self.apply_migration(name, statement).await?;
                tracing::debug!(migration = name, "Applied migration");
                applied += 1;
            }
        }

        Ok(applied)
    }

    async fn ensure_migrations_table(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL UNIQUE,
                applied_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_migration_applied(&self, name: &str) -> Result<bool, StorageError> {
        let result: Option<(i64,)> = sqlx::query_as("SELECT id FROM _migrations WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(result.is_some())
    }

    async fn apply_migration(&self, name: &str, sql: &str) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Migration(format!("{}: {}", name, e)))?;

        sqlx::query("INSERT INTO _migrations (name, applied_at) VALUES (?, ?)")
            .bind(name)
            .bind(super::database::format_timestamp(Utc::now()))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Migrations applied so far, oldest first.
    pub async fn list_applied_migrations(&self) -> Result<Vec<AppliedMigration>, StorageError> {
        self.ensure_migrations_table().await?;

        let rows = sqlx::query("SELECT name, applied_at FROM _migrations ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(AppliedMigration {
                    name: row.get("name"),
                    applied_at: super::database::parse_timestamp(row.get("applied_at"))?,
                })
            })
            .collect()
    }

    /// Migrations not yet applied.
    pub async fn pending_migrations(&self) -> Result<Vec<&'static str>, StorageError> {
        let applied: Vec<String> = self
            .list_applied_migrations()
            .await?
            .into_iter()
            .map(|m| m.name)
            .collect();

        Ok(schema::all_migrations()
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| !applied.iter().any(|a| a == name))
            .collect())
    }

    /// Drops every table, data included.
    pub async fn reset_database(&self) -> Result<(), StorageError> {
        for table in schema::ALL_TABLES {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Migration(format!("Drop {} failed: {}", table, e)))?;
        }

        tracing::warn!("Database reset: all tables dropped");
        Ok(())
    }
}

/// Record of an applied migration.
#[derive(Debug, Clone)]
pub struct AppliedMigration {
    pub name: String,
    pub applied_at: DateTime<Utc>,
}
