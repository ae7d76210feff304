use chrono::Utc;
use sqlx::Row;
use tracing::{debug, error, instrument};

use super::core::Database;
use crate::TARGET_DB;

/// A candidate item ready for insertion, keyed by (source_id, locator).
#[derive(Debug, Clone)]
pub struct NewContentItem {
    pub source_id: i64,
    pub kind: String,
    pub title: String,
    pub locator: String,
    pub raw_text: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ContentItem {
    pub id: i64,
    pub source_id: i64,
    pub kind: String,
    pub title: String,
    pub locator: String,
    pub raw_text: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub published_at: Option<String>,
    pub created_at: String,
}

fn item_from_row(row: &sqlx::sqlite::SqliteRow) -> ContentItem {
    let metadata: Option<String> = row.get("metadata");
    ContentItem {
        id: row.get("id"),
        source_id: row.get("source_id"),
        kind: row.get("kind"),
        title: row.get("title"),
        locator: row.get("locator"),
        raw_text: row.get("raw_text"),
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
    }
}

impl Database {
    /// The fingerprint check: has this (source, locator) pair been ingested
    /// before. Always hits the store directly; per-poll volume is small
    /// enough that a cache would buy nothing.
    pub async fn item_exists(&self, source_id: i64, locator: &str) -> Result<bool, sqlx::Error> {
        let exists = sqlx::query("SELECT 1 FROM content_items WHERE source_id = ?1 AND locator = ?2")
            .bind(source_id)
            .bind(locator)
            .fetch_optional(self.pool())
            .await?
            .is_some();
        Ok(exists)
    }

    /// Inserts a content item, returning its id, or `None` when an item with
    /// the same (source_id, locator) fingerprint already exists. The unique
    /// constraint is the safety net: a conflicting insert is a normal skip,
    /// never an error.
    #[instrument(target = "db_query", level = "info", skip(self, item))]
    pub async fn insert_item(&self, item: &NewContentItem) -> Result<Option<i64>, sqlx::Error> {
        if item.locator.trim().is_empty() {
            error!(target: TARGET_DB, "Attempted to insert an item with an empty locator");
            return Err(sqlx::Error::Protocol("Empty locator provided".into()));
        }

        let created_at = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO content_items (source_id, kind, title, locator, raw_text, metadata, published_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(source_id, locator) DO NOTHING
            "#,
        )
        .bind(item.source_id)
        .bind(&item.kind)
        .bind(&item.title)
        .bind(&item.locator)
        .bind(&item.raw_text)
        .bind(item.metadata.as_ref().map(|m| m.to_string()))
        .bind(&item.published_at)
        .bind(&created_at)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            debug!(target: TARGET_DB, "Item already ingested, skipping: {}", item.locator);
            Ok(None)
        } else {
            debug!(target: TARGET_DB, "Ingested item: {}", item.locator);
            Ok(Some(result.last_insert_rowid()))
        }
    }

    pub async fn get_item(&self, id: i64) -> Result<Option<ContentItem>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM content_items WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.as_ref().map(item_from_row))
    }

    /// Backfills raw text resolved lazily after ingestion, e.g. a video
    /// transcript fetched on demand. The only mutation content items see.
    #[instrument(target = "db_query", level = "info", skip(self, text))]
    pub async fn set_item_text(&self, id: i64, text: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE content_items SET raw_text = ?1 WHERE id = ?2")
            .bind(text)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
