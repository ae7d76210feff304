use chrono::Utc;
use sqlx::Row;
use tracing::{debug, info, instrument};

use super::core::Database;
use crate::TARGET_DB;

/// The three kinds of origin a source can poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    VideoChannel,
    Feed,
    Mailbox,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::VideoChannel => "video-channel",
            SourceKind::Feed => "feed",
            SourceKind::Mailbox => "mailbox",
        }
    }

    /// The kind recorded on content items ingested from this source.
    pub fn item_kind(&self) -> &'static str {
        match self {
            SourceKind::VideoChannel => "video",
            SourceKind::Feed => "article",
            SourceKind::Mailbox => "newsletter-message",
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video-channel" => Ok(SourceKind::VideoChannel),
            "feed" => Ok(SourceKind::Feed),
            "mailbox" => Ok(SourceKind::Mailbox),
            other => Err(format!("unknown source kind: {}", other)),
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ContentSource {
    pub id: i64,
    pub owner: String,
    pub kind: SourceKind,
    pub origin: String,
    pub metadata: Option<serde_json::Value>,
    pub last_checked: Option<String>,
    pub active: bool,
}

fn source_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ContentSource, sqlx::Error> {
    let kind_str: String = row.get("kind");
    let kind = kind_str
        .parse::<SourceKind>()
        .map_err(|e| sqlx::Error::Decode(e.into()))?;
    let metadata: Option<String> = row.get("metadata");

    Ok(ContentSource {
        id: row.get("id"),
        owner: row.get("owner"),
        kind,
        origin: row.get("origin"),
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        last_checked: row.get("last_checked"),
        active: row.get("active"),
    })
}

impl Database {
    #[instrument(target = "db_query", level = "info", skip(self, metadata))]
    pub async fn add_source(
        &self,
        owner: &str,
        kind: SourceKind,
        origin: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO content_sources (owner, kind, origin, metadata, active)
            VALUES (?1, ?2, ?3, ?4, TRUE)
            "#,
        )
        .bind(owner)
        .bind(kind.as_str())
        .bind(origin)
        .bind(metadata.map(|m| m.to_string()))
        .execute(self.pool())
        .await?;

        let id = result.last_insert_rowid();
        info!(target: TARGET_DB, "Registered {} source {} for {}", kind, id, owner);
        Ok(id)
    }

    pub async fn get_source(&self, id: i64) -> Result<Option<ContentSource>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM content_sources WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        row.as_ref().map(source_from_row).transpose()
    }

    #[instrument(target = "db_query", level = "info", skip(self))]
    pub async fn list_active_sources(&self) -> Result<Vec<ContentSource>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM content_sources WHERE active = TRUE ORDER BY id")
            .fetch_all(self.pool())
            .await?;

        let sources = rows
            .iter()
            .map(source_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(target: TARGET_DB, "Loaded {} active sources", sources.len());
        Ok(sources)
    }

    /// Advances the source checkpoint to now. Called once per monitoring
    /// cycle after all of the source's candidates have been processed.
    #[instrument(target = "db_query", level = "info", skip(self))]
    pub async fn touch_last_checked(&self, source_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE content_sources SET last_checked = ?1 WHERE id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(source_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Deactivation is a flag flip; sources are never hard-deleted by the
    /// ingestion path.
    #[instrument(target = "db_query", level = "info", skip(self))]
    pub async fn deactivate_source(&self, source_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE content_sources SET active = FALSE WHERE id = ?1")
            .bind(source_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
