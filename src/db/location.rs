use chrono::Utc;
use sqlx::Row;
use tracing::{debug, instrument};

use super::core::Database;
use crate::TARGET_DB;

/// Where a summary landed at an external document provider. Best-effort
/// rows: absence means replication has not (yet) succeeded, nothing more.
#[derive(Debug, Clone)]
pub struct StorageLocationRecord {
    pub id: i64,
    pub summary_id: i64,
    pub provider: String,
    pub external_id: String,
    pub external_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
}

fn location_from_row(row: &sqlx::sqlite::SqliteRow) -> StorageLocationRecord {
    let metadata: Option<String> = row.get("metadata");
    StorageLocationRecord {
        id: row.get("id"),
        summary_id: row.get("summary_id"),
        provider: row.get("provider"),
        external_id: row.get("external_id"),
        external_url: row.get("external_url"),
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        created_at: row.get("created_at"),
    }
}

impl Database {
    /// Records a replication target, one row per (summary, provider).
    /// Re-replicating to a provider that already holds the summary keeps the
    /// original row.
    #[instrument(target = "db_query", level = "info", skip(self, external_id, external_url, metadata))]
    pub async fn insert_location(
        &self,
        summary_id: i64,
        provider: &str,
        external_id: &str,
        external_url: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<StorageLocationRecord, sqlx::Error> {
        let created_at = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO storage_locations (summary_id, provider, external_id, external_url, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(summary_id, provider) DO NOTHING
            "#,
        )
        .bind(summary_id)
        .bind(provider)
        .bind(external_id)
        .bind(external_url)
        .bind(metadata.map(|m| m.to_string()))
        .bind(&created_at)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            debug!(target: TARGET_DB, "Summary {} already replicated to {}", summary_id, provider);
        }

        let row =
            sqlx::query("SELECT * FROM storage_locations WHERE summary_id = ?1 AND provider = ?2")
                .bind(summary_id)
                .bind(provider)
                .fetch_one(self.pool())
                .await?;
        Ok(location_from_row(&row))
    }

    pub async fn locations_for_summary(
        &self,
        summary_id: i64,
    ) -> Result<Vec<StorageLocationRecord>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM storage_locations WHERE summary_id = ?1 ORDER BY provider",
        )
        .bind(summary_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.iter().map(location_from_row).collect())
    }
}
