use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use tracing::{debug, instrument};

use super::core::Database;
use crate::TARGET_DB;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

impl std::str::FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "negative" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            other => Err(format!("unknown sentiment: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewSummary {
    pub content_item_id: i64,
    pub owner: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub topics: Vec<String>,
    pub sentiment: Sentiment,
    pub confidence: u8,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct SummaryRecord {
    pub id: i64,
    pub content_item_id: i64,
    pub owner: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub topics: Vec<String>,
    pub sentiment: Sentiment,
    pub confidence: u8,
    pub model: String,
    pub created_at: String,
}

fn summary_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SummaryRecord, sqlx::Error> {
    let key_points: String = row.get("key_points");
    let topics: String = row.get("topics");
    let sentiment: String = row.get("sentiment");
    let confidence: i64 = row.get("confidence");

    Ok(SummaryRecord {
        id: row.get("id"),
        content_item_id: row.get("content_item_id"),
        owner: row.get("owner"),
        summary: row.get("summary"),
        key_points: serde_json::from_str(&key_points).unwrap_or_default(),
        topics: serde_json::from_str(&topics).unwrap_or_default(),
        sentiment: sentiment
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
        confidence: confidence.clamp(0, 100) as u8,
        model: row.get("model"),
        created_at: row.get("created_at"),
    })
}

impl Database {
    /// Persists a summary, honoring the at-most-one-summary-per-item policy.
    /// When a concurrent or earlier call already inserted a summary for the
    /// same content item, the existing row is returned instead; the losing
    /// insert is not an error.
    #[instrument(target = "db_query", level = "info", skip(self, new))]
    pub async fn insert_summary(&self, new: &NewSummary) -> Result<SummaryRecord, sqlx::Error> {
        let key_points = serde_json::to_string(&new.key_points).unwrap_or_else(|_| "[]".into());
        let topics = serde_json::to_string(&new.topics).unwrap_or_else(|_| "[]".into());
        let created_at = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO summaries (content_item_id, owner, summary, key_points, topics, sentiment, confidence, model, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(content_item_id) DO NOTHING
            "#,
        )
        .bind(new.content_item_id)
        .bind(&new.owner)
        .bind(&new.summary)
        .bind(&key_points)
        .bind(&topics)
        .bind(new.sentiment.as_str())
        .bind(new.confidence.min(100) as i64)
        .bind(&new.model)
        .bind(&created_at)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            debug!(target: TARGET_DB, "Item {} already summarized, returning existing row", new.content_item_id);
        }

        // Either the row just written or the one that won the race.
        let row = sqlx::query("SELECT * FROM summaries WHERE content_item_id = ?1")
            .bind(new.content_item_id)
            .fetch_one(self.pool())
            .await?;
        summary_from_row(&row)
    }

    pub async fn get_summary(&self, id: i64) -> Result<Option<SummaryRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM summaries WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(summary_from_row).transpose()
    }

    pub async fn get_summary_for_item(
        &self,
        content_item_id: i64,
    ) -> Result<Option<SummaryRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM summaries WHERE content_item_id = ?1")
            .bind(content_item_id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(summary_from_row).transpose()
    }
}
