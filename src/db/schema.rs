use tracing::info;

use super::core::Database;
use crate::TARGET_DB;

impl Database {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS content_sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                kind TEXT NOT NULL, -- video-channel, feed, mailbox
                origin TEXT NOT NULL,
                metadata TEXT,
                last_checked TEXT,
                active BOOLEAN NOT NULL DEFAULT TRUE
            );
            CREATE INDEX IF NOT EXISTS idx_sources_active ON content_sources (active);
            CREATE INDEX IF NOT EXISTS idx_sources_owner ON content_sources (owner);

            CREATE TABLE IF NOT EXISTS content_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL,
                kind TEXT NOT NULL, -- video, article, newsletter-message
                title TEXT NOT NULL,
                locator TEXT NOT NULL,
                raw_text TEXT,
                metadata TEXT,
                published_at TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (source_id) REFERENCES content_sources (id) ON DELETE CASCADE,
                UNIQUE (source_id, locator)
            );
            CREATE INDEX IF NOT EXISTS idx_items_source_id ON content_items (source_id);
            CREATE INDEX IF NOT EXISTS idx_items_published_at ON content_items (published_at);

            CREATE TABLE IF NOT EXISTS summaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content_item_id INTEGER NOT NULL UNIQUE,
                owner TEXT NOT NULL,
                summary TEXT NOT NULL,
                key_points TEXT NOT NULL, -- JSON array
                topics TEXT NOT NULL, -- JSON array
                sentiment TEXT NOT NULL, -- positive, negative, neutral
                confidence INTEGER NOT NULL,
                model TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (content_item_id) REFERENCES content_items (id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_summaries_owner ON summaries (owner);

            CREATE TABLE IF NOT EXISTS storage_locations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                summary_id INTEGER NOT NULL,
                provider TEXT NOT NULL,
                external_id TEXT NOT NULL,
                external_url TEXT,
                metadata TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (summary_id) REFERENCES summaries (id) ON DELETE CASCADE,
                UNIQUE (summary_id, provider)
            );
            CREATE INDEX IF NOT EXISTS idx_locations_summary_id ON storage_locations (summary_id);
            "#,
        )
        .execute(&mut *conn)
        .await?;
        info!(target: TARGET_DB, "Tables ensured to exist");

        Ok(())
    }
}
