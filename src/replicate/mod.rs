//! Storage fan-out: best-effort replication of a persisted summary to zero
//! or more external document providers.

mod gdocs;
mod notion;

pub use self::gdocs::GoogleDocsStore;
pub use self::notion::NotionStore;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{ContentItem, Database, StorageLocationRecord, SummaryRecord};
use crate::error::TributaryError;
use crate::TARGET_WEB_REQUEST;

/// A document created at an external provider.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub external_id: String,
    pub external_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// A document-store capability. Failures are provider-scoped; the pipeline
/// never retries or unwinds on a store error.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn name(&self) -> &str;

    async fn store(
        &self,
        item: &ContentItem,
        summary: &SummaryRecord,
    ) -> Result<StoredDocument, TributaryError>;
}

#[derive(Debug)]
pub struct ProviderResult {
    pub provider: String,
    pub outcome: Result<StorageLocationRecord, String>,
}

/// Aggregate result of one fan-out call. The call counts as a success when
/// at least one provider accepted the document; the summary itself is
/// durable either way.
#[derive(Debug, Default)]
pub struct ReplicationReport {
    pub results: Vec<ProviderResult>,
}

impl ReplicationReport {
    pub fn succeeded(&self) -> bool {
        self.results.iter().any(|r| r.outcome.is_ok())
    }

    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_err()).count()
    }
}

/// Fans a persisted summary out to the given providers, independently. Each
/// provider's outcome is recorded; one failure never aborts the rest.
pub async fn replicate_summary(
    db: &Database,
    stores: &[Arc<dyn DocumentStore>],
    summary_id: i64,
) -> Result<ReplicationReport, TributaryError> {
    let summary = db
        .get_summary(summary_id)
        .await?
        .ok_or(TributaryError::SummaryNotFound(summary_id))?;
    let item = db
        .get_item(summary.content_item_id)
        .await?
        .ok_or(TributaryError::ItemNotFound(summary.content_item_id))?;

    let mut report = ReplicationReport::default();
    for store in stores {
        let provider = store.name().to_string();
        let outcome = match store.store(&item, &summary).await {
            Ok(document) => {
                let location = db
                    .insert_location(
                        summary_id,
                        &provider,
                        &document.external_id,
                        document.external_url.as_deref(),
                        document.metadata.as_ref(),
                    )
                    .await?;
                info!(target: TARGET_WEB_REQUEST, "Replicated summary {} to {}", summary_id, provider);
                Ok(location)
            }
            Err(err) => {
                warn!(target: TARGET_WEB_REQUEST, "Replication of summary {} to {} failed: {}", summary_id, provider, err);
                Err(err.to_string())
            }
        };
        report.results.push(ProviderResult { provider, outcome });
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewContentItem, NewSummary, Sentiment, SourceKind};

    struct StubStore {
        name: String,
        fail: bool,
    }

    impl StubStore {
        fn ok(name: &str) -> Arc<dyn DocumentStore> {
            Arc::new(Self {
                name: name.to_string(),
                fail: false,
            })
        }

        fn broken(name: &str) -> Arc<dyn DocumentStore> {
            Arc::new(Self {
                name: name.to_string(),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl DocumentStore for StubStore {
        fn name(&self) -> &str {
            &self.name
        }

        async fn store(
            &self,
            _item: &ContentItem,
            summary: &SummaryRecord,
        ) -> Result<StoredDocument, TributaryError> {
            if self.fail {
                return Err(TributaryError::Other(anyhow::anyhow!(
                    "provider misconfigured"
                )));
            }
            Ok(StoredDocument {
                external_id: format!("{}-{}", self.name, summary.id),
                external_url: Some(format!("https://{}.example/{}", self.name, summary.id)),
                metadata: None,
            })
        }
    }

    async fn db_with_summary() -> (Database, i64) {
        let db = Database::new_in_memory().await.unwrap();
        let source_id = db
            .add_source("user-1", SourceKind::Feed, "https://example.com/feed", None)
            .await
            .unwrap();
        let item_id = db
            .insert_item(&NewContentItem {
                source_id,
                kind: "article".to_string(),
                title: "Title".to_string(),
                locator: "loc-1".to_string(),
                raw_text: Some("body".to_string()),
                metadata: None,
                published_at: None,
            })
            .await
            .unwrap()
            .unwrap();
        let summary = db
            .insert_summary(&NewSummary {
                content_item_id: item_id,
                owner: "user-1".to_string(),
                summary: "s".to_string(),
                key_points: vec![],
                topics: vec![],
                sentiment: Sentiment::Neutral,
                confidence: 70,
                model: "stub".to_string(),
            })
            .await
            .unwrap();
        (db, summary.id)
    }

    #[tokio::test]
    async fn partial_failure_is_still_aggregate_success() {
        let (db, summary_id) = db_with_summary().await;
        let stores = vec![
            StubStore::ok("notion"),
            StubStore::broken("google-docs"),
            StubStore::ok("webhook"),
        ];

        let report = replicate_summary(&db, &stores, summary_id).await.unwrap();
        assert_eq!(report.results.len(), 3);
        assert!(report.succeeded());
        assert_eq!(report.failures(), 1);
        assert!(report.results[1].outcome.is_err());

        // Only successful providers leave a location row behind.
        let locations = db.locations_for_summary(summary_id).await.unwrap();
        let providers: Vec<_> = locations.iter().map(|l| l.provider.as_str()).collect();
        assert_eq!(providers, vec!["notion", "webhook"]);
    }

    #[tokio::test]
    async fn all_providers_failing_is_an_aggregate_failure() {
        let (db, summary_id) = db_with_summary().await;
        let stores = vec![StubStore::broken("notion"), StubStore::broken("google-docs")];

        let report = replicate_summary(&db, &stores, summary_id).await.unwrap();
        assert!(!report.succeeded());
        assert_eq!(report.failures(), 2);

        // The summary itself is untouched.
        assert!(db.get_summary(summary_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn re_replication_keeps_the_original_row() {
        let (db, summary_id) = db_with_summary().await;
        let stores = vec![StubStore::ok("notion")];

        let first = replicate_summary(&db, &stores, summary_id).await.unwrap();
        let second = replicate_summary(&db, &stores, summary_id).await.unwrap();

        let first_id = first.results[0].outcome.as_ref().unwrap().id;
        let second_id = second.results[0].outcome.as_ref().unwrap().id;
        assert_eq!(first_id, second_id);
        assert_eq!(db.locations_for_summary(summary_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_summary_is_reported() {
        let db = Database::new_in_memory().await.unwrap();
        let err = replicate_summary(&db, &[], 99).await.unwrap_err();
        assert!(matches!(err, TributaryError::SummaryNotFound(99)));
    }
}
