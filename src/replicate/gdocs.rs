//! Google Docs document store: one document per replicated summary.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{DocumentStore, StoredDocument};
use crate::db::{ContentItem, SummaryRecord};
use crate::error::TributaryError;
use crate::TARGET_WEB_REQUEST;

const DOCS_API: &str = "https://docs.googleapis.com/v1/documents";

pub struct GoogleDocsStore {
    http: reqwest::Client,
    access_token: String,
}

impl GoogleDocsStore {
    pub fn new(http: reqwest::Client, access_token: String) -> Self {
        Self { http, access_token }
    }

    fn document_text(summary: &SummaryRecord) -> String {
        let mut text = summary.summary.clone();
        if !summary.key_points.is_empty() {
            text.push_str("\n\nKey points:\n");
            for point in &summary.key_points {
                text.push_str("- ");
                text.push_str(point);
                text.push('\n');
            }
        }
        if !summary.topics.is_empty() {
            text.push_str("\nTopics: ");
            text.push_str(&summary.topics.join(", "));
            text.push('\n');
        }
        text
    }
}

#[async_trait]
impl DocumentStore for GoogleDocsStore {
    fn name(&self) -> &str {
        "google-docs"
    }

    async fn store(
        &self,
        item: &ContentItem,
        summary: &SummaryRecord,
    ) -> Result<StoredDocument, TributaryError> {
        debug!(target: TARGET_WEB_REQUEST, "Creating Google Doc for summary {}", summary.id);

        // Create the (empty, titled) document first.
        let response = self
            .http
            .post(DOCS_API)
            .bearer_auth(&self.access_token)
            .json(&json!({ "title": item.title }))
            .send()
            .await
            .map_err(|e| TributaryError::Other(anyhow::anyhow!("docs create failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(TributaryError::Other(anyhow::anyhow!(
                "docs create returned status {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TributaryError::Other(e.into()))?;
        let document_id = body
            .get("documentId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                TributaryError::Other(anyhow::anyhow!("docs response missing documentId"))
            })?
            .to_string();

        // Then write the summary body in a single batch update.
        let update = self
            .http
            .post(format!("{}/{}:batchUpdate", DOCS_API, document_id))
            .bearer_auth(&self.access_token)
            .json(&json!({
                "requests": [{
                    "insertText": {
                        "location": { "index": 1 },
                        "text": Self::document_text(summary),
                    }
                }]
            }))
            .send()
            .await
            .map_err(|e| TributaryError::Other(anyhow::anyhow!("docs update failed: {}", e)))?;

        if !update.status().is_success() {
            return Err(TributaryError::Other(anyhow::anyhow!(
                "docs update returned status {}",
                update.status()
            )));
        }

        Ok(StoredDocument {
            external_url: Some(format!(
                "https://docs.google.com/document/d/{}/edit",
                document_id
            )),
            external_id: document_id,
            metadata: None,
        })
    }
}
