//! Notion document store: one page per replicated summary.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{DocumentStore, StoredDocument};
use crate::db::{ContentItem, SummaryRecord};
use crate::error::TributaryError;
use crate::TARGET_WEB_REQUEST;

const NOTION_API: &str = "https://api.notion.com/v1/pages";
const NOTION_VERSION: &str = "2022-06-28";

pub struct NotionStore {
    http: reqwest::Client,
    api_key: String,
    parent_page_id: String,
}

impl NotionStore {
    pub fn new(http: reqwest::Client, api_key: String, parent_page_id: String) -> Self {
        Self {
            http,
            api_key,
            parent_page_id,
        }
    }

    fn page_body(&self, item: &ContentItem, summary: &SummaryRecord) -> serde_json::Value {
        let mut children = vec![json!({
            "object": "block",
            "type": "paragraph",
            "paragraph": {
                "rich_text": [{ "type": "text", "text": { "content": summary.summary } }]
            }
        })];
        for point in &summary.key_points {
            children.push(json!({
                "object": "block",
                "type": "bulleted_list_item",
                "bulleted_list_item": {
                    "rich_text": [{ "type": "text", "text": { "content": point } }]
                }
            }));
        }

        json!({
            "parent": { "page_id": self.parent_page_id },
            "properties": {
                "title": {
                    "title": [{ "type": "text", "text": { "content": item.title } }]
                }
            },
            "children": children,
        })
    }
}

#[async_trait]
impl DocumentStore for NotionStore {
    fn name(&self) -> &str {
        "notion"
    }

    async fn store(
        &self,
        item: &ContentItem,
        summary: &SummaryRecord,
    ) -> Result<StoredDocument, TributaryError> {
        debug!(target: TARGET_WEB_REQUEST, "Creating Notion page for summary {}", summary.id);

        let response = self
            .http
            .post(NOTION_API)
            .bearer_auth(&self.api_key)
            .header("Notion-Version", NOTION_VERSION)
            .json(&self.page_body(item, summary))
            .send()
            .await
            .map_err(|e| TributaryError::Other(anyhow::anyhow!("notion request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(TributaryError::Other(anyhow::anyhow!(
                "notion returned status {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TributaryError::Other(e.into()))?;
        let page_id = body
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TributaryError::Other(anyhow::anyhow!("notion response missing page id")))?
            .to_string();
        let url = body.get("url").and_then(|v| v.as_str()).map(str::to_string);

        Ok(StoredDocument {
            external_id: page_id,
            external_url: url,
            metadata: Some(json!({ "parent_page_id": self.parent_page_id })),
        })
    }
}
