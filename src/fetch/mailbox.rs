//! Mailbox fetcher: lists recent newsletter messages through an injected
//! mail provider capability.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::util::{parse_date, strip_html};
use super::{Candidate, SourceFetcher};
use crate::db::ContentSource;
use crate::error::FetchError;
use crate::TARGET_WEB_REQUEST;

#[derive(Debug, Clone)]
pub struct MailMessage {
    pub subject: String,
    pub sender: Option<String>,
    pub date: Option<String>,
    pub body: String,
}

/// The mail provider capability. Listing and per-message detail are separate
/// calls so a single unreadable message can be skipped without failing the
/// whole mailbox.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Message ids received since the given RFC3339 checkpoint, newest first.
    async fn list_message_ids(&self, since: Option<&str>) -> Result<Vec<String>, FetchError>;

    async fn get_message(&self, id: &str) -> Result<MailMessage, FetchError>;
}

pub struct MailboxFetcher {
    provider: Arc<dyn MailProvider>,
}

impl MailboxFetcher {
    pub fn new(provider: Arc<dyn MailProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl SourceFetcher for MailboxFetcher {
    async fn fetch(&self, source: &ContentSource) -> Result<Vec<Candidate>, FetchError> {
        let ids = self
            .provider
            .list_message_ids(source.last_checked.as_deref())
            .await?;
        debug!(target: TARGET_WEB_REQUEST, "Mailbox listing returned {} messages for source {}", ids.len(), source.id);

        let mut candidates = Vec::with_capacity(ids.len());
        for id in ids {
            // A detail-fetch failure skips this message only.
            let message = match self.provider.get_message(&id).await {
                Ok(message) => message,
                Err(err) => {
                    warn!(target: TARGET_WEB_REQUEST, "Skipping unreadable message {}: {}", id, err);
                    continue;
                }
            };

            let metadata = serde_json::json!({
                "sender": message.sender,
            });
            candidates.push(Candidate {
                locator: id,
                title: message.subject,
                raw_text: Some(strip_html(&message.body)),
                published_at: message.date,
                metadata: Some(metadata),
            });
        }
        Ok(candidates)
    }
}

// ---------------------------------------------------------------------------
// Gmail REST provider
// ---------------------------------------------------------------------------

const GMAIL_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<ListedMessage>,
}

#[derive(Deserialize)]
struct ListedMessage {
    id: String,
}

#[derive(Deserialize)]
struct MessageResponse {
    #[serde(default)]
    snippet: String,
    payload: Option<MessagePayload>,
}

#[derive(Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<MessageHeader>,
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    body: Option<MessageBody>,
    #[serde(default)]
    parts: Vec<MessagePayload>,
}

#[derive(Deserialize)]
struct MessageHeader {
    name: String,
    value: String,
}

#[derive(Deserialize)]
struct MessageBody {
    data: Option<String>,
}

pub struct GmailProvider {
    http: reqwest::Client,
    access_token: String,
    /// Gmail search expression scoping the mailbox, e.g. `label:newsletters`.
    query: String,
}

impl GmailProvider {
    pub fn new(http: reqwest::Client, access_token: String, query: String) -> Self {
        Self {
            http,
            access_token,
            query,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| FetchError::Mail(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Mail(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::Mail(e.to_string()))
    }

    fn header<'a>(payload: &'a MessagePayload, name: &str) -> Option<&'a str> {
        payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Walks the MIME tree for the first text part, preferring text/plain.
    fn body_text(payload: &MessagePayload) -> Option<String> {
        for mime in ["text/plain", "text/html"] {
            if let Some(text) = Self::find_part(payload, mime) {
                return Some(text);
            }
        }
        None
    }

    fn find_part(payload: &MessagePayload, mime: &str) -> Option<String> {
        if payload.mime_type == mime {
            if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_deref()) {
                // Gmail emits unpadded base64url.
                if let Ok(bytes) = URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')) {
                    return Some(String::from_utf8_lossy(&bytes).into_owned());
                }
            }
        }
        payload.parts.iter().find_map(|p| Self::find_part(p, mime))
    }
}

#[async_trait]
impl MailProvider for GmailProvider {
    async fn list_message_ids(&self, since: Option<&str>) -> Result<Vec<String>, FetchError> {
        // Gmail's `after:` operator takes epoch seconds.
        let mut query = self.query.clone();
        if let Some(checkpoint) = since.and_then(parse_date) {
            query = format!("{} after:{}", query, checkpoint.timestamp()).trim().to_string();
        }

        let url = format!("{}/messages", GMAIL_BASE);
        let response: ListResponse = self
            .get_json(&url, &[("q", query.as_str()), ("maxResults", "50")])
            .await?;
        Ok(response.messages.into_iter().map(|m| m.id).collect())
    }

    async fn get_message(&self, id: &str) -> Result<MailMessage, FetchError> {
        let url = format!("{}/messages/{}", GMAIL_BASE, id);
        let response: MessageResponse = self.get_json(&url, &[("format", "full")]).await?;

        let payload = response
            .payload
            .ok_or_else(|| FetchError::Mail(format!("message {} has no payload", id)))?;

        let date = Self::header(&payload, "Date")
            .and_then(parse_date)
            .map(|d| d.to_rfc3339());

        Ok(MailMessage {
            subject: Self::header(&payload, "Subject")
                .unwrap_or("(no subject)")
                .to_string(),
            sender: Self::header(&payload, "From").map(str::to_string),
            date,
            body: Self::body_text(&payload).unwrap_or(response.snippet),
        })
    }
}
