//! Source fetchers: one adapter per origin kind, each producing a finite
//! snapshot of recent candidate items for the ingestion pipeline.

mod feed;
mod mailbox;
mod util;
mod video;

pub use self::feed::FeedFetcher;
pub use self::mailbox::{GmailProvider, MailMessage, MailProvider, MailboxFetcher};
pub use self::util::{is_valid_url, parse_date, strip_html};
pub use self::video::{extract_channel_id, parse_iso8601_duration, ChannelRef, VideoFetcher};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{ContentSource, SourceKind};
use crate::error::FetchError;

/// A raw item produced by a fetcher, before the fingerprint check.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The stable identity string within the source: a normalized URL, a
    /// video id, or a mail message id. Dedup key together with the source id.
    pub locator: String,
    pub title: String,
    pub raw_text: Option<String>,
    pub published_at: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// One fetch call is one snapshot of "recent" items from the origin, not a
/// backfill. A fetcher either returns the whole snapshot or a single
/// fetch-level error; the pipeline then treats the source as failed for this
/// cycle without touching other sources.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &ContentSource) -> Result<Vec<Candidate>, FetchError>;
}

/// The registry of fetch capabilities, keyed by source kind. Built once at
/// startup from configuration and injected into the pipeline.
#[derive(Clone, Default)]
pub struct Fetchers {
    adapters: HashMap<SourceKind, Arc<dyn SourceFetcher>>,
}

impl Fetchers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: SourceKind, fetcher: Arc<dyn SourceFetcher>) {
        self.adapters.insert(kind, fetcher);
    }

    pub fn get(&self, kind: SourceKind) -> Option<&Arc<dyn SourceFetcher>> {
        self.adapters.get(&kind)
    }
}
