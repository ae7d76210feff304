//! RSS/Atom feed fetcher.

use async_trait::async_trait;
use feed_rs::model::Entry;
use feed_rs::parser;
use std::io::Cursor;
use tracing::{debug, warn};
use url::Url;
use urlnorm::UrlNormalizer;

use super::util::{is_valid_url, strip_html};
use super::{Candidate, SourceFetcher};
use crate::db::ContentSource;
use crate::error::FetchError;
use crate::TARGET_WEB_REQUEST;

pub struct FeedFetcher {
    http: reqwest::Client,
}

impl FeedFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn feed_url(source: &ContentSource) -> String {
        // A kind-specific override takes precedence over the origin locator.
        source
            .metadata
            .as_ref()
            .and_then(|m| m.get("feed_url"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| source.origin.clone())
    }
}

/// Resolves an entry's text by checking content fields in a fixed preference
/// order; the first non-empty candidate wins. All variants are reduced to
/// visible text.
fn entry_text(entry: &Entry) -> Option<String> {
    let candidates: [Option<&str>; 3] = [
        entry.content.as_ref().and_then(|c| c.body.as_deref()),
        entry.summary.as_ref().map(|s| s.content.as_str()),
        entry
            .media
            .first()
            .and_then(|m| m.description.as_ref())
            .map(|d| d.content.as_str()),
    ];

    candidates.into_iter().flatten().find_map(|raw| {
        let text = strip_html(raw);
        (!text.is_empty()).then_some(text)
    })
}

fn entry_to_candidate(entry: &Entry) -> Option<Candidate> {
    let link = entry.links.first().map(|l| l.href.clone());

    // Canonical locator: the normalized entry URL so tracking-parameter
    // variants of the same article dedup to one item. Entries without a link
    // fall back to the feed-assigned id.
    let locator = match &link {
        Some(href) => match Url::parse(href) {
            Ok(parsed) => UrlNormalizer::default().compute_normalization_string(&parsed),
            Err(_) => href.clone(),
        },
        None if !entry.id.is_empty() => entry.id.clone(),
        None => return None,
    };

    let metadata = serde_json::json!({
        "url": link,
        "author": entry.authors.first().map(|a| a.name.clone()),
        "tags": entry.categories.iter().map(|c| c.term.clone()).collect::<Vec<_>>(),
    });

    Some(Candidate {
        locator,
        title: entry
            .title
            .as_ref()
            .map(|t| t.content.clone())
            .unwrap_or_else(|| "(untitled)".to_string()),
        raw_text: entry_text(entry),
        published_at: entry
            .published
            .or(entry.updated)
            .map(|d| d.to_rfc3339()),
        metadata: Some(metadata),
    })
}

#[async_trait]
impl SourceFetcher for FeedFetcher {
    async fn fetch(&self, source: &ContentSource) -> Result<Vec<Candidate>, FetchError> {
        let url = Self::feed_url(source);
        if !is_valid_url(&url) {
            return Err(FetchError::Request {
                url,
                reason: "not an http(s) URL".to_string(),
            });
        }

        debug!(target: TARGET_WEB_REQUEST, "Loading feed from {}", url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            warn!(target: TARGET_WEB_REQUEST, "Non-success status {} from {}", response.status(), url);
            return Err(FetchError::Request {
                url,
                reason: format!("status {}", response.status()),
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Request {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let feed = parser::parse(Cursor::new(&body)).map_err(|e| FetchError::Parse {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        debug!(target: TARGET_WEB_REQUEST, "Parsed feed from {} with {} entries", url, feed.entries.len());
        Ok(feed.entries.iter().filter_map(entry_to_candidate).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED_WITH_ENCODED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Example</title>
    <item>
      <title>Full content wins</title>
      <link>https://example.com/a?utm_source=feed</link>
      <description>short description</description>
      <content:encoded><![CDATA[<p>The &amp; full body</p>]]></content:encoded>
      <pubDate>Tue, 11 Mar 2025 09:00:00 +0000</pubDate>
    </item>
    <item>
      <title>Description fallback</title>
      <link>https://example.com/b</link>
      <description><![CDATA[<em>only a description</em>]]></description>
    </item>
  </channel>
</rss>"#;

    fn parse_entries(xml: &str) -> Vec<feed_rs::model::Entry> {
        parser::parse(Cursor::new(xml)).expect("feed parses").entries
    }

    #[test]
    fn full_content_preferred_over_description() {
        let entries = parse_entries(FEED_WITH_ENCODED);
        assert_eq!(entry_text(&entries[0]).unwrap(), "The & full body");
    }

    #[test]
    fn description_used_when_no_full_content() {
        let entries = parse_entries(FEED_WITH_ENCODED);
        assert_eq!(entry_text(&entries[1]).unwrap(), "only a description");
    }

    #[test]
    fn candidates_carry_locator_title_and_date() {
        let entries = parse_entries(FEED_WITH_ENCODED);
        let candidate = entry_to_candidate(&entries[0]).unwrap();
        assert!(!candidate.locator.is_empty());
        assert_eq!(candidate.title, "Full content wins");
        assert!(candidate.published_at.is_some());
    }

    #[test]
    fn linkless_entry_falls_back_to_guid() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example</title>
    <item>
      <title>No link</title>
      <guid isPermaLink="false">tag:example.com,2025:item-9</guid>
      <description>body</description>
    </item>
  </channel>
</rss>"#;
        let candidate = entry_to_candidate(&parse_entries(xml)[0]).unwrap();
        assert_eq!(candidate.locator, "tag:example.com,2025:item-9");
    }
}
