//! Video-channel fetcher backed by the YouTube Data API.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Candidate, SourceFetcher};
use crate::db::ContentSource;
use crate::error::FetchError;
use crate::TARGET_WEB_REQUEST;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const MAX_RESULTS: u32 = 25;

/// The four recognized channel URL shapes. Anything else is a fetch error.
static CHANNEL_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"youtube\.com/channel/([A-Za-z0-9_-]+)").unwrap());
static HANDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"youtube\.com/@([A-Za-z0-9_.-]+)").unwrap());
static CUSTOM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"youtube\.com/c/([A-Za-z0-9_.-]+)").unwrap());
static USER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"youtube\.com/user/([A-Za-z0-9_.-]+)").unwrap());

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").unwrap());

/// How a channel was named in the source URL. Only `Id` can be used against
/// the API directly; the other shapes resolve through a search call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    Id(String),
    Handle(String),
    Custom(String),
    User(String),
}

pub fn extract_channel_id(url: &str) -> Result<ChannelRef, FetchError> {
    if let Some(caps) = CHANNEL_ID_RE.captures(url) {
        return Ok(ChannelRef::Id(caps[1].to_string()));
    }
    if let Some(caps) = HANDLE_RE.captures(url) {
        return Ok(ChannelRef::Handle(caps[1].to_string()));
    }
    if let Some(caps) = CUSTOM_RE.captures(url) {
        return Ok(ChannelRef::Custom(caps[1].to_string()));
    }
    if let Some(caps) = USER_RE.captures(url) {
        return Ok(ChannelRef::User(caps[1].to_string()));
    }
    Err(FetchError::ChannelId(url.to_string()))
}

/// Parses an ISO-8601-subset duration (`PT1H2M3S`) into whole seconds.
/// Hours, minutes, and seconds groups are all optional; anything that does
/// not match the shape yields 0.
pub fn parse_iso8601_duration(duration: &str) -> u64 {
    let Some(caps) = DURATION_RE.captures(duration.trim()) else {
        return 0;
    };
    let group = |i: usize| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };
    group(1) * 3600 + group(2) * 60 + group(3)
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Snippet,
}

#[derive(Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
    #[serde(rename = "channelId")]
    channel_id: Option<String>,
}

#[derive(Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(rename = "channelTitle", default)]
    channel_title: String,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
}

#[derive(Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Deserialize)]
struct VideoItem {
    id: String,
    #[serde(rename = "contentDetails")]
    content_details: ContentDetails,
}

#[derive(Deserialize)]
struct ContentDetails {
    #[serde(default)]
    duration: String,
}

pub struct VideoFetcher {
    http: reqwest::Client,
    api_key: String,
}

impl VideoFetcher {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
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
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Request {
                url: url.to_string(),
                reason: format!("status {}", response.status()),
            });
        }

        response.json().await.map_err(|e| FetchError::Parse {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Resolves handle/custom/user shapes to a channel id through the search
    /// endpoint; an explicit `/channel/` id is used as-is.
    async fn resolve_channel(&self, origin: &str) -> Result<String, FetchError> {
        let name = match extract_channel_id(origin)? {
            ChannelRef::Id(id) => return Ok(id),
            ChannelRef::Handle(name) | ChannelRef::Custom(name) | ChannelRef::User(name) => name,
        };

        let url = format!("{}/search", API_BASE);
        let response: SearchResponse = self
            .get_json(&url, &[("part", "snippet"), ("type", "channel"), ("q", &name)])
            .await?;

        response
            .items
            .into_iter()
            .find_map(|item| item.id.channel_id)
            .ok_or_else(|| FetchError::ChannelResolution(origin.to_string()))
    }

    /// Recent uploads for a channel, newest first, with per-video durations.
    async fn list_recent_uploads(&self, channel_id: &str) -> Result<Vec<Candidate>, FetchError> {
        let url = format!("{}/search", API_BASE);
        let max_results = MAX_RESULTS.to_string();
        let search: SearchResponse = self
            .get_json(
                &url,
                &[
                    ("part", "snippet"),
                    ("type", "video"),
                    ("order", "date"),
                    ("channelId", channel_id),
                    ("maxResults", &max_results),
                ],
            )
            .await?;

        let uploads: Vec<(String, Snippet)> = search
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id.map(|id| (id, item.snippet)))
            .collect();

        if uploads.is_empty() {
            return Ok(Vec::new());
        }

        let ids = uploads
            .iter()
            .map(|(id, _)| id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/videos", API_BASE);
        let details: VideosResponse = self
            .get_json(&url, &[("part", "contentDetails"), ("id", &ids)])
            .await?;

        let durations: std::collections::HashMap<String, u64> = details
            .items
            .into_iter()
            .map(|v| (v.id, parse_iso8601_duration(&v.content_details.duration)))
            .collect();

        Ok(uploads
            .into_iter()
            .map(|(video_id, snippet)| {
                let metadata = serde_json::json!({
                    "channel_id": channel_id,
                    "author": snippet.channel_title,
                    "duration_seconds": durations.get(&video_id).copied().unwrap_or(0),
                    "url": format!("https://www.youtube.com/watch?v={}", video_id),
                });
                Candidate {
                    locator: video_id,
                    title: snippet.title,
                    // Transcripts are resolved lazily at summarization time.
                    raw_text: None,
                    published_at: snippet.published_at,
                    metadata: Some(metadata),
                }
            })
            .collect())
    }
}

#[async_trait]
impl SourceFetcher for VideoFetcher {
    async fn fetch(&self, source: &ContentSource) -> Result<Vec<Candidate>, FetchError> {
        let channel_id = self.resolve_channel(&source.origin).await?;
        debug!(target: TARGET_WEB_REQUEST, "Listing recent uploads for channel {}", channel_id);

        let candidates = self.list_recent_uploads(&channel_id).await?;
        if candidates.is_empty() {
            warn!(target: TARGET_WEB_REQUEST, "No recent uploads found for channel {}", channel_id);
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_the_four_channel_url_shapes() {
        assert_eq!(
            extract_channel_id("https://www.youtube.com/channel/UC12345abcde").unwrap(),
            ChannelRef::Id("UC12345abcde".to_string())
        );
        assert_eq!(
            extract_channel_id("https://youtube.com/@some.handle").unwrap(),
            ChannelRef::Handle("some.handle".to_string())
        );
        assert_eq!(
            extract_channel_id("https://www.youtube.com/c/SomeChannel").unwrap(),
            ChannelRef::Custom("SomeChannel".to_string())
        );
        assert_eq!(
            extract_channel_id("https://www.youtube.com/user/olduser").unwrap(),
            ChannelRef::User("olduser".to_string())
        );
    }

    #[test]
    fn unrecognized_url_is_an_error() {
        let err = extract_channel_id("https://vimeo.com/channels/staff").unwrap_err();
        assert!(matches!(err, FetchError::ChannelId(_)));
    }

    #[test]
    fn parses_full_duration() {
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), 3723);
    }

    #[test]
    fn parses_partial_durations() {
        assert_eq!(parse_iso8601_duration("PT45S"), 45);
        assert_eq!(parse_iso8601_duration("PT4M13S"), 253);
        assert_eq!(parse_iso8601_duration("PT2H"), 7200);
    }

    #[test]
    fn unparseable_duration_is_zero() {
        assert_eq!(parse_iso8601_duration(""), 0);
        assert_eq!(parse_iso8601_duration("4 minutes"), 0);
        assert_eq!(parse_iso8601_duration("P1DT2H"), 0);
    }
}
