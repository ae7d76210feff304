use thiserror::Error;

/// Source-cycle-scoped failures. A fetch error fails the whole source for
/// the current monitoring cycle and is collected, never propagated across
/// sources.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("could not extract channel id from {0}")]
    ChannelId(String),

    #[error("could not resolve channel for {0}")]
    ChannelResolution(String),

    #[error("feed at {url} could not be parsed: {reason}")]
    Parse { url: String, reason: String },

    #[error("mail provider error: {0}")]
    Mail(String),

    #[error("no fetcher registered for source kind: {0}")]
    UnsupportedKind(String),
}

#[derive(Error, Debug)]
pub enum TributaryError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("content item {0} not found")]
    ItemNotFound(i64),

    #[error("summary {0} not found")]
    SummaryNotFound(i64),

    #[error("no content available for item {0}")]
    MissingContent(i64),

    #[error("summarization oracle failure: {0}")]
    Oracle(String),

    #[error("replication failed for all requested providers")]
    Replication,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
