//! Persistence layer: the source registry, ingested content items, their
//! summaries, and replication records, all backed by SQLite.

mod core;
mod item;
mod location;
mod schema;
mod source;
mod summary;

pub use self::core::Database;
pub use self::item::{ContentItem, NewContentItem};
pub use self::location::StorageLocationRecord;
pub use self::source::{ContentSource, SourceKind};
pub use self::summary::{NewSummary, Sentiment, SummaryRecord};
