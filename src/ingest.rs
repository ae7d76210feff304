//! The ingestion pipeline: fetch candidates from a source, filter them
//! against already-ingested fingerprints, persist the new ones, and advance
//! the source checkpoint.

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::db::{ContentSource, Database, NewContentItem};
use crate::error::{FetchError, TributaryError};
use crate::fetch::{Fetchers, SourceFetcher};
use crate::TARGET_WEB_REQUEST;

/// Per-source result of one monitoring cycle. A populated `error` means the
/// whole source failed for this cycle; other sources are unaffected.
#[derive(Debug)]
pub struct SourceOutcome {
    pub source_id: i64,
    pub candidates_seen: usize,
    pub new_items: usize,
    pub error: Option<TributaryError>,
}

impl SourceOutcome {
    fn failed(source_id: i64, error: TributaryError) -> Self {
        Self {
            source_id,
            candidates_seen: 0,
            new_items: 0,
            error: Some(error),
        }
    }
}

/// Runs one source through the pipeline: fetch, fingerprint-check each
/// candidate, insert misses, then stamp the checkpoint. Duplicate candidates
/// are normal skips. The checkpoint is only advanced when the fetch itself
/// succeeded, so a transient origin outage does not move a mailbox window
/// past unseen messages.
pub async fn monitor_source(
    db: &Database,
    fetcher: &dyn SourceFetcher,
    source: &ContentSource,
) -> SourceOutcome {
    let candidates = match fetcher.fetch(source).await {
        Ok(candidates) => candidates,
        Err(err) => {
            error!(target: TARGET_WEB_REQUEST, "Fetch failed for source {}: {}", source.id, err);
            return SourceOutcome::failed(source.id, err.into());
        }
    };

    let candidates_seen = candidates.len();
    let mut new_items = 0;

    for candidate in candidates {
        match db.item_exists(source.id, &candidate.locator).await {
            Ok(true) => {
                debug!(target: TARGET_WEB_REQUEST, "Already ingested, skipping: {}", candidate.locator);
                continue;
            }
            Ok(false) => {}
            Err(err) => {
                return SourceOutcome {
                    source_id: source.id,
                    candidates_seen,
                    new_items,
                    error: Some(err.into()),
                };
            }
        }

        let item = NewContentItem {
            source_id: source.id,
            kind: source.kind.item_kind().to_string(),
            title: candidate.title,
            locator: candidate.locator,
            raw_text: candidate.raw_text,
            metadata: candidate.metadata,
            published_at: candidate.published_at,
        };

        // The unique (source_id, locator) constraint backstops the check
        // above: a conflicting insert counts as already-ingested.
        match db.insert_item(&item).await {
            Ok(Some(_)) => new_items += 1,
            Ok(None) => {}
            Err(err) => {
                return SourceOutcome {
                    source_id: source.id,
                    candidates_seen,
                    new_items,
                    error: Some(err.into()),
                };
            }
        }
    }

    if let Err(err) = db.touch_last_checked(source.id).await {
        return SourceOutcome {
            source_id: source.id,
            candidates_seen,
            new_items,
            error: Some(err.into()),
        };
    }

    if new_items > 0 {
        info!(target: TARGET_WEB_REQUEST, "Source {}: {} new of {} candidates", source.id, new_items, candidates_seen);
    } else {
        debug!(target: TARGET_WEB_REQUEST, "Source {}: no new items among {} candidates", source.id, candidates_seen);
    }

    SourceOutcome {
        source_id: source.id,
        candidates_seen,
        new_items,
        error: None,
    }
}

/// One monitoring cycle over all active sources. Failures are collected per
/// source, never propagated across the cycle; the outcome list always covers
/// every source reached before cancellation.
pub async fn run_cycle(
    db: &Database,
    fetchers: &Fetchers,
    cancel_rx: &watch::Receiver<bool>,
) -> Result<Vec<SourceOutcome>, sqlx::Error> {
    let sources = db.list_active_sources().await?;
    info!(target: TARGET_WEB_REQUEST, "Starting monitoring cycle over {} sources", sources.len());

    let mut outcomes = Vec::with_capacity(sources.len());
    for source in &sources {
        if *cancel_rx.borrow() {
            info!(target: TARGET_WEB_REQUEST, "Cancellation received, stopping cycle after {} sources", outcomes.len());
            break;
        }

        let outcome = match fetchers.get(source.kind) {
            Some(fetcher) => monitor_source(db, fetcher.as_ref(), source).await,
            None => SourceOutcome::failed(
                source.id,
                FetchError::UnsupportedKind(source.kind.to_string()).into(),
            ),
        };
        outcomes.push(outcome);
    }

    let failures = outcomes.iter().filter(|o| o.error.is_some()).count();
    info!(
        target: TARGET_WEB_REQUEST,
        "Monitoring cycle complete: {} sources, {} failures, {} new items",
        outcomes.len(),
        failures,
        outcomes.iter().map(|o| o.new_items).sum::<usize>()
    );
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SourceKind;
    use crate::fetch::Candidate;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct ScriptedFetcher {
        candidates: Vec<Candidate>,
        fail: bool,
    }

    impl ScriptedFetcher {
        fn with(locators: &[&str]) -> Self {
            let candidates = locators
                .iter()
                .map(|l| Candidate {
                    locator: l.to_string(),
                    title: format!("Title {}", l),
                    raw_text: Some("body".to_string()),
                    published_at: None,
                    metadata: None,
                })
                .collect();
            Self {
                candidates,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                candidates: Vec::new(),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl SourceFetcher for ScriptedFetcher {
        async fn fetch(&self, source: &ContentSource) -> Result<Vec<Candidate>, FetchError> {
            if self.fail {
                return Err(FetchError::Request {
                    url: source.origin.clone(),
                    reason: "origin unreachable".to_string(),
                });
            }
            Ok(self.candidates.clone())
        }
    }

    async fn seeded_db(origins: &[&str]) -> (Database, Vec<i64>) {
        let db = Database::new_in_memory().await.unwrap();
        let mut ids = Vec::new();
        for origin in origins {
            ids.push(
                db.add_source("user-1", SourceKind::Feed, origin, None)
                    .await
                    .unwrap(),
            );
        }
        (db, ids)
    }

    #[tokio::test]
    async fn second_cycle_creates_nothing_new() {
        let (db, ids) = seeded_db(&["https://example.com/feed"]).await;
        let source = db.get_source(ids[0]).await.unwrap().unwrap();
        let fetcher = ScriptedFetcher::with(&["a", "b", "c"]);

        let first = monitor_source(&db, &fetcher, &source).await;
        assert_eq!(first.new_items, 3);
        assert_eq!(first.candidates_seen, 3);
        assert!(first.error.is_none());

        let second = monitor_source(&db, &fetcher, &source).await;
        assert_eq!(second.new_items, 0);
        assert_eq!(second.candidates_seen, 3);
        assert!(second.error.is_none());
    }

    #[tokio::test]
    async fn duplicates_within_one_fetch_create_one_item() {
        let (db, ids) = seeded_db(&["https://example.com/feed"]).await;
        let source = db.get_source(ids[0]).await.unwrap().unwrap();
        let fetcher = ScriptedFetcher::with(&["a", "a", "b", "a"]);

        let outcome = monitor_source(&db, &fetcher, &source).await;
        assert_eq!(outcome.candidates_seen, 4);
        assert_eq!(outcome.new_items, 2);
    }

    #[tokio::test]
    async fn same_locator_under_different_sources_is_distinct() {
        let (db, ids) = seeded_db(&["https://a.example/feed", "https://b.example/feed"]).await;
        let fetcher = ScriptedFetcher::with(&["shared-locator"]);

        for id in &ids {
            let source = db.get_source(*id).await.unwrap().unwrap();
            let outcome = monitor_source(&db, &fetcher, &source).await;
            assert_eq!(outcome.new_items, 1);
        }
    }

    #[tokio::test]
    async fn failing_source_does_not_disturb_neighbors() {
        let (db, ids) = seeded_db(&[
            "https://one.example/feed",
            "https://two.example/feed",
            "https://three.example/feed",
        ]).await;

        // All three sources share the feed kind, so script the failure at
        // the fetcher level per source by running them individually.
        let ok = ScriptedFetcher::with(&["x"]);
        let bad = ScriptedFetcher::failing();

        let mut outcomes = Vec::new();
        for (pos, id) in ids.iter().enumerate() {
            let source = db.get_source(*id).await.unwrap().unwrap();
            let fetcher: &dyn SourceFetcher = if pos == 1 { &bad } else { &ok };
            outcomes.push(monitor_source(&db, fetcher, &source).await);
        }

        assert!(outcomes[0].error.is_none());
        assert_eq!(outcomes[0].new_items, 1);
        assert!(matches!(
            outcomes[1].error,
            Some(TributaryError::Fetch(FetchError::Request { .. }))
        ));
        assert!(outcomes[2].error.is_none());
        assert_eq!(outcomes[2].new_items, 1);
    }

    #[tokio::test]
    async fn checkpoint_advances_only_on_successful_fetch() {
        let (db, ids) = seeded_db(&["https://example.com/feed"]).await;
        let source = db.get_source(ids[0]).await.unwrap().unwrap();
        assert!(source.last_checked.is_none());

        monitor_source(&db, &ScriptedFetcher::failing(), &source).await;
        let after_failure = db.get_source(ids[0]).await.unwrap().unwrap();
        assert!(after_failure.last_checked.is_none());

        monitor_source(&db, &ScriptedFetcher::with(&[]), &source).await;
        let after_success = db.get_source(ids[0]).await.unwrap().unwrap();
        assert!(after_success.last_checked.is_some());
    }

    #[tokio::test]
    async fn run_cycle_reports_every_source() {
        let (db, _ids) = seeded_db(&["https://one.example/feed", "https://two.example/feed"]).await;
        let mut fetchers = Fetchers::new();
        fetchers.register(SourceKind::Feed, Arc::new(ScriptedFetcher::with(&["a"])));

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let outcomes = run_cycle(&db, &fetchers, &cancel_rx).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.error.is_none()));
        // Both sources see the same locator, but fingerprints are per-source.
        assert_eq!(outcomes.iter().map(|o| o.new_items).sum::<usize>(), 2);
    }

    #[tokio::test]
    async fn missing_fetcher_is_a_collected_failure() {
        let db = Database::new_in_memory().await.unwrap();
        db.add_source("user-1", SourceKind::Mailbox, "newsletters", None)
            .await
            .unwrap();

        let fetchers = Fetchers::new();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let outcomes = run_cycle(&db, &fetchers, &cancel_rx).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0].error,
            Some(TributaryError::Fetch(FetchError::UnsupportedKind(_)))
        ));
    }

    #[tokio::test]
    async fn cancelled_cycle_stops_early() {
        let (db, _ids) = seeded_db(&["https://one.example/feed", "https://two.example/feed"]).await;
        let mut fetchers = Fetchers::new();
        fetchers.register(SourceKind::Feed, Arc::new(ScriptedFetcher::with(&["a"])));

        let (cancel_tx, cancel_rx) = watch::channel(false);
        cancel_tx.send(true).unwrap();
        let outcomes = run_cycle(&db, &fetchers, &cancel_rx).await.unwrap();
        assert!(outcomes.is_empty());
    }
}
