//! Per-feed ingestion: fetch, sanitize, dedupe by guid, persist.

use std::collections::HashSet;
use std::sync::Arc;

use scraper::Html;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{FeedItem, RawEntry};
use crate::parser::FeedParser;
use crate::store::ItemStore;

/// Fetches one feed URL and reconciles it against the item store.
#[derive(Clone)]
pub struct Ingestor {
    store: ItemStore,
    parser: Arc<dyn FeedParser>,
}

impl Ingestor {
    pub fn new(store: ItemStore, parser: Arc<dyn FeedParser>) -> Self {
        Self { store, parser }
    }

    /// Ingest one feed URL.
    ///
    /// Entries whose guid is already stored are re-read from the store
    /// instead of being re-parsed; the rest are sanitized, persisted in
    /// one batch, and returned first. A store failure on either path
    /// degrades that path to empty rather than failing the ingestion.
    pub async fn ingest(&self, url: &str) -> Result<Vec<FeedItem>> {
        let known = self.store.all_guids().await?;
        let entries = self.parser.parse(url).await?;

        let mut fresh = Vec::new();
        let mut refetch = Vec::new();
        let mut seen = HashSet::new();
        for entry in entries {
            if !entry.guid.is_empty() {
                // A guid repeated within one fetch is the same item;
                // only the first occurrence counts.
                if !seen.insert(entry.guid.clone()) {
                    continue;
                }
                if known.contains(&entry.guid) {
                    refetch.push(entry.guid);
                    continue;
                }
            }
            fresh.push(build_item(entry));
        }

        let mut items = if fresh.is_empty() {
            Vec::new()
        } else {
            match self.store.insert_many(fresh.clone()).await {
                Ok(()) => fresh,
                Err(e) => {
                    warn!("failed to persist {url} batch, dropping it this cycle: {e}");
                    Vec::new()
                }
            }
        };

        if !refetch.is_empty() {
            match self.store.by_guids(refetch).await {
                Ok(existing) => items.extend(existing),
                Err(e) => {
                    warn!("failed to look up re-fetched items for {url}: {e}");
                }
            }
        }

        Ok(items)
    }
}

fn build_item(entry: RawEntry) -> FeedItem {
    let guid = if entry.guid.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        entry.guid
    };

    FeedItem {
        id: Uuid::new_v4().to_string(),
        guid,
        title: entry.title,
        link: entry.link,
        published: entry.published,
        summary: sanitize_summary(&entry.summary),
        media: entry.thumbnail_urls.into_iter().next(),
        liked: false,
        hidden: false,
    }
}

/// Reduce an HTML-looking summary to plain text with collapsed
/// whitespace. Plain-text summaries pass through untouched.
fn sanitize_summary(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with('<') {
        return trimmed.to_string();
    }

    let fragment = Html::parse_fragment(trimmed);
    let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
