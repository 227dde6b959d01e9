//! Builds one session's feed: every registered feed, merged and shuffled.

use futures::future::join_all;
use rand::seq::SliceRandom;
use tracing::warn;

use crate::error::Result;
use crate::ingest::Ingestor;
use crate::model::FeedItem;
use crate::store::FeedRegistry;

#[derive(Clone)]
pub struct Aggregator {
    registry: FeedRegistry,
    ingestor: Ingestor,
}

impl Aggregator {
    pub fn new(registry: FeedRegistry, ingestor: Ingestor) -> Self {
        Self { registry, ingestor }
    }

    /// Ingest every registered feed (seeding the defaults on first use),
    /// concatenate the results in registry order, and shuffle the whole
    /// sequence uniformly.
    ///
    /// One feed failing to fetch or parse only loses that feed's items;
    /// the rest of the aggregation proceeds.
    pub async fn build_feed(&self) -> Result<Vec<FeedItem>> {
        let mut urls = self.registry.list().await?;
        if urls.is_empty() {
            urls = self.registry.seed_defaults().await?;
        }

        let results = join_all(urls.iter().map(|url| self.ingestor.ingest(url))).await;

        let mut items = Vec::new();
        for (url, result) in urls.iter().zip(results) {
            match result {
                Ok(batch) => items.extend(batch),
                Err(e) => warn!("skipping feed {url} this cycle: {e}"),
            }
        }

        items.shuffle(&mut rand::rng());
        Ok(items)
    }
}
