//! Per-session snapshots of the aggregated feed.
//!
//! One async mutex guards the whole session map; every operation,
//! including the background sweep, takes it for its full duration, so a
//! sweep can never interleave with a get-or-create for the same key.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

use crate::aggregate::Aggregator;
use crate::error::{FeedmixerError, Result};
use crate::model::FeedItem;

/// Snapshots older than this many seconds are evicted by the sweep.
pub const SESSION_TTL_SECS: i64 = 1800;

struct Snapshot {
    items: Vec<FeedItem>,
    created_at: i64, // unix timestamp, set when the snapshot was built
}

/// Process-wide map from session id to its cached feed snapshot.
pub struct SessionCache {
    ttl_secs: i64,
    sessions: Mutex<HashMap<String, Snapshot>>,
}

impl SessionCache {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl_secs,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Return the session's cached items, building a fresh snapshot via
    /// the aggregator when none exists. The map lock is held across the
    /// build so the sweep cannot race it.
    pub async fn get_or_create(
        &self,
        session_id: &str,
        aggregator: &Aggregator,
    ) -> Result<Vec<FeedItem>> {
        let mut sessions = self.sessions.lock().await;
        if let Some(snapshot) = sessions.get(session_id) {
            return Ok(snapshot.items.clone());
        }

        let items = aggregator.build_feed().await?;
        sessions.insert(
            session_id.to_string(),
            Snapshot {
                items: items.clone(),
                created_at: Utc::now().timestamp(),
            },
        );
        Ok(items)
    }

    /// Rebuild the session's snapshot unconditionally, resetting its age.
    pub async fn refresh(&self, session_id: &str, aggregator: &Aggregator) -> Result<Vec<FeedItem>> {
        let mut sessions = self.sessions.lock().await;
        let items = aggregator.build_feed().await?;
        sessions.insert(
            session_id.to_string(),
            Snapshot {
                items: items.clone(),
                created_at: Utc::now().timestamp(),
            },
        );
        Ok(items)
    }

    /// Drop the session's snapshot.
    pub async fn end(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| FeedmixerError::NotFound(format!("session {session_id}")))
    }

    /// Swap the updated item into the snapshot in place, preserving its
    /// position. Does not reset the snapshot's age.
    pub async fn apply_like(
        &self,
        session_id: &str,
        item_id: &str,
        updated: FeedItem,
    ) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let snapshot = sessions
            .get_mut(session_id)
            .ok_or_else(|| FeedmixerError::NotFound(format!("session {session_id}")))?;
        let slot = snapshot
            .items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| FeedmixerError::NotFound(format!("item {item_id} in session")))?;
        *slot = updated;
        Ok(())
    }

    /// Remove every snapshot whose age exceeds the TTL at `now`.
    /// Returns the number evicted. Tolerates an empty map.
    pub async fn evict_expired(&self, now: i64) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, snapshot| now - snapshot.created_at <= self.ttl_secs);
        before - sessions.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    #[cfg(test)]
    async fn insert_aged(&self, session_id: &str, items: Vec<FeedItem>, created_at: i64) {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session_id.to_string(), Snapshot { items, created_at });
    }
}

/// Run the eviction sweep on a fixed timer until the process exits.
pub fn spawn_sweeper(cache: Arc<SessionCache>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut timer = interval(Duration::from_secs(interval_secs));
        loop {
            timer.tick().await;
            let evicted = cache.evict_expired(Utc::now().timestamp()).await;
            if evicted > 0 {
                info!("sweep evicted {evicted} expired session(s)");
            } else {
                debug!("sweep found no expired sessions");
            }
        }
    });
}
