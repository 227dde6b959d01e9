//! Durable storage for feed items and the feed registry.
//!
//! Everything here goes through a single `tokio_rusqlite::Connection`;
//! each operation is one `conn.call` closure so it runs as a unit on
//! the sqlite thread.

use std::collections::HashSet;

use tokio_rusqlite::rusqlite::params_from_iter;
use tokio_rusqlite::{params, Connection};

use crate::error::{FeedmixerError, Result};
use crate::model::FeedItem;

/// Starter subscriptions, inserted when the registry is empty.
pub const DEFAULT_FEEDS: [&str; 2] = [
    "https://feeds.yle.fi/uutiset/v1/recent.rss?publisherIds=YLE_UUTISET",
    "https://reddit.com/r/Suomi.rss",
];

const ITEM_COLUMNS: &str = "id, guid, title, link, published, summary, media, liked, hidden";

fn row_to_item(row: &tokio_rusqlite::rusqlite::Row) -> tokio_rusqlite::rusqlite::Result<FeedItem> {
    Ok(FeedItem {
        id: row.get(0)?,
        guid: row.get(1)?,
        title: row.get(2)?,
        link: row.get(3)?,
        published: row.get(4)?,
        summary: row.get(5)?,
        media: row.get(6)?,
        liked: row.get::<_, i64>(7)? != 0,
        hidden: row.get::<_, i64>(8)? != 0,
    })
}

/// Table of previously-ingested feed items, unique on external guid.
#[derive(Clone)]
pub struct ItemStore {
    conn: Connection,
}

impl ItemStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Every guid currently in the store. One full scan, used by the
    /// ingestor to tell new entries from re-fetched ones.
    pub async fn all_guids(&self) -> Result<HashSet<String>> {
        let guids = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT guid FROM items")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                let mut guids = HashSet::new();
                for guid in rows {
                    guids.insert(guid?);
                }
                Ok(guids)
            })
            .await?;
        Ok(guids)
    }

    /// Persist a batch of freshly-ingested items in one transaction.
    ///
    /// Guid collisions are ignored rather than erroring, so a row can
    /// never be duplicated even when two aggregations race on the same
    /// feed.
    pub async fn insert_many(&self, items: Vec<FeedItem>) -> Result<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for item in &items {
                    tx.execute(
                        "INSERT OR IGNORE INTO items
                         (id, guid, title, link, published, summary, media, liked, hidden)
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                        params![
                            item.id,
                            item.guid,
                            item.title,
                            item.link,
                            item.published,
                            item.summary,
                            item.media,
                            item.liked as i64,
                            item.hidden as i64,
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Look up existing rows by guid membership.
    pub async fn by_guids(&self, guids: Vec<String>) -> Result<Vec<FeedItem>> {
        if guids.is_empty() {
            return Ok(Vec::new());
        }
        let items = self
            .conn
            .call(move |conn| {
                let placeholders = vec!["?"; guids.len()].join(", ");
                let sql = format!(
                    "SELECT {ITEM_COLUMNS} FROM items WHERE guid IN ({placeholders})"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(guids.iter()), row_to_item)?;
                let mut items = Vec::new();
                for item in rows {
                    items.push(item?);
                }
                Ok(items)
            })
            .await?;
        Ok(items)
    }

    /// Flip the liked flag and return the row's new state.
    pub async fn toggle_like(&self, id: &str) -> Result<FeedItem> {
        let id = id.to_string();
        let lookup = id.clone();
        let item = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE items SET liked = 1 - liked WHERE id = ?",
                    params![id],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?");
                let item = conn.query_row(&sql, params![id], row_to_item)?;
                Ok(Some(item))
            })
            .await?;
        item.ok_or_else(|| FeedmixerError::NotFound(format!("item {lookup}")))
    }

    /// Hide the row. Hiding always clears liked; an item cannot be both
    /// hidden and liked.
    pub async fn set_hidden(&self, id: &str) -> Result<FeedItem> {
        let id = id.to_string();
        let lookup = id.clone();
        let item = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE items SET hidden = 1, liked = 0 WHERE id = ?",
                    params![id],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?");
                let item = conn.query_row(&sql, params![id], row_to_item)?;
                Ok(Some(item))
            })
            .await?;
        item.ok_or_else(|| FeedmixerError::NotFound(format!("item {lookup}")))
    }

    pub async fn select_all(&self) -> Result<Vec<FeedItem>> {
        let items = self
            .conn
            .call(|conn| {
                let sql = format!("SELECT {ITEM_COLUMNS} FROM items");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], row_to_item)?;
                let mut items = Vec::new();
                for item in rows {
                    items.push(item?);
                }
                Ok(items)
            })
            .await?;
        Ok(items)
    }
}

/// Durable list of subscribed feed URLs.
#[derive(Clone)]
pub struct FeedRegistry {
    conn: Connection,
}

impl FeedRegistry {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub async fn add(&self, url: &str) -> Result<()> {
        let url = url.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("INSERT OR IGNORE INTO feeds (url) VALUES (?)", params![url])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        let urls = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT url FROM feeds")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                let mut urls = Vec::new();
                for url in rows {
                    urls.push(url?);
                }
                Ok(urls)
            })
            .await?;
        Ok(urls)
    }

    /// Insert the default subscriptions and return them. Called when
    /// the registry turns out to be empty on first use.
    pub async fn seed_defaults(&self) -> Result<Vec<String>> {
        for url in DEFAULT_FEEDS {
            self.add(url).await?;
        }
        Ok(DEFAULT_FEEDS.iter().map(|url| url.to_string()).collect())
    }
}
