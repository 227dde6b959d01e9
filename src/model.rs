use serde::{Deserialize, Serialize};

/// One stored feed item, as persisted and as served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Internal id, assigned at ingestion. Immutable.
    pub id: String,
    /// Stable identifier from the source feed; unique across the store.
    /// A generated id is substituted when the source provides none.
    pub guid: String,
    pub title: String,
    pub link: String,
    /// Publication date in whatever string form the source used.
    pub published: String,
    /// Plain text. HTML-looking input is stripped before storage.
    pub summary: String,
    /// At most one thumbnail URL.
    pub media: Option<String>,
    pub liked: bool,
    pub hidden: bool,
}

/// A raw entry as produced by the feed parser, before sanitation
/// and deduplication.
#[derive(Debug, Clone, Default)]
pub struct RawEntry {
    pub title: String,
    pub guid: String,
    pub link: String,
    pub published: String,
    pub summary: String,
    pub thumbnail_urls: Vec<String>,
}
