//! The feed parser collaborator: URL in, raw entries out.
//!
//! The trait exists so the ingestor can be exercised against scripted
//! feeds in tests; the real implementation fetches over HTTP and hands
//! the body to feed-rs.

use std::time::Duration;

use async_trait::async_trait;
use feed_rs::parser;
use lazy_static::lazy_static;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;

use crate::error::{FeedmixerError, Result};
use crate::model::RawEntry;

/// Total per-request timeout in seconds. A slow feed must not stall
/// the whole aggregation.
const FETCH_TIMEOUT_SECS: u64 = 30;

/// Connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

fn build_user_agent() -> HeaderMap {
    let custom_user_agent = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36";

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(custom_user_agent));
    headers
}

lazy_static! {
    static ref HTTP_CLIENT: Client = Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .default_headers(build_user_agent())
        .build()
        .expect("failed to build HTTP client");
}

#[async_trait]
pub trait FeedParser: Send + Sync {
    /// Fetch and parse one feed URL into raw entries. May fail or
    /// return an empty sequence; the caller isolates failures.
    async fn parse(&self, url: &str) -> Result<Vec<RawEntry>>;
}

/// Production parser: reqwest fetch plus feed-rs for RSS and Atom.
pub struct HttpFeedParser;

#[async_trait]
impl FeedParser for HttpFeedParser {
    async fn parse(&self, url: &str) -> Result<Vec<RawEntry>> {
        let response = HTTP_CLIENT.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FeedmixerError::UpstreamFetch(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }
        let bytes = response.bytes().await?;

        let feed = parser::parse(bytes.as_ref())
            .map_err(|e| FeedmixerError::UpstreamFetch(format!("parse failed for {url}: {e}")))?;

        Ok(feed.entries.into_iter().map(entry_to_raw).collect())
    }
}

fn entry_to_raw(entry: feed_rs::model::Entry) -> RawEntry {
    let thumbnail_urls = entry
        .media
        .iter()
        .flat_map(|media| media.thumbnails.iter().map(|t| t.image.uri.clone()))
        .chain(
            entry
                .media
                .iter()
                .flat_map(|media| media.content.iter())
                .filter_map(|content| content.url.as_ref().map(|u| u.to_string())),
        )
        .collect();

    RawEntry {
        title: entry.title.map(|t| t.content).unwrap_or_default(),
        guid: entry.id,
        link: entry
            .links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_default(),
        published: entry
            .published
            .or(entry.updated)
            .map(|d| d.to_rfc2822())
            .unwrap_or_default(),
        summary: entry.summary.map(|t| t.content).unwrap_or_default(),
        thumbnail_urls,
    }
}
