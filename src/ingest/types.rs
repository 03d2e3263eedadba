// src/ingest/types.rs
use chrono::{DateTime, FixedOffset};

use crate::error::FeedError;

/// Publication time as decomposed by a feed parser. Interpreted as UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedParts {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

/// One item as the feed delivered it. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub link: Option<String>,
    pub title: Option<String>,
    pub published: Option<PublishedParts>,
    /// Preferred summary field.
    pub summary: Option<String>,
    /// Alternate summary field (RSS `description`, Atom `content`).
    pub description: Option<String>,
}

/// A normalized, newly accepted item.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Entry {
    pub title: String,
    #[serde(rename = "link")]
    pub identifier: String,
    #[serde(rename = "published")]
    pub published_at: DateTime<FixedOffset>,
    pub summary: String,
    #[serde(rename = "source")]
    pub source_feed: String,
}

/// Entries accepted by one run, in feed order then entry order.
pub type RunBatch = Vec<Entry>;

/// Fetches and parses one feed address into raw entries.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, address: &str) -> Result<Vec<RawEntry>, FeedError>;
    fn name(&self) -> &'static str;
}
