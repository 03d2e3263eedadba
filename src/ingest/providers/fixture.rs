// src/ingest/providers/fixture.rs
use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::FeedError;
use crate::ingest::providers::feed_xml::parse_feed;
use crate::ingest::types::{FeedSource, RawEntry};

/// Serves feed documents from memory, keyed by address. Unknown addresses are unavailable.
#[derive(Debug, Clone, Default)]
pub struct FixtureFeedSource {
    docs: HashMap<String, String>,
}

impl FixtureFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(mut self, address: &str, xml: &str) -> Self {
        self.docs.insert(address.to_string(), xml.to_string());
        self
    }
}

#[async_trait]
impl FeedSource for FixtureFeedSource {
    async fn fetch(&self, address: &str) -> Result<Vec<RawEntry>, FeedError> {
        let xml = self
            .docs
            .get(address)
            .ok_or_else(|| FeedError::unavailable(address, "no fixture for address"))?;
        parse_feed(xml).map_err(|e| FeedError::malformed(address, format!("{e:#}")))
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
