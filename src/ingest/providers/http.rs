// src/ingest/providers/http.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::error::FeedError;
use crate::ingest::providers::feed_xml::parse_feed;
use crate::ingest::types::{FeedSource, RawEntry};

const USER_AGENT: &str = concat!("feed-ledger/", env!("CARGO_PKG_VERSION"));

/// Fetches feeds over HTTP(S). Each request is bounded by `timeout`.
#[derive(Clone)]
pub struct HttpFeedSource {
    client: Client,
    timeout: Duration,
}

impl HttpFeedSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("building http client")?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, address: &str) -> Result<Vec<RawEntry>, FeedError> {
        let resp = self
            .client
            .get(address)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FeedError::unavailable(address, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::unavailable(address, format!("HTTP {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| FeedError::unavailable(address, e))?;

        parse_feed(&body).map_err(|e| FeedError::malformed(address, format!("{e:#}")))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
