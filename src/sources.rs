//! External read-side collaborators: candidate/KPI feed and draw feed.
//!
//! The engine only depends on the `MarketFeed` / `DrawFeed` traits; the
//! HTTP implementation is a thin JSON client. Retry/backoff policy belongs
//! to the upstream service contract, not here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::types::{Candidate, DrawRecord, KpiWindow};

/// Candidate readings plus the trailing KPI snapshot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Per-source probability readings for the upcoming draw.
    /// An empty batch is a normal quiet cycle, not an error.
    async fn read_candidates(&self) -> Result<Vec<Candidate>>;

    /// Trailing-window KPIs; None when the window has no data yet.
    async fn kpi_window(&self) -> Result<Option<KpiWindow>>;
}

/// Realized draw results used for settlement.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DrawFeed: Send + Sync {
    /// Draws realized in the current settlement window.
    async fn recent_draws(&self) -> Result<Vec<DrawRecord>>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

pub struct HttpFeed {
    client: Client,
    base_url: String,
    api_token: Option<Secret<String>>,
}

impl HttpFeed {
    pub fn new(base_url: String, api_token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.map(Secret::new),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);
        debug!(%url, "Feed request");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Feed request failed: {url}"))?
            .error_for_status()
            .with_context(|| format!("Feed returned error status: {url}"))?;

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode feed response: {url}"))
    }
}

#[async_trait]
impl MarketFeed for HttpFeed {
    async fn read_candidates(&self) -> Result<Vec<Candidate>> {
        self.get_json("candidates").await
    }

    async fn kpi_window(&self) -> Result<Option<KpiWindow>> {
        self.get_json("kpi").await
    }
}

#[async_trait]
impl DrawFeed for HttpFeed {
    async fn recent_draws(&self) -> Result<Vec<DrawRecord>> {
        self.get_json("draws").await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
