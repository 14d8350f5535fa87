//! Per-publisher extraction strategies and the registry that resolves them.
//!
//! Each strategy turns one article URL into its body text. Strategies are
//! registered once at startup under a string id which the sources
//! configuration refers to.
//!
//! # Bundled Strategies
//!
//! | Id | Module | Method | Notes |
//! |----|--------|--------|-------|
//! | `theguardian` | [`guardian`] | Content API | Requires `NEWS_API_KEY` |
//! | `yahoo` | [`yahoo`] | HTML scraping | `div.caas-body` paragraphs |
//! | `nytimes` | [`nytimes`] | HTML scraping | Live blogs are rejected |
//! | `cnn` | [`cnn`] | HTML scraping | CNN Lite text-only pages |
//!
//! Strategies report failures as [`ScrapeError`]. The Fetcher never sees
//! those: [`extract_or_marker`] maps them to [`EXTRACTION_FAILED`].

use async_trait::async_trait;
use itertools::Itertools;
use once_cell::sync::Lazy;
use rand::{Rng, rng};
use regex::Regex;
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::utils::truncate_for_log;

pub mod cnn;
pub mod guardian;
pub mod nytimes;
pub mod yahoo;

/// Text recorded for an article whose extraction failed.
pub const EXTRACTION_FAILED: &str = "extraction failed";

/// Errors a strategy may hit while fetching or parsing one article.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("content missing: {0}")]
    MissingContent(&'static str),

    #[error("url rejected: {0}")]
    Rejected(&'static str),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
}

/// A source-specific fetch-and-extract capability.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Id the sources configuration uses to select this strategy.
    fn id(&self) -> &'static str;

    /// Fetch `url` with the shared `client` and return the article body.
    async fn extract(&self, client: &Client, url: &str) -> Result<String, ScrapeError>;
}

/// Run `strategy` and collapse every failure into [`EXTRACTION_FAILED`].
pub async fn extract_or_marker(strategy: &dyn Strategy, client: &Client, url: &str) -> String {
    match strategy.extract(client, url).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            warn!(strategy = strategy.id(), %url, "Strategy produced no text");
            EXTRACTION_FAILED.to_string()
        }
        Err(e) => {
            warn!(strategy = strategy.id(), %url, error = %e, "Extraction failed");
            EXTRACTION_FAILED.to_string()
        }
    }
}

/// Read-only mapping from strategy id to implementation.
#[derive(Clone, Default)]
pub struct Registry {
    strategies: BTreeMap<&'static str, Arc<dyn Strategy>>,
}

impl Registry {
    /// Registry holding every bundled strategy.
    pub fn with_defaults(guardian_api_key: Option<String>) -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(guardian::Guardian::new(guardian_api_key)));
        registry.register(Arc::new(yahoo::Yahoo));
        registry.register(Arc::new(nytimes::NyTimes));
        registry.register(Arc::new(cnn::CnnLite));
        debug!(ids = %registry.ids().join(", "), "Registered strategies");
        registry
    }

    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategies.insert(strategy.id(), strategy);
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies.get(id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.strategies.keys().copied()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.strategies.keys()).finish()
    }
}

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapse runs of whitespace (including newlines) into single spaces.
pub(crate) fn normalize_text(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// GET `url` and return the body, treating any non-200 response as an error.
pub(crate) async fn fetch_html(client: &Client, url: &str) -> Result<String, ScrapeError> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if status != reqwest::StatusCode::OK {
        return Err(ScrapeError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    let body = resp.text().await?;
    debug!(%url, preview = %truncate_for_log(&body, 80), "Fetched page");
    Ok(body)
}

/// Short randomized pause before hitting a publisher's HTML pages.
pub(crate) async fn polite_delay() {
    let jitter_ms: u64 = rng().random_range(30..=80);
    tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
}
