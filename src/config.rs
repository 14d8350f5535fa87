//! News source configuration: loading, validation and routing.
//!
//! A source pairs a domain substring (matched against GDELT article URLs)
//! with the id of the strategy that scrapes it. Sources are validated once
//! at startup, before any pipeline thread is spawned.
//!
//! # File Format
//!
//! ```yaml
//! - source: www.theguardian.com
//!   strategy: theguardian
//! - source: "://news.yahoo.com"
//!   strategy: yahoo
//! ```

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

use crate::scrapers::{Registry, Strategy};

/// Reasons a sources configuration is refused.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("news sources can not be empty")]
    EmptySources,

    #[error("source domain missing for entry {index} (strategy {strategy:?})")]
    MissingSource {
        index: usize,
        strategy: Option<String>,
    },

    #[error("strategy id missing for entry {index} (source {domain:?})")]
    MissingStrategy {
        index: usize,
        domain: Option<String>,
    },

    #[error("strategy {strategy:?} for source {domain:?} is not registered")]
    UnknownStrategy { domain: String, strategy: String },

    #[error("failed to read sources file {path}: {error}")]
    Read {
        path: String,
        #[source]
        error: std::io::Error,
    },

    #[error("failed to parse sources file {path}: {error}")]
    Parse {
        path: String,
        #[source]
        error: serde_yaml::Error,
    },
}

/// A sources entry as written by the user; either field may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSource {
    pub source: Option<String>,
    #[serde(alias = "function_name", alias = "strategy_id")]
    pub strategy: Option<String>,
}

impl RawSource {
    pub fn new(source: &str, strategy: &str) -> Self {
        Self {
            source: Some(source.to_string()),
            strategy: Some(strategy.to_string()),
        }
    }
}

/// A validated source entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub source: String,
    pub strategy: String,
}

/// Sources used when no configuration file is given.
pub fn default_sources() -> Vec<RawSource> {
    vec![
        RawSource::new("www.theguardian.com", "theguardian"),
        RawSource::new("://news.yahoo.com", "yahoo"),
        RawSource::new("://www.nytimes.com", "nytimes"),
    ]
}

/// Read a YAML list of sources from `path`.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn load_sources(path: &Path) -> Result<Vec<RawSource>, ConfigError> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
        path: display.clone(),
        error,
    })?;
    let sources: Vec<RawSource> =
        serde_yaml::from_str(&text).map_err(|error| ConfigError::Parse {
            path: display,
            error,
        })?;
    info!(count = sources.len(), "Loaded sources file");
    Ok(sources)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Check every entry against `registry`, failing on the first violation.
pub fn validate_sources(
    sources: &[RawSource],
    registry: &Registry,
) -> Result<Vec<SourceConfig>, ConfigError> {
    if sources.is_empty() {
        return Err(ConfigError::EmptySources);
    }

    sources
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let source = non_blank(&raw.source).ok_or_else(|| ConfigError::MissingSource {
                index,
                strategy: raw.strategy.clone(),
            })?;
            let strategy =
                non_blank(&raw.strategy).ok_or_else(|| ConfigError::MissingStrategy {
                    index,
                    domain: raw.source.clone(),
                })?;
            if registry.lookup(strategy).is_none() {
                return Err(ConfigError::UnknownStrategy {
                    domain: source.to_string(),
                    strategy: strategy.to_string(),
                });
            }
            Ok(SourceConfig {
                source: source.to_string(),
                strategy: strategy.to_string(),
            })
        })
        .collect()
}

/// A configured source bound to its strategy.
#[derive(Clone)]
pub struct Route {
    pub source: String,
    pub strategy: Arc<dyn Strategy>,
}

/// Source to strategy table consulted by the Fetcher.
#[derive(Clone)]
pub struct Routes(Vec<Route>);

impl Routes {
    /// Bind validated sources to their strategies.
    ///
    /// Entries whose strategy vanished from `registry` are skipped; validation
    /// already guarantees there are none.
    pub fn resolve(sources: &[SourceConfig], registry: &Registry) -> Self {
        Self::from_routes(
            sources
                .iter()
                .filter_map(|s| {
                    registry.lookup(&s.strategy).map(|strategy| Route {
                        source: s.source.clone(),
                        strategy,
                    })
                })
                .collect(),
        )
    }

    pub fn from_routes(routes: Vec<Route>) -> Self {
        Self(routes)
    }

    pub fn find(&self, source: &str) -> Option<&Route> {
        self.0.iter().find(|route| route.source == source)
    }

    /// Domain substrings the Harvester filters on, in configuration order.
    pub fn sources(&self) -> Vec<String> {
        self.0.iter().map(|route| route.source.clone()).collect()
    }
}

impl std::fmt::Debug for Routes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|r| (&r.source, r.strategy.id())))
            .finish()
    }
}
