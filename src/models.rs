//! Data models flowing through the harvest pipeline.
//!
//! - [`BatchRecord`]: one decoded line of a GDELT batch file
//! - [`ScrapeTask`]: a candidate article routed from the Harvester to the Fetcher
//! - [`ArticleRecord`]: a scraped article on its way to the Sink
//! - [`Message`]: queue item carrying either data or the end-of-stream marker

use serde::{Deserialize, Serialize};

/// A single remote batch-file URL taken from the manifest.
pub type ManifestEntry = String;

/// One record of a decompressed GDELT GEG batch file.
///
/// Batch lines carry many more fields (entities, salience, mids...), only the
/// ones the pipeline filters and routes on are decoded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchRecord {
    /// Article URL.
    pub url: String,
    /// Language code reported by the NLP annotator.
    pub lang: String,
    /// Document-level sentiment score.
    pub score: f64,
}

/// A candidate article placed on the cross-stage queue.
///
/// `source` is always one of the configured domain substrings; the Harvester
/// only builds tasks through [`ScrapeTask::route`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeTask {
    pub url: String,
    pub sentiment: f64,
    pub source: String,
}

impl ScrapeTask {
    /// Build a task for `record` if its URL matches one of `sources`.
    ///
    /// The first matching source wins so a record never yields more than one task.
    pub fn route<S: AsRef<str>>(record: BatchRecord, sources: &[S]) -> Option<Self> {
        let source = sources
            .iter()
            .map(AsRef::as_ref)
            .find(|source| record.url.contains(source))?;
        Some(Self {
            url: record.url,
            sentiment: record.score,
            source: source.to_string(),
        })
    }
}

/// A scraped article, ready to be persisted.
///
/// Field order is the CSV column order: `url, sentiment, article_text`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleRecord {
    pub url: String,
    pub sentiment: f64,
    pub article_text: String,
}

impl ArticleRecord {
    /// Attach extracted text to a task, dropping its routing metadata.
    pub fn from_task(task: ScrapeTask, article_text: String) -> Self {
        Self {
            url: task.url,
            sentiment: task.sentiment,
            article_text,
        }
    }
}

/// An item on one of the pipeline queues.
#[derive(Debug, Clone, PartialEq)]
pub enum Message<T> {
    Data(T),
    /// No further items will arrive on this queue.
    EndOfStream,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, lang: &str) -> BatchRecord {
        BatchRecord {
            url: url.to_string(),
            lang: lang.to_string(),
            score: 0.4,
        }
    }

    #[test]
    fn test_route_picks_matching_source() {
        let sources = ["www.theguardian.com", "://www.nytimes.com"];
        let task = ScrapeTask::route(
            record("https://www.nytimes.com/2021/06/21/world/x.html", "en"),
            &sources,
        )
        .unwrap();

        assert_eq!(task.source, "://www.nytimes.com");
        assert_eq!(task.sentiment, 0.4);
    }

    #[test]
    fn test_route_first_match_only() {
        let sources = ["theguardian", "www.theguardian.com"];
        let task = ScrapeTask::route(
            record("https://www.theguardian.com/uk/article", "en"),
            &sources,
        )
        .unwrap();

        assert_eq!(task.source, "theguardian");
    }

    #[test]
    fn test_route_rejects_unconfigured_domain() {
        let sources = ["www.theguardian.com"];
        assert!(ScrapeTask::route(record("https://example.com/a", "en"), &sources).is_none());
    }

    #[test]
    fn test_article_record_drops_source() {
        let task = ScrapeTask {
            url: "https://news.yahoo.com/a".to_string(),
            sentiment: -1.5,
            source: "://news.yahoo.com".to_string(),
        };
        let article = ArticleRecord::from_task(task, "Body".to_string());

        assert_eq!(article.url, "https://news.yahoo.com/a");
        assert_eq!(article.sentiment, -1.5);
        assert_eq!(article.article_text, "Body");
    }

    #[test]
    fn test_batch_record_from_json_line() {
        let line = r#"{"date":"2021-06-21 10:00:00","url":"https://www.theguardian.com/a","lang":"en","score":0.2,"entities":[]}"#;
        let rec: BatchRecord = serde_yaml::from_str(line).unwrap();
        assert_eq!(rec.lang, "en");
        assert_eq!(rec.score, 0.2);
    }
}
