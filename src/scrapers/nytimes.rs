//! New York Times article strategy.
//!
//! Live-blog URLs (`/live/`) bundle many stories under one sentiment score,
//! so they are rejected without a request.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::instrument;

use super::{ScrapeError, Strategy, fetch_html, normalize_text, polite_delay};

static ARTICLE_BODY: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"section[name="articleBody"]"#).unwrap());

/// Scrapes `www.nytimes.com` article pages.
#[derive(Debug)]
pub struct NyTimes;

fn parse_article(html: &str) -> Result<String, ScrapeError> {
    let document = Html::parse_document(html);
    let text = document
        .select(&ARTICLE_BODY)
        .map(|section| section.text().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ");

    if text.trim().is_empty() {
        return Err(ScrapeError::MissingContent("section[name=articleBody]"));
    }
    Ok(normalize_text(&text))
}

#[async_trait]
impl Strategy for NyTimes {
    fn id(&self) -> &'static str {
        "nytimes"
    }

    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn extract(&self, client: &Client, url: &str) -> Result<String, ScrapeError> {
        if url.contains("/live/") {
            return Err(ScrapeError::Rejected("live blog"));
        }
        polite_delay().await;
        let body = fetch_html(client, url).await?;
        parse_article(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_article_body_section() {
        let html = r#"<section name="header">Nope</section>
            <section name="articleBody"><p>Para
            one.</p><p>Para two.</p></section>"#;
        assert_eq!(parse_article(html).unwrap(), "Para one.Para two.");
    }

    #[tokio::test]
    async fn test_live_pages_rejected_without_request() {
        let client = Client::new();
        let err = NyTimes
            .extract(
                &client,
                "https://www.nytimes.com/live/2021/06/21/business/economy-stock-market-news",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Rejected(_)));
    }
}
