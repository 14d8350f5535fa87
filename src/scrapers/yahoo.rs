//! Yahoo News article strategy.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::instrument;

use super::{ScrapeError, Strategy, fetch_html, normalize_text, polite_delay};

static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("div.caas-body").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

/// Scrapes `news.yahoo.com` article pages.
#[derive(Debug)]
pub struct Yahoo;

/// Join the paragraphs of the article body.
///
/// # Returns
///
/// The normalized text, or [`ScrapeError::MissingContent`] when the page has
/// no `div.caas-body`.
fn parse_article(html: &str) -> Result<String, ScrapeError> {
    let document = Html::parse_document(html);
    let body = document
        .select(&BODY)
        .next()
        .ok_or(ScrapeError::MissingContent("div.caas-body"))?;

    let text = body
        .select(&PARAGRAPH)
        .map(|p| p.text().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ");
    Ok(normalize_text(&text))
}

#[async_trait]
impl Strategy for Yahoo {
    fn id(&self) -> &'static str {
        "yahoo"
    }

    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn extract(&self, client: &Client, url: &str) -> Result<String, ScrapeError> {
        polite_delay().await;
        let body = fetch_html(client, url).await?;
        parse_article(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_article_paragraphs() {
        let html = r#"<div class="caas-body"><p>One.</p><div>skip</div><p>Two.</p></div>"#;
        assert_eq!(parse_article(html).unwrap(), "One. Two.");
    }

    #[test]
    fn test_parse_article_missing_body() {
        let err = parse_article("<div class='other'><p>One.</p></div>").unwrap_err();
        assert!(matches!(err, ScrapeError::MissingContent(_)));
    }
}
