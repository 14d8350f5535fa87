//! CNN Lite article strategy.
//!
//! [CNN Lite](https://lite.cnn.com) serves text-only article pages with
//! minimal, consistent HTML. GDELT records CNN articles under their regular
//! `www.cnn.com` URLs, so the path is replayed against the Lite host.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use super::{ScrapeError, Strategy, fetch_html, normalize_text, polite_delay};

const LITE_HOST: &str = "lite.cnn.com";

static HEADLINE: Lazy<Selector> = Lazy::new(|| Selector::parse(".headline--lite").unwrap());
static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse(".article--lite").unwrap());

#[derive(Debug)]
pub struct CnnLite;

/// Rewrite a CNN article URL to its Lite equivalent.
fn lite_url(url: &str) -> Result<String, ScrapeError> {
    let mut parsed = Url::parse(url)?;
    parsed.set_host(Some(LITE_HOST))?;
    parsed.set_query(None);
    Ok(parsed.to_string())
}

/// Headline followed by article body, one block per line.
fn parse_article(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut content = String::new();

    for element in document.select(&HEADLINE).chain(document.select(&ARTICLE)) {
        let text = element.text().collect::<Vec<_>>().join(" ");
        content.push_str(&normalize_text(&text));
        content.push('\n');
    }
    content.trim_end().to_string()
}

#[async_trait]
impl Strategy for CnnLite {
    fn id(&self) -> &'static str {
        "cnn"
    }

    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn extract(&self, client: &Client, url: &str) -> Result<String, ScrapeError> {
        let lite = lite_url(url)?;
        polite_delay().await;
        let body = fetch_html(client, &lite).await?;
        let content = parse_article(&body);
        debug!(bytes = content.len(), "Parsed CNN article");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lite_url() {
        assert_eq!(
            lite_url("https://www.cnn.com/2025/05/06/politics/story?utm=x").unwrap(),
            "https://lite.cnn.com/2025/05/06/politics/story"
        );
    }

    #[test]
    fn test_parse_article() {
        let html = r#"<html><body>
            <h2 class="headline--lite">Big   news</h2>
            <div class="article--lite"><p>First.</p>
            <p>Second.</p></div>
            <div class="footer">ignored</div>
        </body></html>"#;

        let text = parse_article(html);
        assert!(text.starts_with("Big news\n"));
        assert!(text.contains("First."));
        assert!(text.contains("Second."));
        assert!(!text.contains("ignored"));
    }

    #[test]
    fn test_parse_article_without_markup_is_empty() {
        assert_eq!(parse_article("<html><body><p>x</p></body></html>"), "");
    }
}
