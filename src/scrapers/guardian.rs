//! The Guardian article strategy.
//!
//! Article bodies come from the Guardian content API rather than the HTML
//! page: the article path is replayed against `content.guardianapis.com`
//! with `show-fields=bodyText`. The API key is read from `NEWS_API_KEY`.

use async_trait::async_trait;
use reqwest::Client;
use scraper::Html;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::{ScrapeError, Strategy, normalize_text};

const API_BASE: &str = "https://content.guardianapis.com/";

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    response: ApiResponse,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Option<ApiContent>,
}

#[derive(Debug, Deserialize)]
struct ApiContent {
    fields: Option<ApiFields>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFields {
    body_text: Option<String>,
}

#[derive(Debug)]
pub struct Guardian {
    api_key: Option<String>,
}

impl Guardian {
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }

    /// Content API URL for the article behind `url`.
    fn api_url(&self, url: &str) -> Result<Url, ScrapeError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(ScrapeError::MissingCredential("NEWS_API_KEY"))?;
        let path = Url::parse(url)?.path().trim_start_matches('/').to_string();
        let mut api = Url::parse(API_BASE)?.join(&path)?;
        api.query_pairs_mut()
            .append_pair("api-key", key)
            .append_pair("show-fields", "bodyText");
        Ok(api)
    }
}

fn parse_body(json: &str) -> Result<String, ScrapeError> {
    let envelope: ApiEnvelope = serde_json::from_str(json)?;
    let body = envelope
        .response
        .content
        .and_then(|c| c.fields)
        .and_then(|f| f.body_text)
        .ok_or(ScrapeError::MissingContent("response.content.fields.bodyText"))?;

    let fragment = Html::parse_fragment(&body);
    let text = fragment.root_element().text().collect::<String>();
    Ok(normalize_text(&text))
}

#[async_trait]
impl Strategy for Guardian {
    fn id(&self) -> &'static str {
        "theguardian"
    }

    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn extract(&self, client: &Client, url: &str) -> Result<String, ScrapeError> {
        let api = self.api_url(url)?;
        let resp = client.get(api).send().await?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(ScrapeError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let json = resp.text().await?;
        let text = parse_body(&json)?;
        debug!(bytes = text.len(), "Parsed Guardian article");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url() {
        let guardian = Guardian::new(Some("k3y".to_string()));
        let api = guardian
            .api_url("https://www.theguardian.com/world/2021/jun/21/some-story?CMP=share")
            .unwrap();

        assert_eq!(api.host_str(), Some("content.guardianapis.com"));
        assert_eq!(api.path(), "/world/2021/jun/21/some-story");
        assert_eq!(api.query(), Some("api-key=k3y&show-fields=bodyText"));
    }

    #[test]
    fn test_api_url_requires_key() {
        let err = Guardian::new(None)
            .api_url("https://www.theguardian.com/world/a")
            .unwrap_err();
        assert!(matches!(err, ScrapeError::MissingCredential(_)));
    }

    #[test]
    fn test_parse_body() {
        let json = r#"{"response":{"status":"ok","content":{"id":"x","fields":{"bodyText":"Line one.  <b>Line</b> two."}}}}"#;
        assert_eq!(parse_body(json).unwrap(), "Line one. Line two.");
    }

    #[test]
    fn test_parse_body_missing_fields() {
        let json = r#"{"response":{"status":"error","message":"not found"}}"#;
        assert!(matches!(
            parse_body(json).unwrap_err(),
            ScrapeError::MissingContent(_)
        ));
    }
}
