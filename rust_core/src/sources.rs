//! Page sources: where page snapshots come from.

use crate::error::SourceError;
use crate::extraction::PageSnapshot;
use crate::models::EventConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Produces a snapshot of the page configured for an event.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, config: &EventConfig) -> Result<PageSnapshot, SourceError>;
}

/// Plain HTTP fetch of the event URL. Does not execute scripts, so it only
/// sees server-rendered markup.
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: Client,
}

impl HttpPageSource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .user_agent(BROWSER_USER_AGENT)
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

impl Default for HttpPageSource {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch(&self, config: &EventConfig) -> Result<PageSnapshot, SourceError> {
        let url = config.url.as_str();
        let fail = |status: Option<u16>, reason: String| SourceError {
            url: url.to_string(),
            status,
            reason,
        };

        let resp = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|e| fail(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(fail(Some(status.as_u16()), format!("HTTP {}", status)));
        }

        let html = resp
            .text()
            .await
            .map_err(|e| fail(Some(status.as_u16()), e.to_string()))?;
        debug!(url, bytes = html.len(), "Fetched page");

        Ok(PageSnapshot::from_html(url, &html))
    }
}

/// Serves fixed HTML: saved pages, fixtures and dry runs.
#[derive(Debug, Clone, Default)]
pub struct StaticPageSource {
    pages: HashMap<String, String>,
    fallback: Option<String>,
}

impl StaticPageSource {
    /// Serve `html` for every event.
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            pages: HashMap::new(),
            fallback: Some(html.into()),
        }
    }

    /// Serve `html` for events whose URL is `url`.
    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }
}

#[async_trait]
impl PageSource for StaticPageSource {
    async fn fetch(&self, config: &EventConfig) -> Result<PageSnapshot, SourceError> {
        let html = self
            .pages
            .get(&config.url)
            .or(self.fallback.as_ref())
            .ok_or_else(|| SourceError {
                url: config.url.clone(),
                status: Some(404),
                reason: "no saved page for this URL".to_string(),
            })?;
        Ok(PageSnapshot::from_html(config.url.clone(), html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventType;

    fn config(url: &str) -> EventConfig {
        EventConfig::new("NBA", "NBA Championship", EventType::Championship, url, 3102, 1)
    }

    #[tokio::test]
    async fn test_static_source_by_url() {
        let source = StaticPageSource::default()
            .with_page("https://a.test", "<html><head><title>A</title></head><body></body></html>");

        let snapshot = source.fetch(&config("https://a.test")).await.unwrap();
        assert_eq!(snapshot.title.as_deref(), Some("A"));

        let err = source.fetch(&config("https://b.test")).await.unwrap_err();
        assert_eq!(err.status, Some(404));
        assert_eq!(err.url, "https://b.test");
    }

    #[tokio::test]
    async fn test_static_source_fallback() {
        let source = StaticPageSource::new("<html><body><p>hi</p></body></html>");
        let snapshot = source.fetch(&config("https://any.test")).await.unwrap();
        assert_eq!(snapshot.url, "https://any.test");
        assert!(snapshot.nodes.iter().any(|n| n.own_text == "hi"));
    }

    #[tokio::test]
    async fn test_http_source_unreachable_host() {
        let source = HttpPageSource::new(Duration::from_secs(2));
        let err = source.fetch(&config("http://127.0.0.1:9/odds")).await.unwrap_err();
        assert!(err.status.is_none());
        assert_eq!(err.url, "http://127.0.0.1:9/odds");
    }
}
