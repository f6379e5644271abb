use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::constants::{DEFAULT_BLOCK_SELECTOR, USER_AGENT};
use crate::error::{OutageError, OutageResult};
use crate::fetch::PageFetcher;

/// Plain HTTP GET. Only useful when the page is rendered server-side.
///
/// A page with no schedule block is rejected as a fetch failure: a
/// script-rendered page fetched this way shows only its empty container,
/// which would otherwise read as "no schedule published".
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
    block_selector: String,
}

impl HttpFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> OutageResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| OutageError::Fetch(format!("Failed to build HTTP client: {}", e)))?;
        Ok(HttpFetcher {
            client,
            url: url.into(),
            block_selector: DEFAULT_BLOCK_SELECTOR.into(),
        })
    }

    /// Selector a fetched page must match at least once.
    pub fn with_block_selector(mut self, selector: impl Into<String>) -> OutageResult<Self> {
        let selector = selector.into();
        Selector::parse(&selector)
            .map_err(|e| OutageError::Config(format!("Invalid block selector '{}': {}", selector, e)))?;
        self.block_selector = selector;
        Ok(self)
    }

    fn has_schedule_blocks(&self, html: &str) -> bool {
        let Ok(selector) = Selector::parse(&self.block_selector) else {
            return false;
        };
        Html::parse_document(html).select(&selector).next().is_some()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self) -> OutageResult<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| OutageError::Fetch(format!("GET {}: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(OutageError::Fetch(format!(
                "GET {} returned HTTP {}",
                self.url,
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| OutageError::Fetch(format!("Reading body of {}: {}", self.url, e)))?;

        if !self.has_schedule_blocks(&html) {
            return Err(OutageError::Fetch(format!(
                "{} has no '{}' block without running its scripts; use fetch.method = \"chromium\"",
                self.url, self.block_selector
            )));
        }

        Ok(html)
    }

    fn source(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedServer, page};

    const UNRENDERED: &str =
        "<html><body><div class=\"power-off\"></div><script src=\"app.js\"></script></body></html>";

    fn fetcher(server: &ScriptedServer) -> HttpFetcher {
        HttpFetcher::new(format!("{}/schedule", server.url()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_rendered_page_returned() {
        let html = page(&["<p>Графік погодинних відключень на 18.10.2026</p>"]);
        let server = ScriptedServer::start(vec![(200, html.clone())]).await;

        assert_eq!(fetcher(&server).fetch().await.unwrap(), html);
        let requests = server.requests();
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path, "/schedule");
        assert!(requests[0].header("user-agent").unwrap().starts_with("outagecal/"));
    }

    #[tokio::test]
    async fn test_unrendered_container_is_a_fetch_error() {
        let server = ScriptedServer::start(vec![(200, UNRENDERED.into())]).await;
        let err = fetcher(&server).fetch().await.unwrap_err();
        assert!(matches!(err, OutageError::Fetch(msg) if msg.contains("chromium")));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = ScriptedServer::start(vec![(503, "busy".into())]).await;
        let err = fetcher(&server).fetch().await.unwrap_err();
        assert!(matches!(err, OutageError::Fetch(msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_custom_block_selector() {
        let server =
            ScriptedServer::start(vec![(200, "<body><section class=\"day\">x</section></body>".into())]).await;
        let fetcher = fetcher(&server).with_block_selector("section.day").unwrap();
        assert!(fetcher.fetch().await.is_ok());

        assert!(matches!(
            HttpFetcher::new("http://localhost", Duration::from_secs(1))
                .unwrap()
                .with_block_selector("[[["),
            Err(OutageError::Config(_))
        ));
    }
}
