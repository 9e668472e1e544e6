//! Page fetchers for the first two extraction tiers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use browserless_client::{BrowserlessClient, BrowserlessError};
use tenposcan_common::FetchError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_secs(2);

/// Chrome cap. Rendering is memory-hungry; two pages at a time keeps
/// the browserless container stable.
const MAX_CONCURRENT_RENDERS: usize = 2;

/// Something that turns a URL into page HTML. The static and rendered
/// tiers both live behind this, so the investigator never cares which
/// one it is holding.
#[async_trait]
pub trait PageScraper: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
    fn name(&self) -> &'static str;
}

/// Tier-one fetcher: plain HTTP GET with browser-like headers and
/// retries on transient failures.
pub struct StaticFetcher {
    client: reqwest::Client,
}

impl Default for StaticFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticFetcher {
    pub fn new() -> Self {
        // Store-locator pages routinely sniff for headless clients;
        // a realistic header set gets the same markup a browser would.
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .parse()
                .expect("valid header"),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            "ja,en-US;q=0.9,en;q=0.8".parse().expect("valid header"),
        );

        let client = reqwest::Client::builder()
            .user_agent(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            )
            .default_headers(headers)
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self { client }
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(FetchError::Network(format!("server error {status} for {url}")));
        }
        if !status.is_success() {
            // Client errors will not heal on retry.
            return Err(FetchError::Parse(format!("status {status} for {url}")));
        }
        resp.text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))
    }
}

#[async_trait]
impl PageScraper for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let jitter = rand::rng().random_range(0..500);
                let delay = RETRY_BASE * 2u32.pow(attempt - 1) + Duration::from_millis(jitter);
                debug!(url, attempt, delay_ms = delay.as_millis() as u64, "retrying fetch");
                tokio::time::sleep(delay).await;
            }
            match self.fetch_once(url).await {
                Ok(html) => return Ok(html),
                Err(e) if e.is_retryable() => {
                    warn!(url, attempt, error = %e, "fetch failed");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| FetchError::Network(format!("fetch failed for {url}"))))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Tier-two fetcher: headless rendering through browserless, capped by
/// a shared semaphore.
pub struct RenderedFetcher {
    client: BrowserlessClient,
    render_slots: Arc<Semaphore>,
}

impl RenderedFetcher {
    pub fn new(client: BrowserlessClient) -> Self {
        Self {
            client,
            render_slots: Arc::new(Semaphore::new(MAX_CONCURRENT_RENDERS)),
        }
    }
}

#[async_trait]
impl PageScraper for RenderedFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let _slot = self
            .render_slots
            .acquire()
            .await
            .map_err(|_| FetchError::Network("render slots closed".into()))?;

        debug!(url, scraper = "rendered", "rendering page");
        self.client.content(url).await.map_err(|e| match e {
            BrowserlessError::Timeout(d) => FetchError::RenderTimeout(d),
            BrowserlessError::Api { status, message } => {
                FetchError::Network(format!("browserless status {status}: {message}"))
            }
            BrowserlessError::Network(msg) => FetchError::Network(msg),
        })
    }

    fn name(&self) -> &'static str {
        "rendered"
    }
}
