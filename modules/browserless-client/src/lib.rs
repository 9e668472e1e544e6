pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use tracing::debug;

const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the Browserless `/content` endpoint: loads a URL in a
/// headless browser, waits for the network to go idle, and returns the
/// fully rendered HTML.
pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    render_timeout: Duration,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        Self::with_timeout(base_url, token, DEFAULT_RENDER_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, token: Option<&str>, render_timeout: Duration) -> Self {
        // Give the HTTP layer headroom beyond the render deadline so
        // timeouts surface as the API's own timeout status first.
        let client = reqwest::Client::builder()
            .timeout(render_timeout + Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            render_timeout,
        }
    }

    /// Fetch fully-rendered HTML for a URL. Scripts run; the call
    /// returns after network idle or fails with
    /// [`BrowserlessError::Timeout`] when the page never settles.
    pub async fn content(&self, url: &str) -> Result<String> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        debug!(url, timeout_ms = self.render_timeout.as_millis() as u64, "Browserless content request");

        let body = serde_json::json!({
            "url": url,
            "gotoOptions": {
                "waitUntil": "networkidle2",
                "timeout": self.render_timeout.as_millis() as u64,
            },
        });

        let resp = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| match BrowserlessError::from(e) {
                BrowserlessError::Timeout(_) => BrowserlessError::Timeout(self.render_timeout),
                other => other,
            })?;

        let status = resp.status();
        if status.as_u16() == 408 {
            return Err(BrowserlessError::Timeout(self.render_timeout));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }
}
