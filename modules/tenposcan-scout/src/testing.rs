//! Mock fetchers and extractors for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use tenposcan_common::{CompanyTarget, FetchError, StoreRecord};

use crate::fetch::PageScraper;
use crate::inference::InferenceExtractor;

/// Canned-page fetcher. Serves registered URLs, falls back to a
/// default body, and records every URL it was asked for.
#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, String>,
    default_body: Option<String>,
    fail: bool,
    render_timeout: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_default(mut self, html: &str) -> Self {
        self.default_body = Some(html.to_string());
        self
    }

    /// Every fetch fails with a network error.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Every fetch fails with a render timeout, as a stalled headless
    /// browser would.
    pub fn timing_out(mut self, after: Duration) -> Self {
        self.render_timeout = Some(after);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock poisoned").len()
    }
}

#[async_trait]
impl PageScraper for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(url.to_string());
        if let Some(after) = self.render_timeout {
            return Err(FetchError::RenderTimeout(after));
        }
        if self.fail {
            return Err(FetchError::Network(format!("mock failure for {url}")));
        }
        self.pages
            .get(url)
            .cloned()
            .or_else(|| self.default_body.clone())
            .ok_or_else(|| FetchError::Network(format!("no mock page for {url}")))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Inference stand-in returning a fixed record set.
#[derive(Default)]
pub struct MockInference {
    records: Vec<StoreRecord>,
    calls: AtomicUsize,
}

impl MockInference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(mut self, records: Vec<StoreRecord>) -> Self {
        self.records = records;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl InferenceExtractor for MockInference {
    async fn infer_stores(&self, _target: &CompanyTarget, _evidence: &str) -> Vec<StoreRecord> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.records.clone()
    }
}
