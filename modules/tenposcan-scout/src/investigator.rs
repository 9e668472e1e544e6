//! Per-company investigation: the tier cascade.
//!
//! One investigation walks an explicit state machine. Each fetch tier
//! runs at most once, escalation only ever moves forward, and the
//! terminal states are the only exits. A company that yields nothing
//! ends in `Failed` with its errors recorded; it never aborts a batch.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use tenposcan_common::{CompanyTarget, InvestigationResult, StoreRecord, Strategy};

use crate::crawler::{self, CrawlController, MAX_DEPTH, MAX_PAGES_PER_COMPANY};
use crate::enrichment;
use crate::extractor;
use crate::fetch::PageScraper;
use crate::inference::InferenceExtractor;
use crate::pool::WorkerPool;

/// Most records worth a detail-page fetch in one investigation.
const ENRICH_CAP: usize = 20;

/// Where an investigation stands in the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierState {
    Pending,
    StaticTried,
    RenderedTried,
    InferredTried,
    Done,
    Failed,
}

impl TierState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierState::Pending => "pending",
            TierState::StaticTried => "static_tried",
            TierState::RenderedTried => "rendered_tried",
            TierState::InferredTried => "inferred_tried",
            TierState::Done => "done",
            TierState::Failed => "failed",
        }
    }
}

pub struct Investigator {
    static_fetcher: Arc<dyn PageScraper>,
    rendered_fetcher: Option<Arc<dyn PageScraper>>,
    inference: Option<Arc<dyn InferenceExtractor>>,
    threshold: f32,
    max_pages: usize,
    request_delay: Duration,
}

impl Investigator {
    pub fn new(static_fetcher: Arc<dyn PageScraper>) -> Self {
        Self {
            static_fetcher,
            rendered_fetcher: None,
            inference: None,
            threshold: tenposcan_common::quality::DEFAULT_ACCEPTANCE_THRESHOLD,
            max_pages: MAX_PAGES_PER_COMPANY,
            request_delay: Duration::ZERO,
        }
    }

    pub fn with_rendered(mut self, fetcher: Arc<dyn PageScraper>) -> Self {
        self.rendered_fetcher = Some(fetcher);
        self
    }

    pub fn with_inference(mut self, inference: Arc<dyn InferenceExtractor>) -> Self {
        self.inference = Some(inference);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// A tier's output stands when it produced anything that clears
    /// the quality threshold.
    fn tier_accepted(&self, records: &[StoreRecord]) -> bool {
        records.iter().any(|r| r.quality_score >= self.threshold)
    }

    /// Run the full cascade for one company.
    pub async fn investigate(&self, target: &CompanyTarget) -> InvestigationResult {
        let started = Instant::now();
        info!(company = %target.name, "investigation started");

        let crawl = CrawlController::new(self.max_pages);
        let mut rendered_pages = 0usize;
        let mut errors: Vec<String> = Vec::new();
        let mut evidence: Option<String> = None;
        let mut collected: Vec<Vec<StoreRecord>> = Vec::new();
        let mut outcome: Option<(Vec<StoreRecord>, &'static str)> = None;

        let mut state = TierState::Pending;
        while !matches!(state, TierState::Done | TierState::Failed) {
            let next = match state {
                TierState::Pending => {
                    let Some(seed) = target.seed_url.as_deref() else {
                        debug!(company = %target.name, "no seed URL, fetch tiers skipped");
                        state = TierState::StaticTried;
                        continue;
                    };
                    let records = self
                        .crawl_tier(
                            self.static_fetcher.as_ref(),
                            Strategy::Static,
                            target,
                            seed,
                            &crawl,
                            &mut errors,
                            &mut evidence,
                        )
                        .await;
                    if self.tier_accepted(&records) {
                        outcome = Some((records, "static"));
                        TierState::Done
                    } else {
                        collected.push(records);
                        TierState::StaticTried
                    }
                }
                TierState::StaticTried => {
                    let (Some(fetcher), Some(seed)) =
                        (self.rendered_fetcher.as_deref(), target.seed_url.as_deref())
                    else {
                        state = TierState::RenderedTried;
                        continue;
                    };
                    info!(company = %target.name, "escalating to rendered tier");
                    // Rendering gets a fresh budget: the static pass
                    // already spent the first controller's pages.
                    let render_crawl = CrawlController::new(self.max_pages);
                    let records = self
                        .crawl_tier(
                            fetcher,
                            Strategy::Rendered,
                            target,
                            seed,
                            &render_crawl,
                            &mut errors,
                            &mut evidence,
                        )
                        .await;
                    rendered_pages = render_crawl.pages_visited();
                    if self.tier_accepted(&records) {
                        outcome = Some((records, "rendered"));
                        TierState::Done
                    } else {
                        collected.push(records);
                        TierState::RenderedTried
                    }
                }
                TierState::RenderedTried => {
                    let Some(inference) = self.inference.as_deref() else {
                        state = TierState::InferredTried;
                        continue;
                    };
                    info!(company = %target.name, "escalating to inference tier");
                    let text = evidence
                        .as_deref()
                        .map(extractor::page_text)
                        .unwrap_or_default();
                    let records = inference.infer_stores(target, &text).await;
                    if self.tier_accepted(&records) {
                        outcome = Some((records, "inferred"));
                        TierState::Done
                    } else {
                        collected.push(records);
                        TierState::InferredTried
                    }
                }
                TierState::InferredTried => {
                    // Nothing cleared the bar. Ship the merged
                    // leftovers flagged for review rather than
                    // discarding partial work.
                    let merged = merge_records(collected.drain(..));
                    if merged.is_empty() {
                        TierState::Failed
                    } else {
                        outcome = Some((merged, "combined"));
                        TierState::Done
                    }
                }
                TierState::Done | TierState::Failed => unreachable!("terminal state re-entered"),
            };
            debug!(company = %target.name, from = state.as_str(), to = next.as_str(), "tier transition");
            state = next;
        }

        let (mut records, strategy_used) = match outcome {
            Some((records, label)) => (merge_records([records]), label),
            None => (Vec::new(), "none"),
        };

        if !records.is_empty() {
            let cap = records.len().min(ENRICH_CAP);
            enrichment::enrich_all(&mut records[..cap], self.static_fetcher.as_ref(), self.threshold)
                .await;
        }

        if state == TierState::Failed {
            warn!(company = %target.name, errors = errors.len(), "investigation found nothing");
        }

        let result = InvestigationResult {
            company: target.name.clone(),
            records,
            strategy_used: strategy_used.to_string(),
            pages_visited: (crawl.pages_visited() + rendered_pages) as u32,
            elapsed_ms: started.elapsed().as_millis() as u64,
            errors,
            finished_at: Utc::now(),
        };
        info!(
            company = %result.company,
            stores = result.records.len(),
            strategy = %result.strategy_used,
            pages = result.pages_visited,
            elapsed_ms = result.elapsed_ms,
            "investigation finished"
        );
        result
    }

    /// One fetch tier: seed-family expansion, then a bounded crawl of
    /// discovered listing links.
    #[allow(clippy::too_many_arguments)]
    async fn crawl_tier(
        &self,
        fetcher: &dyn PageScraper,
        strategy: Strategy,
        target: &CompanyTarget,
        seed: &str,
        crawl: &CrawlController,
        errors: &mut Vec<String>,
        evidence: &mut Option<String>,
    ) -> Vec<StoreRecord> {
        let mut queue: VecDeque<(String, usize)> = crawler::expand_family(seed)
            .into_iter()
            .map(|url| (url, 0))
            .collect();
        let mut records: Vec<StoreRecord> = Vec::new();
        let mut first = true;

        while let Some((url, depth)) = queue.pop_front() {
            if !crawl.try_visit(&url) {
                continue;
            }
            if !first && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
            first = false;

            let html = match fetcher.fetch(&url).await {
                Ok(html) => html,
                Err(e) => {
                    debug!(url, scraper = fetcher.name(), error = %e, "page fetch failed");
                    errors.push(format!("{url}: {e}"));
                    continue;
                }
            };
            // Keep the richest page seen as inference evidence.
            if evidence.as_ref().is_none_or(|prev| html.len() > prev.len()) {
                *evidence = Some(html.clone());
            }

            match extractor::extract_records(&html, &target.name, &url, strategy, self.threshold) {
                Ok(found) => records.extend(found),
                Err(e) => errors.push(format!("{url}: {e}")),
            }

            if depth < MAX_DEPTH && crawl.budget_left() {
                for link in crawler::discover_listing_links(&html, &url) {
                    queue.push_back((link, depth + 1));
                }
            }
        }
        merge_records([records])
    }

    /// Run a whole batch through a bounded worker pool. Results come
    /// back in input order; one company's failure is its own result,
    /// never the batch's.
    pub async fn investigate_batch(
        self: Arc<Self>,
        targets: Vec<CompanyTarget>,
    ) -> Vec<InvestigationResult> {
        let pool = Arc::new(WorkerPool::for_batch(targets.len()));
        info!(companies = targets.len(), workers = pool.size(), "batch started");

        let mut handles = Vec::with_capacity(targets.len());
        for target in targets {
            let investigator = Arc::clone(&self);
            let pool = Arc::clone(&pool);
            let company = target.name.clone();
            let handle = tokio::spawn(async move {
                match pool.acquire().await {
                    Ok(_permit) => investigator.investigate(&target).await,
                    Err(e) => failed_result(&target.name, e.to_string()),
                }
            });
            handles.push((company, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (company, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(company = %company, error = %e, "investigation task aborted");
                    results.push(failed_result(&company, e.to_string()));
                }
            }
        }
        pool.shutdown();
        results
    }
}

fn failed_result(company: &str, error: String) -> InvestigationResult {
    InvestigationResult {
        company: company.to_string(),
        records: Vec::new(),
        strategy_used: "none".to_string(),
        pages_visited: 0,
        elapsed_ms: 0,
        errors: vec![error],
        finished_at: Utc::now(),
    }
}

/// Merge record batches, keeping one record per store name. On a name
/// collision the higher-scoring record wins.
fn merge_records<I>(batches: I) -> Vec<StoreRecord>
where
    I: IntoIterator<Item = Vec<StoreRecord>>,
{
    let mut merged: Vec<StoreRecord> = Vec::new();
    for batch in batches {
        for record in batch {
            match merged.iter_mut().find(|r| r.name == record.name) {
                Some(existing) => {
                    if record.quality_score > existing.quality_score {
                        *existing = record;
                    }
                }
                None => merged.push(record),
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockFetcher, MockInference};

    fn record(name: &str, score: f32) -> StoreRecord {
        let mut r = StoreRecord::new("テスト商事", Strategy::Static);
        r.name = name.to_string();
        r.quality_score = score;
        r
    }

    #[test]
    fn merge_keeps_best_per_name() {
        let merged = merge_records([
            vec![record("札幌店", 0.3), record("仙台店", 0.8)],
            vec![record("札幌店", 0.9)],
        ]);
        assert_eq!(merged.len(), 2);
        let sapporo = merged.iter().find(|r| r.name == "札幌店").unwrap();
        assert_eq!(sapporo.quality_score, 0.9);
    }

    #[tokio::test]
    async fn no_seed_goes_straight_to_inference() {
        let fetcher = Arc::new(MockFetcher::new().with_default("<html></html>"));
        let mut inferred = record("本店", 0.0);
        inferred.address = "東京都千代田区丸の内1-1".into();
        inferred.strategy_used = Strategy::Inferred;
        inferred.rescore(0.5);
        let inference = Arc::new(MockInference::new().with_records(vec![inferred]));

        let investigator = Investigator::new(fetcher.clone())
            .with_inference(inference.clone());
        let result = investigator
            .investigate(&CompanyTarget::new("テスト商事"))
            .await;

        assert_eq!(result.strategy_used, "inferred");
        assert_eq!(result.records.len(), 1);
        assert_eq!(inference.call_count(), 1);
        assert_eq!(fetcher.call_count(), 0, "no fetch without a seed URL");
    }

    #[tokio::test]
    async fn unreachable_site_yields_failed_result() {
        let investigator = Investigator::new(Arc::new(MockFetcher::new().failing()));
        let target = CompanyTarget::new("テスト商事")
            .with_seed_url("https://unreachable.example.co.jp/shop/");
        let result = investigator.investigate(&target).await;

        assert_eq!(result.strategy_used, "none");
        assert!(result.records.is_empty());
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn tier_state_labels() {
        assert_eq!(TierState::Pending.as_str(), "pending");
        assert_eq!(TierState::Done.as_str(), "done");
    }
}
