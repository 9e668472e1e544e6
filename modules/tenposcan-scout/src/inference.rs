//! Inference tier: ask a model for store listings when page structure
//! gives nothing to hold on to.
//!
//! This tier never fails an investigation. Every error path logs and
//! returns an empty result; the investigator treats that the same as
//! "the model knew nothing".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use ai_client::{util, Gemini};
use tenposcan_common::{normalize_phone, region, CompanyTarget, StoreRecord, Strategy};

use crate::cache::ResponseCache;

const INFERENCE_TEMPERATURE: f32 = 0.1;

/// Evidence cap, in characters. Enough for a listing page's text;
/// keeps token spend bounded.
const MAX_EVIDENCE_CHARS: usize = 8000;

/// Tier-three extractor. Soft-failing by contract: implementations
/// return what they could find, never an error.
#[async_trait]
pub trait InferenceExtractor: Send + Sync {
    /// Infer store listings for a company. `evidence` is page text
    /// gathered by the earlier tiers; empty means "from knowledge
    /// alone".
    async fn infer_stores(&self, target: &CompanyTarget, evidence: &str) -> Vec<StoreRecord>;
}

/// What the model is asked to emit, one object per store.
#[derive(Debug, Deserialize)]
struct InferredStore {
    #[serde(default)]
    store_name: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    prefecture: String,
    #[serde(default)]
    business_hours: String,
    #[serde(default)]
    url: String,
}

pub struct GeminiInference {
    client: Gemini,
    cache: Arc<ResponseCache>,
    cache_ttl: Duration,
    threshold: f32,
}

impl GeminiInference {
    pub fn new(client: Gemini, cache: Arc<ResponseCache>, cache_ttl: Duration, threshold: f32) -> Self {
        Self {
            client,
            cache,
            cache_ttl,
            threshold,
        }
    }

    fn build_prompt(target: &CompanyTarget, evidence: &str) -> String {
        let mut prompt = String::from(
            "You are extracting Japanese store/branch listings.\n\
             Return ONLY a JSON array, no prose. Each element:\n\
             {\"store_name\": \"\", \"address\": \"\", \"phone\": \"\", \
             \"prefecture\": \"\", \"business_hours\": \"\", \"url\": \"\"}\n\
             Keep addresses in Japanese with the postal code when known.\n\
             Omit stores you are not confident exist. An empty array [] is a valid answer.\n\n",
        );
        prompt.push_str(&format!("Company: {}\n", target.name));
        if let Some(ref industry) = target.industry {
            prompt.push_str(&format!("Industry: {industry}\n"));
        }
        if let Some(ref seed) = target.seed_url {
            prompt.push_str(&format!("Website: {seed}\n"));
        }
        if evidence.trim().is_empty() {
            prompt.push_str("\nNo page text is available. List store locations you know of for this company.\n");
        } else {
            prompt.push_str("\nPage text:\n---\n");
            prompt.push_str(util::truncate_chars(evidence, MAX_EVIDENCE_CHARS));
            prompt.push_str("\n---\n");
        }
        prompt
    }

    fn to_record(&self, inferred: InferredStore, company: &str) -> Option<StoreRecord> {
        let mut record = StoreRecord::new(company, Strategy::Inferred);
        record.name = inferred.store_name.trim().to_string();
        record.address = inferred.address.trim().to_string();
        record.postal_code = region::postal_code_in(&record.address).unwrap_or_default();
        record.region = region::prefecture_for_text(&record.address)
            .map(String::from)
            .unwrap_or_else(|| inferred.prefecture.trim().to_string());
        record.phone = normalize_phone(&inferred.phone);
        record.business_hours = inferred.business_hours.trim().to_string();
        record.source_url = inferred.url.trim().to_string();
        // The model's URL names this store's own page, so it doubles
        // as the enrichment target.
        record.detail_url = (!record.source_url.is_empty()).then(|| record.source_url.clone());
        record.rescore(self.threshold);
        record.is_valid().then_some(record)
    }
}

#[async_trait]
impl InferenceExtractor for GeminiInference {
    async fn infer_stores(&self, target: &CompanyTarget, evidence: &str) -> Vec<StoreRecord> {
        let prompt = Self::build_prompt(target, evidence);
        let key = ResponseCache::fingerprint(&prompt, self.client.model(), INFERENCE_TEMPERATURE);

        let response = self
            .cache
            .get_or_compute(&key, self.cache_ttl, || {
                self.client
                    .generate_with_temperature(&prompt, INFERENCE_TEMPERATURE)
            })
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(company = %target.name, error = %e, "inference call failed");
                return Vec::new();
            }
        };

        let cleaned = util::strip_code_fences(&response);
        let Some(array) = util::first_json_array(cleaned) else {
            warn!(company = %target.name, "inference response had no JSON array");
            return Vec::new();
        };
        let parsed: Vec<InferredStore> = match serde_json::from_str(array) {
            Ok(v) => v,
            Err(e) => {
                warn!(company = %target.name, error = %e, "inference response failed to parse");
                return Vec::new();
            }
        };

        let records: Vec<StoreRecord> = parsed
            .into_iter()
            .filter_map(|s| self.to_record(s, &target.name))
            .collect();
        info!(company = %target.name, count = records.len(), scraper = "inferred", "inference complete");
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_evidence_when_present() {
        let target = CompanyTarget::new("テスト商事").with_industry("学習塾");
        let with = GeminiInference::build_prompt(&target, "店舗一覧 〒100-0001");
        assert!(with.contains("Page text:"));
        assert!(with.contains("学習塾"));

        let without = GeminiInference::build_prompt(&target, "  ");
        assert!(without.contains("No page text is available"));
    }

    #[test]
    fn inferred_store_without_name_is_dropped() {
        let inference = GeminiInference::new(
            Gemini::new("test-key", "gemini-2.0-flash"),
            Arc::new(ResponseCache::default()),
            Duration::from_secs(60),
            0.5,
        );
        let kept = inference.to_record(
            InferredStore {
                store_name: "札幌店".into(),
                address: "北海道札幌市中央区北1条1-1".into(),
                phone: "011(222)3333".into(),
                prefecture: String::new(),
                business_hours: String::new(),
                url: String::new(),
            },
            "テスト商事",
        );
        let kept = kept.unwrap();
        assert_eq!(kept.region, "北海道");
        assert_eq!(kept.phone, "011-222-3333");
        assert_eq!(kept.strategy_used, Strategy::Inferred);

        let dropped = inference.to_record(
            InferredStore {
                store_name: String::new(),
                address: "どこか".into(),
                phone: String::new(),
                prefecture: String::new(),
                business_hours: String::new(),
                url: String::new(),
            },
            "テスト商事",
        );
        assert!(dropped.is_none());
    }
}
