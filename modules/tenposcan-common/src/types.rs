use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which extraction tier produced a record. Downstream consumers weight
/// trust accordingly — `Inferred` records come from the reasoning
/// fallback, not from page structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Static,
    Rendered,
    Inferred,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Static => "static",
            Strategy::Rendered => "rendered",
            Strategy::Inferred => "inferred",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted store/branch listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRecord {
    pub company: String,
    pub name: String,
    pub address: String,
    pub postal_code: String,
    pub region: String,
    pub phone: String,
    pub business_hours: String,
    pub source_url: String,
    /// Link to the store's own detail page, when the listing had one.
    /// `source_url` falls back to the listing page for provenance;
    /// this field never does.
    #[serde(default)]
    pub detail_url: Option<String>,
    pub strategy_used: Strategy,
    pub quality_score: f32,
    /// Below the acceptance threshold — emitted anyway, flagged for
    /// manual review instead of being dropped.
    pub needs_review: bool,
}

impl StoreRecord {
    pub fn new(company: &str, strategy: Strategy) -> Self {
        Self {
            company: company.to_string(),
            name: String::new(),
            address: String::new(),
            postal_code: String::new(),
            region: String::new(),
            phone: String::new(),
            business_hours: String::new(),
            source_url: String::new(),
            detail_url: None,
            strategy_used: strategy,
            quality_score: 0.0,
            needs_review: true,
        }
    }

    /// Minimum bar for emitting at all: a name plus either an address
    /// or a phone number.
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
            && (!self.address.trim().is_empty() || !self.phone.trim().is_empty())
    }

    /// Recompute the quality score and review flag from the current
    /// fields. Scoring is pure, so this is safe to call repeatedly.
    pub fn rescore(&mut self, threshold: f32) {
        self.quality_score = crate::quality::score(self);
        self.needs_review = self.quality_score < threshold;
    }
}

/// Investigation input: one target company, as handed over by the
/// (out-of-scope) import layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyTarget {
    pub name: String,
    #[serde(default)]
    pub seed_url: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
}

impl CompanyTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed_url: None,
            industry: None,
        }
    }

    pub fn with_seed_url(mut self, url: impl Into<String>) -> Self {
        self.seed_url = Some(url.into());
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }
}

/// Outcome of one company's investigation. A failed session is a
/// zero-record result with its errors listed, never a batch abort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationResult {
    pub company: String,
    pub records: Vec<StoreRecord>,
    /// "static", "rendered", "inferred", "combined", or "none".
    pub strategy_used: String,
    pub pages_visited: u32,
    pub elapsed_ms: u64,
    pub errors: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

/// Normalize a phone number to digits and single hyphens.
pub fn normalize_phone(phone: &str) -> String {
    let mut cleaned = String::with_capacity(phone.len());
    for c in phone.chars() {
        match c {
            '0'..='9' => cleaned.push(c),
            '-' | '(' | ')' => cleaned.push('-'),
            _ => {}
        }
    }
    let collapsed: String = cleaned
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_without_name_is_invalid() {
        let mut r = StoreRecord::new("テスト商事", Strategy::Static);
        r.address = "東京都千代田区1-1".into();
        assert!(!r.is_valid());
        r.name = "千代田店".into();
        assert!(r.is_valid());
    }

    #[test]
    fn phone_normalization() {
        assert_eq!(normalize_phone("03(1234)5678"), "03-1234-5678");
        assert_eq!(normalize_phone("TEL: 0120-123-456"), "0120-123-456");
        assert_eq!(normalize_phone(""), "");
    }
}
