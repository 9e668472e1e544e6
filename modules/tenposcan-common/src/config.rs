use std::env;

use crate::quality::DEFAULT_ACCEPTANCE_THRESHOLD;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Inference (tier 3)
    pub gemini_api_key: String,
    pub gemini_model: String,

    // Rendered fetch (tier 2). Optional — without a Browserless
    // endpoint the pipeline runs tiers 1 and 3 only.
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,

    // Pipeline tuning
    pub acceptance_threshold: f32,
    pub request_delay_ms: u64,
    pub cache_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            gemini_api_key: required_env("GEMINI_API_KEY"),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            browserless_url: env::var("BROWSERLESS_URL").ok(),
            browserless_token: env::var("BROWSERLESS_TOKEN").ok(),
            acceptance_threshold: env::var("ACCEPTANCE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_ACCEPTANCE_THRESHOLD),
            request_delay_ms: env::var("REQUEST_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            cache_ttl_secs: env::var("CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
