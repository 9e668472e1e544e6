use std::time::Duration;

use thiserror::Error;

/// Failure of a single page fetch. The variant decides what the
/// escalation loop does next: network errors are retried a bounded
/// number of times within the tier, everything else escalates
/// immediately.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Render timed out after {0:?}")]
    RenderTimeout(Duration),
}

impl FetchError {
    /// Only network failures are worth another attempt within the
    /// same tier.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Parse(_) => "parse",
            FetchError::RenderTimeout(_) => "render_timeout",
        }
    }
}

/// Failures that cross module seams. Fetch failures stay inside the
/// tiers as [`FetchError`], and the inference tier soft-fails, so only
/// the batch machinery surfaces here.
#[derive(Debug, Error)]
pub enum TenposcanError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Worker pool is shut down")]
    PoolClosed,
}
