use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserlessError>;

#[derive(Debug, Error)]
pub enum BrowserlessError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Render timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for BrowserlessError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // The HTTP deadline doubles as the render deadline: the
            // /content call does not return until the page settles.
            BrowserlessError::Timeout(Duration::ZERO)
        } else {
            BrowserlessError::Network(err.to_string())
        }
    }
}
