mod client;
pub(crate) mod types;

use crate::error::{AiError, Result};

use client::GeminiClient;
use types::*;

/// Gemini text-generation agent. Cheap to clone; each request builds
/// its own HTTP call through [`GeminiClient`].
#[derive(Clone)]
pub struct Gemini {
    api_key: String,
    model: String,
    base_url: Option<String>,
}

impl Gemini {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> GeminiClient {
        let client = GeminiClient::new(&self.api_key);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    /// Generate a completion for a single prompt.
    pub async fn generate_with_temperature(&self, prompt: &str, temperature: f32) -> Result<String> {
        let request = GenerateRequest::from_prompt(prompt).temperature(temperature);
        let response = self.client().generate(&self.model, &request).await?;
        response.text().ok_or(AiError::Empty)
    }
}
