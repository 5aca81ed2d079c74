pub mod providers;
pub mod refine;

use async_trait::async_trait;

use crate::config::{LlmProvider, RefineConfig};
use crate::error::{PipelineError, Result};

pub use refine::Refiner;

/// Chat-completion boundary used by the refinement pass.
#[async_trait]
pub trait Llm: Send + Sync {
    /// One system+user exchange; returns the assistant message content.
    async fn chat(&self, system: &str, user: &str) -> Result<String>;
}

/// Create an LLM client based on configuration.
pub fn create_llm(config: &RefineConfig) -> Result<Box<dyn Llm>> {
    match config.provider {
        LlmProvider::OpenAi => Ok(Box::new(providers::OpenAiChat::new(config.clone())?)),
        LlmProvider::LmStudio => Ok(Box::new(providers::LmStudioChat::new(config.clone())?)),
    }
}

pub(crate) fn http_client(timeout_seconds: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| PipelineError::Refinement(format!("http client: {e}")))
}
