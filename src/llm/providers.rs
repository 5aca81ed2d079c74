use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{http_client, Llm};
use crate::config::RefineConfig;
use crate::error::{PipelineError, Result};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

fn build_request(config: &RefineConfig, system: &str, user: &str) -> ChatRequest {
    ChatRequest {
        model: config.model.clone(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user.to_string(),
            },
        ],
        temperature: config.temperature,
        // Both providers speak the OpenAI chat API; JSON mode keeps the
        // refinement protocol parseable.
        response_format: ResponseFormat { kind: "json_object" },
    }
}

async fn extract_content(response: reqwest::Response, provider: &str) -> Result<String> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(PipelineError::Refinement(format!(
            "{provider} API error {status}: {body}"
        )));
    }
    let chat: ChatResponse = response
        .json()
        .await
        .map_err(|e| PipelineError::Refinement(format!("bad {provider} response: {e}")))?;
    chat.choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| PipelineError::Refinement(format!("empty {provider} response")))
}

/// OpenAI chat provider.
pub struct OpenAiChat {
    config: RefineConfig,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(config: RefineConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(PipelineError::Refinement("OpenAI API key required".to_string()));
        }
        let client = http_client(config.timeout_seconds)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Llm for OpenAiChat {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| PipelineError::Refinement("API key not configured".to_string()))?;
        let url = self.config.endpoint.as_deref().unwrap_or(OPENAI_CHAT_URL);

        debug!(model = %self.config.model, "sending refinement request to OpenAI");
        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&build_request(&self.config, system, user))
            .send()
            .await
            .map_err(|e| PipelineError::Refinement(format!("request failed: {e}")))?;

        extract_content(response, "OpenAI").await
    }
}

/// LMStudio (or any OpenAI-compatible local server) chat provider.
pub struct LmStudioChat {
    config: RefineConfig,
    client: reqwest::Client,
}

impl LmStudioChat {
    pub fn new(config: RefineConfig) -> Result<Self> {
        if config.endpoint.is_none() {
            return Err(PipelineError::Refinement(
                "LMStudio endpoint required".to_string(),
            ));
        }
        let client = http_client(config.timeout_seconds)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Llm for LmStudioChat {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let endpoint = self
            .config
            .endpoint
            .as_ref()
            .ok_or_else(|| PipelineError::Refinement("endpoint not configured".to_string()))?;

        debug!(%endpoint, "sending refinement request to local server");
        let response = self
            .client
            .post(endpoint)
            .json(&build_request(&self.config, system, user))
            .send()
            .await
            .map_err(|e| PipelineError::Refinement(format!("request failed: {e}")))?;

        extract_content(response, "LMStudio").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_to_openai_shape() {
        let request = build_request(&RefineConfig::default(), "be terse", "fix this");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "fix this");
        assert_eq!(json["response_format"]["type"], "json_object");
    }

    #[test]
    fn response_parses_choice_content() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "{\"lines\": []}"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "{\"lines\": []}");
    }

    #[test]
    fn openai_requires_key_and_lmstudio_requires_endpoint() {
        assert!(OpenAiChat::new(RefineConfig::default()).is_err());
        assert!(LmStudioChat::new(RefineConfig::default()).is_err());
    }
}
