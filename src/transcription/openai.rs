use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use tracing::{debug, info};

use super::Transcriber;
use crate::config::TranscriptionConfig;
use crate::error::{PipelineError, Result};
use crate::reconcile::Segment;

/// OpenAI-compatible Whisper transcription provider.
///
/// Uses the `verbose_json` response format with segment-level timestamp
/// granularity so each utterance carries chunk-local start/end times.
pub struct OpenAiTranscriber {
    config: TranscriptionConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    segments: Vec<ApiSegment>,
}

#[derive(Debug, Deserialize)]
struct ApiSegment {
    start: f64,
    end: f64,
    text: String,
}

impl OpenAiTranscriber {
    pub fn new(config: TranscriptionConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(PipelineError::Transcription(
                "transcription API key required".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PipelineError::Transcription(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }

    async fn build_form(
        &self,
        chunk: &Path,
        language: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<multipart::Form> {
        let bytes = tokio::fs::read(chunk).await.map_err(|e| {
            PipelineError::Transcription(format!("cannot read chunk {}: {e}", chunk.display()))
        })?;
        let file_name = chunk
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "chunk.mp3".to_string());

        let mut form = multipart::Form::new()
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .part(
                "file",
                multipart::Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str("audio/mpeg")
                    .map_err(|e| PipelineError::Transcription(e.to_string()))?,
            );
        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }
        if let Some(prompt) = prompt {
            form = form.text("prompt", prompt.to_string());
        }
        Ok(form)
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(
        &self,
        chunk: &Path,
        language: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<Vec<Segment>> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| PipelineError::Transcription("API key not configured".to_string()))?;

        info!(chunk = %chunk.display(), model = %self.config.model, "transcribing chunk");
        let form = self.build_form(chunk, language, prompt).await?;

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::Transcription(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Transcription(format!(
                "transcription API error {status}: {body}"
            )));
        }

        let transcription: VerboseTranscription = response
            .json()
            .await
            .map_err(|e| PipelineError::Transcription(format!("bad response body: {e}")))?;

        let segments: Vec<Segment> = transcription
            .segments
            .into_iter()
            .map(|s| Segment::new(s.start, s.end, s.text.trim()))
            .collect();
        debug!(count = segments.len(), "chunk transcribed");
        Ok(segments)
    }
}
