use serde::Deserialize;
use tracing::{debug, info};

use super::{create_llm, Llm};
use crate::config::RefineConfig;
use crate::error::{PipelineError, Result};

/// Appended after the user-supplied system prompts. A JSON array keeps the
/// line mapping explicit instead of relying on numbered-prefix parsing,
/// which drifts with model formatting habits.
const PROTOCOL_INSTRUCTIONS: &str = "\
You will receive numbered transcript lines. Clean them up per the rules above \
without merging, splitting, reordering or dropping lines. Respond with a JSON \
object of the form {\"lines\": [\"...\"]} containing exactly one refined string \
per input line, in input order, without the leading numbers.";

#[derive(Debug, Deserialize)]
struct RefinedBatch {
    lines: Vec<String>,
}

/// Batched LLM cleanup of raw transcript text.
///
/// Lines go out in fixed-size batches and must come back with the same
/// cardinality; a mismatch aborts rather than silently truncating or
/// padding the transcript.
pub struct Refiner {
    llm: Box<dyn Llm>,
    system_prompt: String,
    batch_size: usize,
}

impl Refiner {
    /// Build a refiner from config, loading and concatenating the system
    /// prompt files in order.
    pub async fn from_config(config: &RefineConfig) -> Result<Self> {
        let mut system_prompt = String::new();
        for path in &config.system_prompt_files {
            let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                PipelineError::Refinement(format!(
                    "cannot read system prompt {}: {e}",
                    path.display()
                ))
            })?;
            system_prompt.push_str(content.trim_end());
            system_prompt.push('\n');
        }
        let llm = create_llm(config)?;
        Ok(Self::new(llm, system_prompt, config.batch_size))
    }

    /// Build a refiner around an existing LLM client.
    pub fn new(llm: Box<dyn Llm>, system_prompt: String, batch_size: usize) -> Self {
        let mut prompt = system_prompt;
        if !prompt.is_empty() && !prompt.ends_with('\n') {
            prompt.push('\n');
        }
        prompt.push_str(PROTOCOL_INSTRUCTIONS);
        Self {
            llm,
            system_prompt: prompt,
            batch_size,
        }
    }

    /// Refine every transcript line, preserving order and count.
    pub async fn refine_all(&self, lines: &[String]) -> Result<Vec<String>> {
        let mut refined = Vec::with_capacity(lines.len());
        let total_batches = lines.len().div_ceil(self.batch_size);

        for (batch_index, batch) in lines.chunks(self.batch_size).enumerate() {
            info!(
                batch = batch_index + 1,
                total_batches,
                lines = batch.len(),
                "refining transcript batch"
            );
            let batch_refined = self.refine_batch(batch).await?;
            refined.extend(batch_refined);
        }

        Ok(refined)
    }

    async fn refine_batch(&self, batch: &[String]) -> Result<Vec<String>> {
        let numbered: Vec<String> = batch
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{}. {}", i + 1, line))
            .collect();
        let user = numbered.join("\n");

        let content = self.llm.chat(&self.system_prompt, &user).await?;
        debug!(chars = content.len(), "got refinement response");
        parse_refined(&content, batch.len())
    }
}

/// Parse a refinement response and enforce the batch-size contract.
fn parse_refined(content: &str, expected: usize) -> Result<Vec<String>> {
    let batch: RefinedBatch = serde_json::from_str(content).map_err(|e| {
        PipelineError::Refinement(format!("response is not the expected JSON shape: {e}"))
    })?;

    if batch.lines.len() != expected {
        return Err(PipelineError::Refinement(format!(
            "batch size mismatch: sent {expected} lines, got {} back",
            batch.lines.len()
        )));
    }

    Ok(batch
        .lines
        .into_iter()
        .map(|line| line.trim().to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Echoes each input line uppercased, honoring the JSON protocol.
    struct UppercaseLlm {
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Llm for UppercaseLlm {
        async fn chat(&self, _system: &str, user: &str) -> Result<String> {
            self.calls.lock().unwrap().push(user.to_string());
            let lines: Vec<String> = user
                .lines()
                .map(|l| {
                    let text = l.splitn(2, ". ").nth(1).unwrap_or(l);
                    text.to_uppercase()
                })
                .collect();
            Ok(serde_json::to_string(&serde_json::json!({ "lines": lines })).unwrap())
        }
    }

    /// Always drops the last line of the batch.
    struct LossyLlm;

    #[async_trait]
    impl Llm for LossyLlm {
        async fn chat(&self, _system: &str, user: &str) -> Result<String> {
            let mut lines: Vec<&str> = user.lines().collect();
            lines.pop();
            Ok(serde_json::to_string(&serde_json::json!({ "lines": lines })).unwrap())
        }
    }

    fn lines(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("line {i}")).collect()
    }

    #[tokio::test]
    async fn refines_in_order_across_batches() {
        let llm = Box::new(UppercaseLlm {
            calls: Arc::new(Mutex::new(Vec::new())),
        });
        let refiner = Refiner::new(llm, String::new(), 50);
        let refined = refiner.refine_all(&lines(120)).await.unwrap();

        assert_eq!(refined.len(), 120);
        assert_eq!(refined[0], "LINE 0");
        assert_eq!(refined[119], "LINE 119");
    }

    #[tokio::test]
    async fn batches_are_numbered_from_one() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let llm = UppercaseLlm {
            calls: Arc::clone(&calls),
        };
        let refiner = Refiner::new(Box::new(llm), "rules".to_string(), 2);
        refiner.refine_all(&lines(3)).await.unwrap();

        // Two batches: [0,1] and [2]; numbering restarts per batch.
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], "1. line 0\n2. line 1");
        assert_eq!(calls[1], "1. line 2");
    }

    #[tokio::test]
    async fn count_mismatch_is_a_refinement_error() {
        let refiner = Refiner::new(Box::new(LossyLlm), String::new(), 50);
        let err = refiner.refine_all(&lines(10)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Refinement(_)));
    }

    #[test]
    fn rejects_non_json_responses() {
        let err = parse_refined("1. fixed line", 1).unwrap_err();
        assert!(matches!(err, PipelineError::Refinement(_)));
    }

    #[test]
    fn parses_and_trims_refined_lines() {
        let refined = parse_refined(r#"{"lines": ["  a ", "b"]}"#, 2).unwrap();
        assert_eq!(refined, vec!["a", "b"]);
    }
}
