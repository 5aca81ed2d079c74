use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the SRT generation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Segmentation and silence detection settings
    pub audio: AudioConfig,

    /// Speech-to-text service settings
    pub transcription: TranscriptionConfig,

    /// LLM transcript refinement settings
    pub refine: RefineConfig,

    /// Working/output directory settings
    pub output: OutputConfig,

    /// Parallelism settings
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Target chunk length in seconds
    pub target_span_seconds: f64,

    /// silencedetect noise floor in dBFS
    pub noise_floor_db: i32,

    /// Minimum silence length in seconds
    pub min_silence_seconds: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            target_span_seconds: 300.0,
            noise_floor_db: -20,
            min_silence_seconds: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// API endpoint for the transcription service
    pub endpoint: String,

    /// API key for the transcription service
    pub api_key: Option<String>,

    /// Model to use for transcription
    pub model: String,

    /// Language hint passed to the service
    pub language: Option<String>,

    /// Path to a domain prompt file fed to the service
    pub prompt_file: Option<PathBuf>,

    /// Maximum retries for failed transcription requests
    pub max_retries: u32,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
            language: Some("zh".to_string()),
            prompt_file: None,
            max_retries: 2,
            timeout_seconds: 300,
        }
    }
}

/// LLM provider types for refinement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    LmStudio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineConfig {
    /// Enable the LLM refinement pass
    pub enabled: bool,

    /// LLM provider to use
    pub provider: LlmProvider,

    /// API endpoint (for LMStudio and other local servers)
    pub endpoint: Option<String>,

    /// API key (for cloud providers)
    pub api_key: Option<String>,

    /// Model to use
    pub model: String,

    /// Temperature for generation (0.0 = deterministic)
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Number of transcript lines per refinement request
    pub batch_size: usize,

    /// System prompt files, concatenated in order
    pub system_prompt_files: Vec<PathBuf>,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: LlmProvider::OpenAi,
            endpoint: None,
            api_key: None,
            model: "gpt-4o".to_string(),
            temperature: 0.2,
            timeout_seconds: 120,
            batch_size: 50,
            system_prompt_files: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Working directory for chunks and cached transcripts
    pub work_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./work"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Maximum number of concurrent transcription requests
    pub max_workers: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get().min(4),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, falling back
    /// to defaults plus environment overrides.
    pub fn load() -> Result<Self> {
        let config_paths = ["srt-gen.toml", "config/srt-gen.toml"];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Self>(&config_str) {
                    Ok(mut config) => {
                        tracing::info!("loaded configuration from {path}");
                        config.apply_env();
                        return Ok(config);
                    }
                    Err(e) => {
                        return Err(anyhow!("failed to parse config file {path}: {e}"));
                    }
                }
            }
        }

        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Override settings from environment variables. Credentials are only
    /// ever taken from the environment, never written to config files.
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if self.transcription.api_key.is_none() {
                self.transcription.api_key = Some(key.clone());
            }
            if self.refine.api_key.is_none() {
                self.refine.api_key = Some(key);
            }
        }
        if let Ok(workers) = std::env::var("SRT_GEN_WORKERS") {
            if let Ok(workers) = workers.parse() {
                self.performance.max_workers = workers;
            }
        }
        if let Ok(span) = std::env::var("SRT_GEN_TARGET_SPAN") {
            if let Ok(span) = span.parse() {
                self.audio.target_span_seconds = span;
            }
        }
        if let Ok(dir) = std::env::var("SRT_GEN_WORK_DIR") {
            self.output.work_dir = PathBuf::from(dir);
        }
    }

    /// Validate configuration before the pipeline starts.
    pub fn validate(&self) -> Result<()> {
        if self.audio.target_span_seconds <= 0.0 {
            return Err(anyhow!("target_span_seconds must be positive"));
        }
        if self.audio.min_silence_seconds <= 0.0 {
            return Err(anyhow!("min_silence_seconds must be positive"));
        }
        if self.performance.max_workers == 0 {
            return Err(anyhow!("max_workers must be greater than 0"));
        }
        if self.refine.batch_size == 0 {
            return Err(anyhow!("refine batch_size must be greater than 0"));
        }
        if self.transcription.api_key.is_none() {
            return Err(anyhow!(
                "transcription API key missing (set OPENAI_API_KEY or transcription.api_key)"
            ));
        }
        if self.refine.enabled
            && self.refine.provider == LlmProvider::OpenAi
            && self.refine.api_key.is_none()
        {
            return Err(anyhow!("refinement API key missing for the OpenAI provider"));
        }
        Ok(())
    }
}
