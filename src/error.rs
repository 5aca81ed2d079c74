use thiserror::Error;

/// Errors surfaced by the pipeline stages.
///
/// The pure core components (segmenter, reconciler, refinement validation)
/// fail fast with these variants; the orchestration layer wraps them in
/// `anyhow` context on the way out.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad or empty arguments to a core computation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Duration probing, silence detection or cutting failed, or a source
    /// file is unreadable.
    #[error("media processing failed: {0}")]
    Media(String),

    /// The per-chunk transcript cache could not be read or written.
    #[error("transcript cache failed: {0}")]
    Cache(String),

    /// The speech-to-text service failed or returned garbage.
    #[error("transcription failed: {0}")]
    Transcription(String),

    /// The refinement LLM failed or violated the batch contract.
    #[error("refinement failed: {0}")]
    Refinement(String),

    /// Internal consistency violation: segments out of range after
    /// offsetting, or chunk data that does not match the cut points.
    #[error("reconciliation failed: {0}")]
    Reconciliation(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
