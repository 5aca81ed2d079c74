pub mod openai;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::reconcile::Segment;

pub use openai::OpenAiTranscriber;

/// Speech-to-text boundary: one audio chunk in, chunk-local segments out.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a single audio chunk. Returned segment times are local
    /// to the chunk; the reconciler shifts them onto the global timeline.
    async fn transcribe(
        &self,
        chunk: &Path,
        language: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<Vec<Segment>>;
}
