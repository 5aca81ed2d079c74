/// srt-gen
///
/// Turns a long audio recording into a refined SRT transcript: silence-aware
/// chunking, parallel speech-to-text over the chunks, timestamp
/// reconciliation onto the global timeline, batched LLM cleanup of the raw
/// transcript text.

pub mod cache;
pub mod config;
pub mod error;
pub mod llm;
pub mod media;
pub mod pipeline;
pub mod reconcile;
pub mod segmenter;
pub mod srt;
pub mod transcription;

// Re-export main types for easy access
pub use crate::cache::{FileTranscriptStore, MemoryTranscriptStore, TranscriptStore};
pub use crate::config::Config;
pub use crate::error::PipelineError;
pub use crate::llm::{Llm, Refiner};
pub use crate::media::MediaToolkit;
pub use crate::pipeline::{Pipeline, PipelineReport};
pub use crate::reconcile::{reconcile_segments, Segment};
pub use crate::segmenter::Segmenter;
pub use crate::srt::{SrtEntry, SrtWriter};
pub use crate::transcription::{OpenAiTranscriber, Transcriber};
