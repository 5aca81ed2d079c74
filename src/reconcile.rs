use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Tolerance for a segment end running past the probed duration. Whisper
/// timestamps and container durations disagree by a few hundred ms.
const END_OVERSHOOT_EPSILON: f64 = 0.5;

/// One transcribed utterance.
///
/// Times are chunk-local as returned by the transcription service and
/// global after reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    /// Transcribed text.
    pub text: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// Rewrite chunk-local segment times into global-timeline coordinates and
/// merge all chunks into one time-ordered sequence.
///
/// `per_chunk` pairs a 1-based chunk index with that chunk's segments; the
/// offset for chunk `i` is `[0] ++ cut_points` at position `i - 1`. The
/// offset depends only on the chunk index and the cut points, so cached and
/// freshly fetched chunk data reconcile identically, in any input order.
pub fn reconcile_segments(
    per_chunk: Vec<(usize, Vec<Segment>)>,
    cut_points: &[f64],
    total_duration: f64,
) -> Result<Vec<Segment>> {
    let mut offsets = Vec::with_capacity(cut_points.len() + 1);
    offsets.push(0.0);
    offsets.extend_from_slice(cut_points);

    let mut merged = Vec::new();
    for (chunk_index, segments) in per_chunk {
        if chunk_index == 0 || chunk_index > offsets.len() {
            return Err(PipelineError::Reconciliation(format!(
                "chunk {} has no matching cut point (expected 1..={})",
                chunk_index,
                offsets.len()
            )));
        }
        let offset = offsets[chunk_index - 1];
        debug!(chunk_index, offset, count = segments.len(), "offsetting chunk");

        for mut segment in segments {
            segment.start += offset;
            segment.end += offset;

            if segment.start > segment.end {
                return Err(PipelineError::Reconciliation(format!(
                    "segment in chunk {} has start {:.3} after end {:.3}",
                    chunk_index, segment.start, segment.end
                )));
            }
            if segment.end > total_duration + END_OVERSHOOT_EPSILON {
                return Err(PipelineError::Reconciliation(format!(
                    "segment in chunk {} ends at {:.3}, past audio duration {:.3}; \
                     stale cache or mismatched cut points",
                    chunk_index, segment.end, total_duration
                )));
            }
            merged.push(segment);
        }
    }

    merged.sort_by(|a, b| a.start.total_cmp(&b.start));
    Ok(merged)
}
