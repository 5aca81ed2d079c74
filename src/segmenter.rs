use tracing::debug;

use crate::error::{PipelineError, Result};

/// Cut-point computation for splitting a long recording into chunks that
/// stay near a target span without cutting mid-utterance.
///
/// Cuts are biased toward detected silence marks; a hard cut at
/// `current + target_span` is the fallback when no usable silence exists
/// ahead of the current boundary.
#[derive(Debug, Clone)]
pub struct Segmenter {
    /// Desired chunk length in seconds.
    pub target_span: f64,
}

impl Segmenter {
    pub fn new(target_span: f64) -> Self {
        Self { target_span }
    }

    /// Compute the ordered cut points for a recording.
    ///
    /// Returns a strictly increasing sequence of offsets in seconds. The
    /// implicit first boundary is 0 and the implicit last boundary is
    /// `duration`; the trailing remainder never gets an explicit cut point.
    ///
    /// The loop stops once less than `1.5 * target_span` of audio remains,
    /// so the final chunk is never shorter than half the target span.
    pub fn compute_cut_points(&self, duration: f64, silences: &[f64]) -> Result<Vec<f64>> {
        if !(duration > 0.0) {
            return Err(PipelineError::InvalidInput(format!(
                "audio duration must be positive, got {duration}"
            )));
        }
        if !(self.target_span > 0.0) {
            return Err(PipelineError::InvalidInput(format!(
                "target span must be positive, got {}",
                self.target_span
            )));
        }
        if silences.is_empty() {
            return Err(PipelineError::InvalidInput(
                "no silence marks detected; cannot choose cut boundaries".to_string(),
            ));
        }

        let mut cut_points = Vec::new();
        let mut current = 0.0;

        while current + 1.5 * self.target_span < duration {
            let target = current + self.target_span;
            let mut cut = closest_silence(silences, target);

            if cut <= current || cut >= duration {
                // Nearest silence is behind the boundary we just placed or
                // past the end of the recording; fall back to a hard cut.
                // The loop guard keeps current + target_span below duration.
                cut = (current + self.target_span).min(duration);
                debug!(target_time = target, cut, "no usable silence ahead, hard cut");
            } else {
                debug!(target_time = target, cut, "cut at silence mark");
            }

            cut_points.push(cut);
            current = cut;
        }

        Ok(cut_points)
    }
}

/// Silence mark with the minimal absolute distance to `target`.
///
/// Ties resolve to the first mark encountered, so equidistant marks pick
/// the lower value.
fn closest_silence(silences: &[f64], target: f64) -> f64 {
    let mut best = silences[0];
    let mut best_dist = (best - target).abs();
    for &mark in &silences[1..] {
        let dist = (mark - target).abs();
        if dist < best_dist {
            best = mark;
            best_dist = dist;
        }
    }
    best
}
