use std::fmt;
use std::path::Path;

use anyhow::Result;

use crate::reconcile::Segment;

/// One SubRip subtitle entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SrtEntry {
    /// 1-based sequential number.
    pub index: usize,
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    /// Subtitle text.
    pub text: String,
}

impl fmt::Display for SrtEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{} --> {}\n{}\n",
            self.index,
            format_timestamp(self.start),
            format_timestamp(self.end),
            self.text.trim()
        )
    }
}

/// Renders reconciled segments as an SRT document.
#[derive(Debug, Default)]
pub struct SrtWriter {
    entries: Vec<SrtEntry>,
}

impl SrtWriter {
    /// Build a writer from globally-timed segments, indexing them in order.
    pub fn from_segments(segments: &[Segment]) -> Self {
        let entries = segments
            .iter()
            .enumerate()
            .map(|(i, segment)| SrtEntry {
                index: i + 1,
                start: segment.start,
                end: segment.end,
                text: segment.text.clone(),
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the full SRT document.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        tokio::fs::write(path.as_ref(), self.render()).await?;
        Ok(())
    }
}

/// Format seconds as an SRT timestamp (`HH:MM:SS,mmm`).
///
/// Milliseconds truncate rather than round so an entry never appears to
/// start after the following one.
pub fn format_timestamp(seconds: f64) -> String {
    let millis = (seconds * 1000.0).floor() as u64 % 1000;
    let total = seconds.floor() as u64;
    let (hours, rest) = (total / 3600, total % 3600);
    let (minutes, secs) = (rest / 60, rest % 60);
    format!("{hours:02}:{minutes:02}:{secs:02},{millis:03}")
}
