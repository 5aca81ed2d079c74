use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// ffmpeg/ffprobe wrappers for the media operations the pipeline delegates:
/// duration probing, silence detection, chunk cutting and audio extraction.
#[derive(Debug, Clone)]
pub struct MediaToolkit {
    /// silencedetect noise floor in dBFS.
    pub noise_floor_db: i32,
    /// Minimum silence length in seconds before a mark is emitted.
    pub min_silence: f64,
}

impl Default for MediaToolkit {
    fn default() -> Self {
        Self {
            noise_floor_db: -20,
            min_silence: 0.5,
        }
    }
}

impl MediaToolkit {
    /// Total duration of an audio file in seconds, via ffprobe.
    pub async fn probe_duration(&self, audio: &Path) -> Result<f64> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
            ])
            .arg(audio)
            .output()
            .await
            .map_err(|e| PipelineError::Media(format!("failed to spawn ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(PipelineError::Media(format!(
                "ffprobe failed for {}",
                audio.display()
            )));
        }

        let duration = parse_probe_duration(&output.stdout).ok_or_else(|| {
            PipelineError::Media(format!("no parseable duration in {}", audio.display()))
        })?;
        debug!(duration, path = %audio.display(), "probed duration");
        Ok(duration)
    }

    /// Detect silence marks (seconds where a silent stretch ends), via
    /// ffmpeg silencedetect.
    pub async fn detect_silences(&self, audio: &Path) -> Result<Vec<f64>> {
        let filter = format!(
            "silencedetect=noise={}dB:d={}",
            self.noise_floor_db, self.min_silence
        );
        let output = Command::new("ffmpeg")
            .arg("-i")
            .arg(audio)
            .args(["-af", &filter, "-f", "null", "-"])
            .output()
            .await
            .map_err(|e| PipelineError::Media(format!("failed to spawn ffmpeg: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let marks = parse_silence_marks(&stderr);
        info!(count = marks.len(), path = %audio.display(), "detected silence marks");
        Ok(marks)
    }

    /// Cut an audio file at the given points without re-encoding.
    ///
    /// Produces `cut_points.len() + 1` files named `{stem}_part{i}.mp3`
    /// (1-based), the last one covering everything past the final cut.
    pub async fn cut_at(
        &self,
        audio: &Path,
        cut_points: &[f64],
        out_dir: &Path,
        stem: &str,
    ) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|e| PipelineError::Media(format!("cannot create {}: {e}", out_dir.display())))?;

        let mut chunk_paths = Vec::with_capacity(cut_points.len() + 1);
        let mut start = 0.0;

        for (i, &end) in cut_points.iter().enumerate() {
            let chunk = out_dir.join(format!("{stem}_part{}.mp3", i + 1));
            self.run_cut(audio, &chunk, start, Some(end)).await?;
            chunk_paths.push(chunk);
            start = end;
        }

        // Trailing remainder: everything after the last cut point.
        let chunk = out_dir.join(format!("{stem}_part{}.mp3", cut_points.len() + 1));
        self.run_cut(audio, &chunk, start, None).await?;
        chunk_paths.push(chunk);

        info!(chunks = chunk_paths.len(), "audio cut complete");
        Ok(chunk_paths)
    }

    async fn run_cut(
        &self,
        audio: &Path,
        out: &Path,
        start: f64,
        end: Option<f64>,
    ) -> Result<()> {
        // Chunks survive across runs; cutting is deterministic for fixed
        // cut points, so an existing file is reused.
        if out.exists() {
            debug!(out = %out.display(), "chunk already cut, skipping");
            return Ok(());
        }
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-i")
            .arg(audio)
            .args(["-ss", &format_clock(start)]);
        if let Some(end) = end {
            cmd.args(["-to", &format_clock(end)]);
        }
        cmd.args(["-c", "copy", "-y"]).arg(out);

        let status = cmd
            .status()
            .await
            .map_err(|e| PipelineError::Media(format!("failed to spawn ffmpeg: {e}")))?;
        if !status.success() {
            return Err(PipelineError::Media(format!(
                "ffmpeg cut failed for {}",
                out.display()
            )));
        }
        debug!(start, ?end, out = %out.display(), "wrote chunk");
        Ok(())
    }

    /// Pull the audio track out of a video container.
    pub async fn extract_audio(&self, video: &Path, out_audio: &Path) -> Result<()> {
        let status = Command::new("ffmpeg")
            .arg("-i")
            .arg(video)
            .args(["-q:a", "0", "-map", "a", "-y"])
            .arg(out_audio)
            .status()
            .await
            .map_err(|e| PipelineError::Media(format!("failed to spawn ffmpeg: {e}")))?;

        if !status.success() {
            return Err(PipelineError::Media(format!(
                "audio extraction failed for {}",
                video.display()
            )));
        }
        info!(out = %out_audio.display(), "extracted audio track");
        Ok(())
    }
}

/// Pull `format.duration` out of ffprobe's JSON output.
fn parse_probe_duration(stdout: &[u8]) -> Option<f64> {
    let probe: serde_json::Value = serde_json::from_slice(stdout).ok()?;
    probe["format"]["duration"].as_str()?.parse().ok()
}

/// Parse `silence_end:` marks from ffmpeg silencedetect stderr output.
fn parse_silence_marks(stderr: &str) -> Vec<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"silence_end: (\d+(?:\.\d+)?)").unwrap());

    stderr
        .lines()
        .filter_map(|line| re.captures(line))
        .filter_map(|caps| caps[1].parse().ok())
        .collect()
}

/// Format seconds as an ffmpeg clock argument (`HH:MM:SS.mmm`).
pub fn format_clock(seconds: f64) -> String {
    let millis = (seconds * 1000.0).floor() as u64 % 1000;
    let total = seconds.floor() as u64;
    let (hours, rest) = (total / 3600, total % 3600);
    let (minutes, secs) = (rest / 60, rest % 60);
    format!("{hours:02}:{minutes:02}:{secs:02}.{millis:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_silence_marks_from_stderr() {
        let stderr = "\
[silencedetect @ 0x7f9] silence_start: 12.234\n\
[silencedetect @ 0x7f9] silence_end: 13.011 | silence_duration: 0.777\n\
frame= 1000 fps=0.0 q=-0.0 size=N/A\n\
[silencedetect @ 0x7f9] silence_start: 298.9\n\
[silencedetect @ 0x7f9] silence_end: 299.8 | silence_duration: 0.9\n";
        assert_eq!(parse_silence_marks(stderr), vec![13.011, 299.8]);
    }

    #[test]
    fn silence_parse_ignores_noise_lines() {
        assert!(parse_silence_marks("nothing relevant here\n").is_empty());
    }

    #[test]
    fn parses_probe_duration_json() {
        let json = br#"{"format": {"filename": "a.mp3", "duration": "1234.567"}}"#;
        assert_eq!(parse_probe_duration(json), Some(1234.567));
        assert_eq!(parse_probe_duration(br#"{"format": {}}"#), None);
        assert_eq!(parse_probe_duration(b"not json"), None);
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(0.0), "00:00:00.000");
        assert_eq!(format_clock(299.8), "00:04:59.800");
        assert_eq!(format_clock(3725.25), "01:02:05.250");
    }
}
