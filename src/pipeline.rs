use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::cache::{FileTranscriptStore, TranscriptStore};
use crate::config::Config;
use crate::llm::Refiner;
use crate::media::MediaToolkit;
use crate::reconcile::{reconcile_segments, Segment};
use crate::segmenter::Segmenter;
use crate::srt::SrtWriter;
use crate::transcription::{OpenAiTranscriber, Transcriber};

/// Summary of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub duration_seconds: f64,
    pub chunk_count: usize,
    pub segment_count: usize,
    pub refined: bool,
    pub srt_path: PathBuf,
    pub elapsed: Duration,
}

/// End-to-end orchestration: probe → segment → cut → transcribe →
/// reconcile → refine → write SRT.
///
/// The stages around the pure core are I/O-bound; chunk transcription runs
/// in parallel under a worker cap while segmentation and reconciliation
/// stay synchronous.
pub struct Pipeline {
    config: Config,
    media: MediaToolkit,
    transcriber: Arc<dyn Transcriber>,
    refiner: Option<Refiner>,
}

impl Pipeline {
    /// Build a pipeline with the real service backends from config.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let transcriber = Arc::new(OpenAiTranscriber::new(config.transcription.clone())?);
        let refiner = if config.refine.enabled {
            Some(Refiner::from_config(&config.refine).await?)
        } else {
            None
        };
        Ok(Self::with_backends(config, transcriber, refiner))
    }

    /// Build a pipeline around injected backends. Used by tests to run the
    /// full flow against fakes.
    pub fn with_backends(
        config: Config,
        transcriber: Arc<dyn Transcriber>,
        refiner: Option<Refiner>,
    ) -> Self {
        let media = MediaToolkit {
            noise_floor_db: config.audio.noise_floor_db,
            min_silence: config.audio.min_silence_seconds,
        };
        Self {
            config,
            media,
            transcriber,
            refiner,
        }
    }

    /// Run the whole pipeline for one recording, writing the SRT to
    /// `srt_out`.
    pub async fn run(&self, audio: &Path, srt_out: &Path) -> Result<PipelineReport> {
        let started = Instant::now();

        info!(audio = %audio.display(), "starting pipeline");
        let duration = self.media.probe_duration(audio).await?;
        let silences = self.media.detect_silences(audio).await?;

        let segmenter = Segmenter::new(self.config.audio.target_span_seconds);
        let cut_points = segmenter.compute_cut_points(duration, &silences)?;
        info!(
            duration,
            cuts = cut_points.len(),
            "computed cut points"
        );

        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let chunk_dir = self.config.output.work_dir.join("chunks");
        let chunk_paths = self
            .media
            .cut_at(audio, &cut_points, &chunk_dir, &stem)
            .await?;

        let store = FileTranscriptStore::open(
            self.config.output.work_dir.join("transcripts"),
            audio,
        )
        .await?;
        let per_chunk = self
            .transcribe_chunks(&chunk_paths, Arc::new(store))
            .await?;

        let mut segments = reconcile_segments(per_chunk, &cut_points, duration)?;
        info!(segments = segments.len(), "reconciled global timeline");

        let refined = self.refiner.is_some();
        segments = self.refine_segments(segments).await?;

        let writer = SrtWriter::from_segments(&segments);
        writer
            .save(srt_out)
            .await
            .with_context(|| format!("writing {}", srt_out.display()))?;
        info!(srt = %srt_out.display(), entries = writer.len(), "wrote subtitles");

        Ok(PipelineReport {
            duration_seconds: duration,
            chunk_count: chunk_paths.len(),
            segment_count: segments.len(),
            refined,
            srt_path: srt_out.to_path_buf(),
            elapsed: started.elapsed(),
        })
    }

    /// Transcribe all chunks, skipping ones already in the store.
    ///
    /// Chunk indices are 1-based to match the cut order; results arrive in
    /// index order regardless of task completion order.
    pub async fn transcribe_chunks(
        &self,
        chunk_paths: &[PathBuf],
        store: Arc<dyn TranscriptStore>,
    ) -> Result<Vec<(usize, Vec<Segment>)>> {
        let language = self.config.transcription.language.clone();
        let prompt = match &self.config.transcription.prompt_file {
            Some(path) => Some(
                tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading prompt file {}", path.display()))?,
            ),
            None => None,
        };

        let semaphore = Arc::new(Semaphore::new(self.config.performance.max_workers));
        let mut tasks = Vec::with_capacity(chunk_paths.len());

        for (i, chunk_path) in chunk_paths.iter().enumerate() {
            let chunk_index = i + 1;
            let chunk_path = chunk_path.clone();
            let language = language.clone();
            let prompt = prompt.clone();
            let transcriber = Arc::clone(&self.transcriber);
            let store = Arc::clone(&store);
            let semaphore = Arc::clone(&semaphore);
            let max_retries = self.config.transcription.max_retries;

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");

                if let Some(cached) = store.load(chunk_index).await? {
                    return Ok::<_, anyhow::Error>((chunk_index, cached));
                }

                let mut attempt = 0;
                let segments = loop {
                    match transcriber
                        .transcribe(&chunk_path, language.as_deref(), prompt.as_deref())
                        .await
                    {
                        Ok(segments) => break segments,
                        Err(e) if attempt < max_retries => {
                            attempt += 1;
                            warn!(
                                chunk_index,
                                attempt, "transcription failed, retrying: {e}"
                            );
                        }
                        Err(e) => return Err(e.into()),
                    }
                };

                store.store(chunk_index, &segments).await?;
                Ok((chunk_index, segments))
            }));
        }

        let joined = futures::future::try_join_all(tasks)
            .await
            .map_err(|e| anyhow!("transcription task panicked: {e}"))?;
        let mut per_chunk = joined.into_iter().collect::<Result<Vec<_>>>()?;
        per_chunk.sort_by_key(|(index, _)| *index);
        Ok(per_chunk)
    }

    /// Run the LLM cleanup over the segment texts, keeping timestamps.
    ///
    /// No-op when refinement is disabled. The refiner guarantees the
    /// refined line count matches, so texts map back 1:1.
    pub async fn refine_segments(&self, segments: Vec<Segment>) -> Result<Vec<Segment>> {
        let Some(refiner) = &self.refiner else {
            return Ok(segments);
        };
        if segments.is_empty() {
            return Ok(segments);
        }

        let texts: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();
        let refined = refiner.refine_all(&texts).await?;

        Ok(segments
            .into_iter()
            .zip(refined)
            .map(|(segment, text)| Segment { text, ..segment })
            .collect())
    }
}
