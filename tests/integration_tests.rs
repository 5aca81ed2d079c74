use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use srt_gen::config::Config;
use srt_gen::error::{PipelineError, Result as CoreResult};
use srt_gen::llm::{Llm, Refiner};
use srt_gen::pipeline::Pipeline;
use srt_gen::reconcile::{reconcile_segments, Segment};
use srt_gen::segmenter::Segmenter;
use srt_gen::srt::SrtWriter;
use srt_gen::transcription::Transcriber;
use srt_gen::{MemoryTranscriptStore, TranscriptStore};

/// Hands out canned chunk-local segments keyed by the `_partN` suffix of
/// the chunk filename, and counts how often it gets called.
struct CannedTranscriber {
    calls: AtomicUsize,
    fail_first: usize,
}

impl CannedTranscriber {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        }
    }

    fn failing_first(n: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first: n,
        }
    }
}

#[async_trait]
impl Transcriber for CannedTranscriber {
    async fn transcribe(
        &self,
        chunk: &Path,
        _language: Option<&str>,
        _prompt: Option<&str>,
    ) -> CoreResult<Vec<Segment>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(PipelineError::Transcription("service flaked".to_string()));
        }

        let name = chunk.file_stem().unwrap().to_string_lossy();
        let part: usize = name.rsplit("_part").next().unwrap().parse().unwrap();
        Ok(match part {
            1 => vec![Segment::new(0.0, 10.0, "first chunk")],
            2 => vec![Segment::new(5.0, 15.0, "second chunk")],
            3 => vec![Segment::new(2.0, 8.0, "third chunk")],
            _ => Vec::new(),
        })
    }
}

/// Honors the refinement protocol, prefixing every line.
struct PrefixLlm;

#[async_trait]
impl Llm for PrefixLlm {
    async fn chat(&self, _system: &str, user: &str) -> CoreResult<String> {
        let lines: Vec<String> = user
            .lines()
            .map(|l| format!("refined {}", l.splitn(2, ". ").nth(1).unwrap()))
            .collect();
        Ok(serde_json::json!({ "lines": lines }).to_string())
    }
}

fn chunk_paths(n: usize) -> Vec<PathBuf> {
    (1..=n)
        .map(|i| PathBuf::from(format!("/tmp/fake/talk_part{i}.mp3")))
        .collect()
}

fn test_pipeline(transcriber: Arc<dyn Transcriber>, refiner: Option<Refiner>) -> Pipeline {
    Pipeline::with_backends(Config::default(), transcriber, refiner)
}

#[tokio::test]
async fn segmenter_to_srt_end_to_end() {
    // Cut-point selection from the silence list, then the rest of the
    // pipeline against fakes.
    let segmenter = Segmenter::new(300.0);
    let silences = vec![298.0, 299.8, 600.1, 601.0];
    let cut_points = segmenter.compute_cut_points(1000.0, &silences).unwrap();
    assert_eq!(cut_points, vec![299.8, 600.1]);

    let pipeline = test_pipeline(Arc::new(CannedTranscriber::new()), None);
    let store = Arc::new(MemoryTranscriptStore::default());
    let per_chunk = pipeline
        .transcribe_chunks(&chunk_paths(3), store)
        .await
        .unwrap();

    let segments = reconcile_segments(per_chunk, &cut_points, 1000.0).unwrap();
    let spans: Vec<(f64, f64)> = segments.iter().map(|s| (s.start, s.end)).collect();
    assert_eq!(
        spans,
        vec![(0.0, 10.0), (304.8, 314.8), (602.1, 608.1)]
    );

    let srt = SrtWriter::from_segments(&segments).render();
    assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:10,000\nfirst chunk\n"));
    assert!(srt.contains("2\n00:05:04,800 --> 00:05:14,800\nsecond chunk\n"));
    assert!(srt.contains("3\n00:10:02,100 --> 00:10:08,100\nthird chunk\n"));
}

#[tokio::test]
async fn cached_chunks_skip_the_service() {
    let transcriber = Arc::new(CannedTranscriber::new());
    let pipeline = test_pipeline(transcriber.clone(), None);

    let store = Arc::new(MemoryTranscriptStore::default());
    // Chunk 2 was fetched by an earlier run.
    store
        .store(2, &[Segment::new(5.0, 15.0, "second chunk")])
        .await
        .unwrap();

    let per_chunk = pipeline
        .transcribe_chunks(&chunk_paths(3), store)
        .await
        .unwrap();

    // Only chunks 1 and 3 hit the service.
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 2);

    // Cached data reconciles exactly like fresh data.
    let segments = reconcile_segments(per_chunk, &[300.0, 620.0], 1000.0).unwrap();
    let starts: Vec<f64> = segments.iter().map(|s| s.start).collect();
    assert_eq!(starts, vec![0.0, 305.0, 622.0]);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    // Default config allows 2 retries; the first two calls fail.
    let transcriber = Arc::new(CannedTranscriber::failing_first(2));
    let pipeline = test_pipeline(transcriber, None);

    let store = Arc::new(MemoryTranscriptStore::default());
    let per_chunk = pipeline
        .transcribe_chunks(&chunk_paths(1), store.clone())
        .await
        .unwrap();

    assert_eq!(per_chunk.len(), 1);
    // The successful result was persisted for the next run.
    assert!(store.load(1).await.unwrap().is_some());
}

#[tokio::test]
async fn persistent_failure_aborts_but_keeps_progress() {
    let transcriber = Arc::new(CannedTranscriber::failing_first(100));
    let mut config = Config::default();
    config.performance.max_workers = 1;
    let pipeline = Pipeline::with_backends(config, transcriber, None);

    let store = Arc::new(MemoryTranscriptStore::default());
    store
        .store(1, &[Segment::new(0.0, 10.0, "first chunk")])
        .await
        .unwrap();

    let result = pipeline.transcribe_chunks(&chunk_paths(2), store.clone()).await;
    assert!(result.is_err());

    // The cached chunk is untouched; a re-run resumes from chunk 2.
    assert!(store.load(1).await.unwrap().is_some());
}

#[tokio::test]
async fn refinement_replaces_text_and_keeps_times() {
    let refiner = Refiner::new(Box::new(PrefixLlm), String::new(), 50);
    let pipeline = test_pipeline(Arc::new(CannedTranscriber::new()), Some(refiner));

    let segments = vec![
        Segment::new(0.0, 10.0, "first chunk"),
        Segment::new(305.0, 315.0, "second chunk"),
    ];
    let refined = pipeline.refine_segments(segments).await.unwrap();

    assert_eq!(refined[0].text, "refined first chunk");
    assert_eq!(refined[0].start, 0.0);
    assert_eq!(refined[1].text, "refined second chunk");
    assert_eq!(refined[1].end, 315.0);
}

#[tokio::test]
async fn full_fake_run_without_refinement_matches_manual_assembly() {
    let pipeline = test_pipeline(Arc::new(CannedTranscriber::new()), None);
    let store = Arc::new(MemoryTranscriptStore::default());

    let per_chunk = pipeline
        .transcribe_chunks(&chunk_paths(3), store)
        .await
        .unwrap();
    let segments = reconcile_segments(per_chunk, &[300.0, 620.0], 1000.0).unwrap();
    let unrefined = pipeline.refine_segments(segments.clone()).await.unwrap();

    // No refiner configured: texts pass through untouched.
    assert_eq!(unrefined, segments);
}
