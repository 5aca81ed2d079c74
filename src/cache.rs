use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::reconcile::Segment;

/// Per-chunk transcript store: chunk index → segment list.
///
/// Lets repeated runs skip chunks that were already transcribed. The
/// reconciler treats cached and freshly fetched chunks identically, so the
/// store only has to hand back exactly what was put in.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Load the segments cached for a chunk, if any.
    async fn load(&self, chunk_index: usize) -> Result<Option<Vec<Segment>>>;

    /// Persist the segments for a chunk.
    async fn store(&self, chunk_index: usize, segments: &[Segment]) -> Result<()>;
}

/// On-disk cache entry. The fingerprint ties the entry to one source
/// recording so a cache directory reused across inputs is detected as
/// stale instead of producing silently wrong timestamps.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    fingerprint: String,
    segments: Vec<Segment>,
}

/// JSON-file-backed transcript store, one file per chunk.
#[derive(Debug)]
pub struct FileTranscriptStore {
    cache_dir: PathBuf,
    stem: String,
    fingerprint: String,
}

impl FileTranscriptStore {
    /// Open a store rooted at `cache_dir` for the given source recording.
    ///
    /// The fingerprint covers path, size and mtime of the source file; a
    /// re-encoded or replaced recording invalidates old entries.
    pub async fn open(cache_dir: PathBuf, source: &std::path::Path) -> Result<Self> {
        tokio::fs::create_dir_all(&cache_dir).await.map_err(|e| {
            PipelineError::Cache(format!("cannot create {}: {e}", cache_dir.display()))
        })?;

        let meta = tokio::fs::metadata(source)
            .await
            .map_err(|e| PipelineError::Media(format!("cannot stat {}: {e}", source.display())))?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let fingerprint = format!(
            "{:x}",
            md5::compute(format!("{}:{}:{}", source.display(), meta.len(), modified))
        );

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        info!(dir = %cache_dir.display(), %fingerprint, "transcript cache ready");
        Ok(Self {
            cache_dir,
            stem,
            fingerprint,
        })
    }

    fn chunk_path(&self, chunk_index: usize) -> PathBuf {
        self.cache_dir
            .join(format!("{}_chunk_{chunk_index}.json", self.stem))
    }
}

#[async_trait]
impl TranscriptStore for FileTranscriptStore {
    async fn load(&self, chunk_index: usize) -> Result<Option<Vec<Segment>>> {
        let path = self.chunk_path(chunk_index);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(_) => {
                debug!(chunk_index, "cache miss");
                return Ok(None);
            }
        };

        match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) if entry.fingerprint == self.fingerprint => {
                info!(chunk_index, count = entry.segments.len(), "cache hit");
                Ok(Some(entry.segments))
            }
            Ok(_) => {
                warn!(chunk_index, "cache entry from a different source, ignoring");
                Ok(None)
            }
            Err(e) => {
                warn!(chunk_index, "unreadable cache entry ({e}), ignoring");
                Ok(None)
            }
        }
    }

    async fn store(&self, chunk_index: usize, segments: &[Segment]) -> Result<()> {
        let entry = CacheEntry {
            fingerprint: self.fingerprint.clone(),
            segments: segments.to_vec(),
        };
        let json = serde_json::to_string_pretty(&entry)
            .map_err(|e| PipelineError::Cache(format!("cannot serialize cache entry: {e}")))?;
        let path = self.chunk_path(chunk_index);
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| PipelineError::Cache(format!("cannot write {}: {e}", path.display())))?;
        debug!(chunk_index, path = %path.display(), "cached chunk transcript");
        Ok(())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryTranscriptStore {
    chunks: Mutex<HashMap<usize, Vec<Segment>>>,
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn load(&self, chunk_index: usize) -> Result<Option<Vec<Segment>>> {
        Ok(self.chunks.lock().unwrap().get(&chunk_index).cloned())
    }

    async fn store(&self, chunk_index: usize, segments: &[Segment]) -> Result<()> {
        self.chunks
            .lock()
            .unwrap()
            .insert(chunk_index, segments.to_vec());
        Ok(())
    }
}
