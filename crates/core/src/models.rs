use crate::error::IngestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentFingerprint {
    pub document_id: String,
    pub title: String,
    pub source_path: String,
    pub checksum: String,
    pub page_count: usize,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub document_id: String,
    /// 1-based page number within the source document.
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub fingerprint: DocumentFingerprint,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn id(&self) -> &str {
        &self.fingerprint.document_id
    }

    pub fn has_text(&self) -> bool {
        self.pages.iter().any(|page| !page.text.is_empty())
    }
}

/// A contiguous slice of one page's text; the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub page_number: u32,
    /// Character offset of the chunk start within its page.
    pub offset: usize,
    /// Position of the chunk within its ingestion batch.
    pub chunk_index: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub artifact_id: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    pub query: String,
    /// Ordered by descending score.
    pub hits: Vec<RetrievedChunk>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.hits.iter().map(|hit| hit.chunk.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RagOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    /// Logical folder inside the index store holding the artifacts. A
    /// missing trailing `/` is added when keys are built.
    pub key_prefix: String,
}

impl Default for RagOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            key_prefix: String::new(),
        }
    }
}

impl RagOptions {
    pub fn validate(&self) -> Result<(), IngestError> {
        crate::chunking::ChunkingConfig::new(self.chunk_size, self.chunk_overlap)?;
        if self.top_k == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "top_k must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
