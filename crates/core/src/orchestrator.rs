use crate::answer::answer;
use crate::artifact::{IndexArtifact, IndexBuilder, IndexLoader};
use crate::chunking::ChunkingConfig;
use crate::embeddings::Embedder;
use crate::index::MergedIndex;
use crate::ingest::{chunk_batch, discover_documents, SkippedDocument, SourceFile};
use crate::models::{Chunk, DocumentFingerprint, RagOptions, RetrievalResult};
use crate::retriever::Retriever;
use crate::traits::{Generator, ObjectStore};
use crate::{IngestError, SearchError};
use std::path::Path;
use tracing::{info, warn};

const PREVIEW_CHUNKS: usize = 2;

#[derive(Debug)]
pub struct IngestionReport {
    pub artifact: IndexArtifact,
    pub documents: Vec<DocumentFingerprint>,
    pub skipped: Vec<SkippedDocument>,
    /// The first chunks of the batch, for operator inspection.
    pub preview: Vec<Chunk>,
}

#[derive(Debug, Clone)]
pub struct GroundedAnswer {
    pub question: String,
    pub answer: String,
    pub sources: RetrievalResult,
}

/// Wires the index store, embedder and generator into the ingestion and
/// query paths. Holds no index state of its own.
pub struct RagCoordinator<S, E, G>
where
    S: ObjectStore,
    E: Embedder,
    G: Generator,
{
    store: S,
    embedder: E,
    generator: G,
    options: RagOptions,
    chunking: ChunkingConfig,
}

impl<S, E, G> RagCoordinator<S, E, G>
where
    S: ObjectStore,
    E: Embedder,
    G: Generator,
{
    /// Fails on invalid chunking or retrieval options, before any document
    /// is read.
    pub fn new(
        store: S,
        embedder: E,
        generator: G,
        options: RagOptions,
    ) -> Result<Self, IngestError> {
        options.validate()?;
        let chunking = ChunkingConfig::try_from(&options)?;
        Ok(Self {
            store,
            embedder,
            generator,
            options,
            chunking,
        })
    }

    pub fn options(&self) -> &RagOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Chunks and embeds every source, then writes exactly one artifact for
    /// the whole batch.
    pub async fn ingest(&self, sources: &[SourceFile]) -> Result<IngestionReport, IngestError> {
        let batch = chunk_batch(sources, self.chunking);

        if batch.chunks.is_empty() {
            warn!(
                documents = sources.len(),
                skipped = batch.skipped.len(),
                "ingestion batch has no extractable text"
            );
            return Err(IngestError::EmptyBatch);
        }

        let artifact = IndexBuilder::new(&self.store, &self.embedder, &self.options.key_prefix)
            .build(&batch.chunks, &batch.documents)
            .await?;

        info!(
            artifact_id = artifact.handle.identifier(),
            documents = batch.documents.len(),
            skipped = batch.skipped.len(),
            chunks = batch.chunks.len(),
            "ingestion batch complete"
        );

        Ok(IngestionReport {
            artifact,
            documents: batch.documents,
            skipped: batch.skipped,
            preview: batch.chunks.into_iter().take(PREVIEW_CHUNKS).collect(),
        })
    }

    /// Reads the given files; unreadable files are skipped like unparseable
    /// ones.
    pub async fn ingest_paths(
        &self,
        paths: &[impl AsRef<Path>],
    ) -> Result<IngestionReport, IngestError> {
        let mut sources = Vec::with_capacity(paths.len());
        let mut unreadable = Vec::new();

        for path in paths {
            let path = path.as_ref();
            match SourceFile::read(path).await {
                Ok(source) => sources.push(source),
                Err(error) => {
                    warn!(path = %path.display(), reason = %error, "skipping unreadable document");
                    unreadable.push(SkippedDocument {
                        name: path.display().to_string(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        let mut report = self.ingest(&sources).await?;
        unreadable.append(&mut report.skipped);
        report.skipped = unreadable;
        Ok(report)
    }

    pub async fn ingest_folder(&self, folder: &Path) -> Result<IngestionReport, IngestError> {
        let files = discover_documents(folder);
        if files.is_empty() {
            warn!(folder = %folder.display(), "no supported documents found");
            return Err(IngestError::EmptyBatch);
        }
        self.ingest_paths(&files).await
    }

    /// Loads and merges every artifact currently in the store. The session
    /// is a snapshot; open a new one to see later ingestions.
    pub async fn open_session(&self) -> Result<QuerySession<'_, E, G>, SearchError> {
        let index = IndexLoader::new(&self.store, &self.options.key_prefix)
            .load_all()
            .await?;

        for artifact in index.artifacts() {
            if artifact.embedding_model != self.embedder.model_id() {
                warn!(
                    artifact_id = %artifact.identifier,
                    artifact_model = %artifact.embedding_model,
                    query_model = self.embedder.model_id(),
                    "artifact was embedded with a different model"
                );
            }
        }

        Ok(QuerySession {
            index,
            embedder: &self.embedder,
            generator: &self.generator,
            top_k: self.options.top_k,
        })
    }
}

/// One query session over a merged snapshot of the index store.
pub struct QuerySession<'a, E, G>
where
    E: Embedder,
    G: Generator,
{
    index: MergedIndex,
    embedder: &'a E,
    generator: &'a G,
    top_k: usize,
}

impl<'a, E, G> QuerySession<'a, E, G>
where
    E: Embedder,
    G: Generator,
{
    pub fn index(&self) -> &MergedIndex {
        &self.index
    }

    pub async fn search(&self, query: &str) -> Result<RetrievalResult, SearchError> {
        self.search_top(query, self.top_k).await
    }

    pub async fn search_top(&self, query: &str, k: usize) -> Result<RetrievalResult, SearchError> {
        Retriever::new(self.embedder).search(&self.index, query, k).await
    }

    pub async fn ask(&self, question: &str) -> Result<GroundedAnswer, SearchError> {
        if question.trim().is_empty() {
            return Err(SearchError::Request("question is empty".to_string()));
        }

        let sources = self.search(question).await?;
        let text = answer(&sources, question, self.generator).await?;

        Ok(GroundedAnswer {
            question: question.to_string(),
            answer: text,
            sources,
        })
    }
}
