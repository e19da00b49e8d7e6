pub mod answer;
pub mod artifact;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod retriever;
pub mod stores;
pub mod traits;

pub use answer::{answer, build_prompt, OllamaGenerator};
pub use artifact::{
    folder_prefix, ArtifactHandle, ArtifactMeta, ArtifactPart, IndexArtifact, IndexBuilder,
    IndexLoader, LoadedArtifact,
};
pub use chunking::{build_chunks, chunk_text, split, ChunkingConfig};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IngestError, SearchError, ServiceError, StoreError};
pub use extractor::{parser_for, DocumentParser, PageText, PdfParser, PlainTextParser};
pub use index::{CorruptArtifact, FlatIndex, MergedArtifact, MergedIndex};
pub use ingest::{
    chunk_batch, discover_documents, parse_document, ChunkedBatch, SkippedDocument, SourceFile,
};
pub use models::{
    Chunk, Document, DocumentFingerprint, Page, RagOptions, RetrievalResult, RetrievedChunk,
};
pub use orchestrator::{GroundedAnswer, IngestionReport, QuerySession, RagCoordinator};
pub use retriever::Retriever;
pub use stores::{LocalObjectStore, MemoryObjectStore};
pub use traits::{Generator, ObjectStore};
