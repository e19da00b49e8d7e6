use thiserror::Error;

/// Failure reported by an external collaborator (embedding service,
/// generative model, remote parser).
#[derive(Debug, Error)]
#[error("{service} call failed: {details}")]
pub struct ServiceError {
    pub service: String,
    pub details: String,
}

impl ServiceError {
    pub fn new(service: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            details: details.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document parse error: {0}")]
    DocumentParse(String),

    #[error("no extractable text in document {0}")]
    NoExtractableText(String),

    #[error("unsupported document type: {0}")]
    UnsupportedDocument(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("ingestion batch produced no chunks")]
    EmptyBatch,

    #[error("embedding dimension {actual} does not match embedder dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("index store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IngestError {
    /// Errors scoped to a single document; the rest of the batch continues.
    pub fn is_per_document(&self) -> bool {
        matches!(
            self,
            Self::DocumentParse(_)
                | Self::NoExtractableText(_)
                | Self::UnsupportedDocument(_)
                | Self::Io(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("no index artifacts found in the index store; nothing to search")]
    NoIndexFound,

    #[error("corrupt index artifact {key}: {details}")]
    CorruptIndex { key: String, details: String },

    #[error("query embedding dimension {query} does not match index dimension {index}")]
    DimensionMismatch { index: usize, query: usize },

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("index store error: {0}")]
    Store(#[from] StoreError),

    #[error("search request failed: {0}")]
    Request(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
