use crate::chunking::{build_chunks, ChunkingConfig};
use crate::extractor::{parser_for, DocumentParser, SUPPORTED_EXTENSIONS};
use crate::models::{Chunk, Document, DocumentFingerprint, Page};
use crate::IngestError;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Raw bytes of one uploaded file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub source_path: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub async fn read(path: &Path) -> Result<Self, IngestError> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                IngestError::DocumentParse(format!("path has no file name: {}", path.display()))
            })?;

        Ok(Self {
            name: name.to_string(),
            source_path: path.to_string_lossy().to_string(),
            bytes,
        })
    }
}

pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let supported = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|candidate| ext.eq_ignore_ascii_case(candidate))
            });

        if supported {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Parses one file into a document with a fresh identifier. A document
/// without any text is an error, never an empty document.
pub fn parse_document(
    source: &SourceFile,
    parser: &dyn DocumentParser,
) -> Result<Document, IngestError> {
    let document_id = uuid::Uuid::new_v4().to_string();
    let pages: Vec<Page> = parser
        .parse(&source.name, &source.bytes)?
        .into_iter()
        .map(|page| Page {
            document_id: document_id.clone(),
            number: page.number,
            text: page.text,
        })
        .collect();

    let document = Document {
        fingerprint: DocumentFingerprint {
            document_id,
            title: source.name.clone(),
            source_path: source.source_path.clone(),
            checksum: digest_bytes(&source.bytes),
            page_count: pages.len(),
            ingested_at: Utc::now(),
        },
        pages,
    };

    if !document.has_text() {
        return Err(IngestError::NoExtractableText(source.name.clone()));
    }

    Ok(document)
}

#[derive(Debug, Clone)]
pub struct SkippedDocument {
    pub name: String,
    pub reason: String,
}

/// Every chunk of a batch plus the documents that could not contribute.
#[derive(Debug, Default)]
pub struct ChunkedBatch {
    pub documents: Vec<DocumentFingerprint>,
    pub chunks: Vec<Chunk>,
    pub skipped: Vec<SkippedDocument>,
}

/// Parses and chunks each file in order. Per-document failures are recorded
/// and the rest of the batch continues.
pub fn chunk_batch(sources: &[SourceFile], config: ChunkingConfig) -> ChunkedBatch {
    let mut batch = ChunkedBatch::default();
    let mut cursor = 0u64;

    for source in sources {
        let parsed = parser_for(Path::new(&source.name))
            .and_then(|parser| parse_document(source, &*parser));

        match parsed {
            Ok(document) => {
                let (chunks, next_cursor) = build_chunks(&document.pages, config, cursor);
                cursor = next_cursor;
                batch.chunks.extend(chunks);
                batch.documents.push(document.fingerprint);
            }
            Err(error) => {
                warn!(document = %source.name, reason = %error, "skipping document");
                batch.skipped.push(SkippedDocument {
                    name: source.name.clone(),
                    reason: error.to_string(),
                });
            }
        }
    }

    batch
}
