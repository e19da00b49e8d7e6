//! Persisted index artifacts.
//!
//! An artifact is two co-located objects: `{id}.vectors` holds the embedding
//! matrix, `{id}.meta` holds the position-to-chunk table plus integrity data.
//! The vectors part is written first and the meta part last, so a meta
//! object is only ever visible for a complete artifact.

use crate::embeddings::Embedder;
use crate::error::{IngestError, SearchError, StoreError};
use crate::index::{CorruptArtifact, FlatIndex, MergedArtifact, MergedIndex};
use crate::models::{Chunk, DocumentFingerprint};
use crate::traits::ObjectStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub const VECTORS_SUFFIX: &str = ".vectors";
pub const META_SUFFIX: &str = ".meta";
pub const FORMAT_VERSION: u32 = 1;
const METRIC: &str = "cosine";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactPart {
    Vectors,
    Meta,
}

/// Turns a key prefix into a folder: a non-empty prefix always ends with
/// `/`, so `idx` never lists the artifacts of `idx2`.
pub fn folder_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

/// Both object keys of one artifact, derived from a single identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactHandle {
    prefix: String,
    identifier: String,
}

impl ArtifactHandle {
    pub fn new(prefix: &str, identifier: impl Into<String>) -> Self {
        Self {
            prefix: folder_prefix(prefix),
            identifier: identifier.into(),
        }
    }

    pub fn generate(prefix: &str) -> Self {
        Self::new(prefix, uuid::Uuid::new_v4().to_string())
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn vectors_key(&self) -> String {
        format!("{}{}{VECTORS_SUFFIX}", self.prefix, self.identifier)
    }

    pub fn meta_key(&self) -> String {
        format!("{}{}{META_SUFFIX}", self.prefix, self.identifier)
    }

    pub fn key(&self, part: ArtifactPart) -> String {
        match part {
            ArtifactPart::Vectors => self.vectors_key(),
            ArtifactPart::Meta => self.meta_key(),
        }
    }

    /// Recognises artifact keys under `prefix`. Anything else in the store
    /// (or a nested folder below the prefix) is not an artifact part.
    pub fn parse_key(prefix: &str, key: &str) -> Option<(Self, ArtifactPart)> {
        let prefix = folder_prefix(prefix);
        let name = key.strip_prefix(prefix.as_str())?;
        let (identifier, part) = if let Some(id) = name.strip_suffix(VECTORS_SUFFIX) {
            (id, ArtifactPart::Vectors)
        } else if let Some(id) = name.strip_suffix(META_SUFFIX) {
            (id, ArtifactPart::Meta)
        } else {
            return None;
        };

        if identifier.is_empty() || identifier.contains('/') {
            return None;
        }
        Some((Self::new(&prefix, identifier), part))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorsPart {
    format_version: u32,
    metric: String,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

/// Side table of an artifact: everything needed to map a vector position
/// back to its chunk, plus what is needed to validate the vectors part.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactMeta {
    pub format_version: u32,
    pub identifier: String,
    pub created_at: DateTime<Utc>,
    pub dimension: usize,
    pub embedding_model: String,
    pub vectors_sha256: String,
    pub documents: Vec<DocumentFingerprint>,
    pub chunks: Vec<Chunk>,
}

/// What the merge keeps of a decoded meta part once its chunks have moved
/// into the index.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedArtifact {
    pub identifier: String,
    pub created_at: DateTime<Utc>,
    pub embedding_model: String,
}

/// Summary of an artifact that was written to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexArtifact {
    pub handle: ArtifactHandle,
    pub created_at: DateTime<Utc>,
    pub dimension: usize,
    pub chunk_count: usize,
    pub embedding_model: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Serializes an artifact into its `(vectors, meta)` objects.
pub fn encode_artifact(
    identifier: &str,
    created_at: DateTime<Utc>,
    embedding_model: &str,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    chunks: &[Chunk],
    documents: &[DocumentFingerprint],
) -> Result<(Vec<u8>, Vec<u8>), serde_json::Error> {
    let vectors_bytes = serde_json::to_vec(&VectorsPart {
        format_version: FORMAT_VERSION,
        metric: METRIC.to_string(),
        dimension,
        vectors,
    })?;

    let meta = ArtifactMeta {
        format_version: FORMAT_VERSION,
        identifier: identifier.to_string(),
        created_at,
        dimension,
        embedding_model: embedding_model.to_string(),
        vectors_sha256: sha256_hex(&vectors_bytes),
        documents: documents.to_vec(),
        chunks: chunks.to_vec(),
    };
    let meta_bytes = serde_json::to_vec(&meta)?;

    Ok((vectors_bytes, meta_bytes))
}

/// Validates and deserializes both parts of one artifact.
pub fn decode_artifact(
    handle: &ArtifactHandle,
    vectors_bytes: &[u8],
    meta_bytes: &[u8],
) -> Result<(LoadedArtifact, FlatIndex), SearchError> {
    let corrupt = |key: String, details: String| SearchError::CorruptIndex { key, details };

    let meta: ArtifactMeta = serde_json::from_slice(meta_bytes)
        .map_err(|error| corrupt(handle.meta_key(), error.to_string()))?;

    if meta.format_version != FORMAT_VERSION {
        return Err(corrupt(
            handle.meta_key(),
            format!("unsupported format version {}", meta.format_version),
        ));
    }
    if meta.identifier != handle.identifier() {
        return Err(corrupt(
            handle.meta_key(),
            format!("meta belongs to artifact {}", meta.identifier),
        ));
    }
    if meta.vectors_sha256 != sha256_hex(vectors_bytes) {
        return Err(corrupt(
            handle.vectors_key(),
            "checksum does not match the meta part".to_string(),
        ));
    }

    let vectors: VectorsPart = serde_json::from_slice(vectors_bytes)
        .map_err(|error| corrupt(handle.vectors_key(), error.to_string()))?;

    if vectors.metric != METRIC || vectors.dimension != meta.dimension {
        return Err(corrupt(
            handle.vectors_key(),
            format!(
                "vectors part is {} / {} dims, meta expects {METRIC} / {} dims",
                vectors.metric, vectors.dimension, meta.dimension
            ),
        ));
    }

    let ArtifactMeta {
        identifier,
        created_at,
        dimension,
        embedding_model,
        chunks,
        ..
    } = meta;

    let index = FlatIndex::from_parts(handle.identifier(), dimension, vectors.vectors, chunks)
        .map_err(|error| match error {
            SearchError::CorruptIndex { details, .. } => corrupt(handle.vectors_key(), details),
            other => other,
        })?;

    let loaded = LoadedArtifact {
        identifier,
        created_at,
        embedding_model,
    };
    Ok((loaded, index))
}

/// Embeds a batch of chunks and persists the result as one artifact.
pub struct IndexBuilder<'a, S: ?Sized, E: ?Sized> {
    store: &'a S,
    embedder: &'a E,
    key_prefix: &'a str,
}

impl<'a, S, E> IndexBuilder<'a, S, E>
where
    S: ObjectStore + ?Sized,
    E: Embedder + ?Sized,
{
    pub fn new(store: &'a S, embedder: &'a E, key_prefix: &'a str) -> Self {
        Self {
            store,
            embedder,
            key_prefix,
        }
    }

    pub async fn build(
        &self,
        chunks: &[Chunk],
        documents: &[DocumentFingerprint],
    ) -> Result<IndexArtifact, IngestError> {
        if chunks.is_empty() {
            return Err(IngestError::EmptyBatch);
        }

        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        if vectors.len() != chunks.len() {
            return Err(IngestError::Service(crate::error::ServiceError::new(
                "embedder",
                format!(
                    "embedding count {} doesn't match chunk count {}",
                    vectors.len(),
                    chunks.len()
                ),
            )));
        }

        let dimension = self.embedder.dimensions();
        if let Some(vector) = vectors.iter().find(|vector| vector.len() != dimension) {
            return Err(IngestError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }

        let handle = ArtifactHandle::generate(self.key_prefix);
        let created_at = Utc::now();
        let (vectors_bytes, meta_bytes) = encode_artifact(
            handle.identifier(),
            created_at,
            self.embedder.model_id(),
            dimension,
            vectors,
            chunks,
            documents,
        )?;

        self.store.put(&handle.vectors_key(), vectors_bytes).await?;
        self.store.put(&handle.meta_key(), meta_bytes).await?;

        info!(
            artifact_id = handle.identifier(),
            chunk_count = chunks.len(),
            dimension,
            "index artifact written"
        );

        Ok(IndexArtifact {
            handle,
            created_at,
            dimension,
            chunk_count: chunks.len(),
            embedding_model: self.embedder.model_id().to_string(),
        })
    }
}

#[derive(Debug, Default)]
struct KeyPair {
    vectors: Option<String>,
    meta: Option<String>,
}

/// Fetches every artifact under a prefix and merges them into one index.
pub struct IndexLoader<'a, S: ?Sized> {
    store: &'a S,
    key_prefix: String,
}

impl<'a, S> IndexLoader<'a, S>
where
    S: ObjectStore + ?Sized,
{
    pub fn new(store: &'a S, key_prefix: &'a str) -> Self {
        Self {
            store,
            key_prefix: folder_prefix(key_prefix),
        }
    }

    /// Lists the store and groups keys into artifact handles. Keys missing
    /// their counterpart are returned separately as corrupt.
    pub async fn discover(
        &self,
    ) -> Result<(Vec<ArtifactHandle>, Vec<CorruptArtifact>), SearchError> {
        let keys = self.store.list(&self.key_prefix).await?;

        let mut pairs: BTreeMap<ArtifactHandle, KeyPair> = BTreeMap::new();
        for key in keys {
            let Some((handle, part)) = ArtifactHandle::parse_key(&self.key_prefix, &key) else {
                debug!(key, "ignoring non-artifact key");
                continue;
            };
            let pair = pairs.entry(handle).or_default();
            match part {
                ArtifactPart::Vectors => pair.vectors = Some(key),
                ArtifactPart::Meta => pair.meta = Some(key),
            }
        }

        let has_vectors = pairs.values().any(|pair| pair.vectors.is_some());
        let has_meta = pairs.values().any(|pair| pair.meta.is_some());
        if !has_vectors || !has_meta {
            return Err(SearchError::NoIndexFound);
        }

        let mut complete = Vec::new();
        let mut corrupt = Vec::new();
        for (handle, pair) in pairs {
            match (pair.vectors, pair.meta) {
                (Some(_), Some(_)) => complete.push(handle),
                (Some(orphan), None) => corrupt.push(CorruptArtifact {
                    key: orphan,
                    details: format!("missing counterpart {}", handle.meta_key()),
                }),
                (None, Some(orphan)) => corrupt.push(CorruptArtifact {
                    key: orphan,
                    details: format!("missing counterpart {}", handle.vectors_key()),
                }),
                (None, None) => {}
            }
        }

        Ok((complete, corrupt))
    }

    async fn fetch(
        &self,
        handle: &ArtifactHandle,
    ) -> Result<(LoadedArtifact, FlatIndex), SearchError> {
        let vectors = self.fetch_part(handle, ArtifactPart::Vectors).await?;
        let meta = self.fetch_part(handle, ArtifactPart::Meta).await?;
        decode_artifact(handle, &vectors, &meta)
    }

    async fn fetch_part(
        &self,
        handle: &ArtifactHandle,
        part: ArtifactPart,
    ) -> Result<Vec<u8>, SearchError> {
        let key = handle.key(part);
        match self.store.get(&key).await {
            Ok(bytes) => Ok(bytes),
            Err(StoreError::NotFound(_)) => Err(SearchError::CorruptIndex {
                key,
                details: "listed but no longer readable".to_string(),
            }),
            Err(error) => Err(SearchError::Store(error)),
        }
    }

    /// Loads every artifact and merges them before any ranking happens.
    ///
    /// Corrupt artifacts are excluded and reported on the returned index. If
    /// nothing valid remains, the first corruption is returned as the error.
    pub async fn load_all(&self) -> Result<MergedIndex, SearchError> {
        let (handles, mut corrupt) = self.discover().await?;

        let mut loaded = Vec::new();
        for handle in handles {
            match self.fetch(&handle).await {
                Ok(artifact) => loaded.push(artifact),
                Err(SearchError::CorruptIndex { key, details }) => {
                    corrupt.push(CorruptArtifact { key, details })
                }
                Err(error) => return Err(error),
            }
        }

        // Fixed merge order keeps rank ties independent of listing order.
        loaded.sort_by(|(left, _), (right, _)| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.identifier.cmp(&right.identifier))
        });

        let mut merged: Option<FlatIndex> = None;
        let mut artifacts = Vec::new();
        for (meta, index) in loaded {
            let handle = ArtifactHandle::new(&self.key_prefix, meta.identifier.clone());
            let chunk_count = index.len();
            let result = match merged.as_mut() {
                Some(target) => target.merge_from(index),
                None => {
                    merged = Some(index);
                    Ok(())
                }
            };

            match result {
                Ok(()) => artifacts.push(MergedArtifact {
                    identifier: meta.identifier,
                    embedding_model: meta.embedding_model,
                    chunk_count,
                }),
                Err(SearchError::CorruptIndex { details, .. }) => corrupt.push(CorruptArtifact {
                    key: handle.vectors_key(),
                    details,
                }),
                Err(error) => return Err(error),
            }
        }

        for artifact in &corrupt {
            warn!(
                key = %artifact.key,
                details = %artifact.details,
                "excluding corrupt index artifact"
            );
        }

        let Some(index) = merged else {
            return Err(corrupt
                .first()
                .map(CorruptArtifact::to_error)
                .unwrap_or(SearchError::NoIndexFound));
        };

        info!(
            artifacts = artifacts.len(),
            chunks = index.len(),
            excluded = corrupt.len(),
            "merged index loaded"
        );

        Ok(MergedIndex::new(index, artifacts, corrupt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::stores::MemoryObjectStore;

    fn chunk(text: &str, index: u64) -> Chunk {
        Chunk {
            chunk_id: format!("chunk-{index}"),
            document_id: "doc-1".to_string(),
            page_number: 1,
            offset: 0,
            chunk_index: index,
            text: text.to_string(),
        }
    }

    #[test]
    fn handle_keys_share_identifier() {
        let handle = ArtifactHandle::new("indexes/", "abc");
        assert_eq!(handle.vectors_key(), "indexes/abc.vectors");
        assert_eq!(handle.meta_key(), "indexes/abc.meta");
    }

    #[test]
    fn parse_key_recognises_only_artifact_parts() {
        assert_eq!(
            ArtifactHandle::parse_key("", "abc.vectors"),
            Some((ArtifactHandle::new("", "abc"), ArtifactPart::Vectors))
        );
        assert_eq!(
            ArtifactHandle::parse_key("p/", "p/abc.meta"),
            Some((ArtifactHandle::new("p/", "abc"), ArtifactPart::Meta))
        );
        assert_eq!(ArtifactHandle::parse_key("", "abc.pdf"), None);
        assert_eq!(ArtifactHandle::parse_key("", ".meta"), None);
        assert_eq!(ArtifactHandle::parse_key("", "nested/abc.meta"), None);
        assert_eq!(ArtifactHandle::parse_key("p/", "q/abc.meta"), None);
    }

    #[test]
    fn prefix_without_slash_becomes_a_folder() {
        assert_eq!(folder_prefix(""), "");
        assert_eq!(folder_prefix("idx"), "idx/");
        assert_eq!(folder_prefix("idx/"), "idx/");
        assert_eq!(ArtifactHandle::new("idx", "abc").meta_key(), "idx/abc.meta");
        assert_eq!(ArtifactHandle::parse_key("idx", "idx2/abc.meta"), None);
    }

    #[tokio::test]
    async fn sibling_prefix_artifacts_are_not_listed() {
        let store = MemoryObjectStore::new();
        let embedder = CharacterNgramEmbedder { dimensions: 8 };
        let artifact = IndexBuilder::new(&store, &embedder, "idx2")
            .build(&[chunk("alpha", 0)], &[])
            .await
            .unwrap();
        assert!(artifact.handle.vectors_key().starts_with("idx2/"));

        let result = IndexLoader::new(&store, "idx").load_all().await;
        assert!(matches!(result, Err(SearchError::NoIndexFound)));

        let merged = IndexLoader::new(&store, "idx2").load_all().await.unwrap();
        assert_eq!(merged.len(), 1);
        assert!(merged.corrupt_artifacts().is_empty());
        assert_eq!(merged.artifacts()[0].chunk_count, 1);
    }

    #[tokio::test]
    async fn empty_batch_writes_nothing() {
        let store = MemoryObjectStore::new();
        let embedder = CharacterNgramEmbedder::default();
        let builder = IndexBuilder::new(&store, &embedder, "");

        let result = builder.build(&[], &[]).await;
        assert!(matches!(result, Err(IngestError::EmptyBatch)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn build_writes_both_parts_under_one_identifier() {
        let store = MemoryObjectStore::new();
        let embedder = CharacterNgramEmbedder::default();
        let builder = IndexBuilder::new(&store, &embedder, "");

        let artifact = builder
            .build(&[chunk("alpha", 0), chunk("beta", 1)], &[])
            .await
            .expect("build should succeed");

        let keys = store.list("").await.unwrap();
        assert_eq!(
            keys,
            vec![artifact.handle.meta_key(), artifact.handle.vectors_key()]
        );
        assert_eq!(artifact.chunk_count, 2);
        assert_eq!(artifact.dimension, embedder.dimensions());
    }

    #[tokio::test]
    async fn tampered_vectors_fail_the_checksum() {
        let store = MemoryObjectStore::new();
        let embedder = CharacterNgramEmbedder { dimensions: 8 };
        let artifact = IndexBuilder::new(&store, &embedder, "")
            .build(&[chunk("alpha", 0)], &[])
            .await
            .unwrap();

        let meta = store.get(&artifact.handle.meta_key()).await.unwrap();
        let mut vectors = store.get(&artifact.handle.vectors_key()).await.unwrap();
        vectors.push(b' ');

        let result = decode_artifact(&artifact.handle, &vectors, &meta);
        assert!(matches!(
            result,
            Err(SearchError::CorruptIndex { key, .. }) if key == artifact.handle.vectors_key()
        ));
    }

    #[tokio::test]
    async fn meta_from_another_artifact_is_rejected() {
        let store = MemoryObjectStore::new();
        let embedder = CharacterNgramEmbedder { dimensions: 8 };
        let builder = IndexBuilder::new(&store, &embedder, "");
        let first = builder.build(&[chunk("alpha", 0)], &[]).await.unwrap();
        let second = builder.build(&[chunk("beta", 0)], &[]).await.unwrap();

        let vectors = store.get(&first.handle.vectors_key()).await.unwrap();
        let meta = store.get(&second.handle.meta_key()).await.unwrap();

        assert!(matches!(
            decode_artifact(&first.handle, &vectors, &meta),
            Err(SearchError::CorruptIndex { .. })
        ));
    }

    #[tokio::test]
    async fn empty_store_has_no_index() {
        let store = MemoryObjectStore::new();
        let result = IndexLoader::new(&store, "").load_all().await;
        assert!(matches!(result, Err(SearchError::NoIndexFound)));
    }

    #[tokio::test]
    async fn only_vectors_keys_means_no_index() {
        let store = MemoryObjectStore::new();
        store.put("abc.vectors", b"{}".to_vec()).await.unwrap();
        let result = IndexLoader::new(&store, "").load_all().await;
        assert!(matches!(result, Err(SearchError::NoIndexFound)));
    }

    #[tokio::test]
    async fn unreadable_meta_is_reported_when_nothing_else_loads() {
        let store = MemoryObjectStore::new();
        store.put("abc.vectors", b"{}".to_vec()).await.unwrap();
        store.put("abc.meta", b"not json".to_vec()).await.unwrap();

        let result = IndexLoader::new(&store, "").load_all().await;
        assert!(matches!(
            result,
            Err(SearchError::CorruptIndex { key, .. }) if key == "abc.meta"
        ));
    }

    #[tokio::test]
    async fn mismatched_dimension_artifact_is_excluded() {
        let store = MemoryObjectStore::new();
        let small = CharacterNgramEmbedder { dimensions: 8 };
        let large = CharacterNgramEmbedder { dimensions: 16 };

        let first = IndexBuilder::new(&store, &small, "")
            .build(&[chunk("alpha", 0)], &[])
            .await
            .unwrap();
        let second = IndexBuilder::new(&store, &large, "")
            .build(&[chunk("beta", 0)], &[])
            .await
            .unwrap();

        let merged = IndexLoader::new(&store, "").load_all().await.unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.corrupt_artifacts().len(), 1);

        let kept = merged.artifact_ids()[0].to_string();
        let excluded = if kept == first.handle.identifier() {
            second.handle.vectors_key()
        } else {
            first.handle.vectors_key()
        };
        assert_eq!(merged.corrupt_artifacts()[0].key, excluded);
    }
}
