//! Exact nearest-neighbour index over chunk embeddings.
//!
//! A [`FlatIndex`] is what one artifact deserializes into; a
//! [`MergedIndex`] is the union of every artifact in the store, built once
//! per query session and ranked as a whole.

use crate::error::SearchError;
use crate::models::{Chunk, RetrievedChunk};

/// Cosine similarity; zero when either vector has no magnitude.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right.iter()).map(|(a, b)| a * b).sum();
    let norm_left = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let norm_right = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm_left == 0.0 || norm_right == 0.0 {
        return 0.0;
    }
    dot / (norm_left * norm_right)
}

#[derive(Debug, Clone, PartialEq)]
struct IndexEntry {
    artifact_id: String,
    vector: Vec<f32>,
    chunk: Chunk,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
        }
    }

    /// Builds one artifact's index. Vectors and chunks pair up by position.
    pub fn from_parts(
        artifact_id: &str,
        dimension: usize,
        vectors: Vec<Vec<f32>>,
        chunks: Vec<Chunk>,
    ) -> Result<Self, SearchError> {
        if vectors.len() != chunks.len() {
            return Err(SearchError::CorruptIndex {
                key: artifact_id.to_string(),
                details: format!(
                    "{} vectors for {} chunks",
                    vectors.len(),
                    chunks.len()
                ),
            });
        }

        let mut index = Self::new(dimension);
        for (position, (vector, chunk)) in vectors.into_iter().zip(chunks).enumerate() {
            if vector.len() != dimension {
                return Err(SearchError::CorruptIndex {
                    key: artifact_id.to_string(),
                    details: format!(
                        "vector {position} has dimension {}, expected {dimension}",
                        vector.len()
                    ),
                });
            }
            index.entries.push(IndexEntry {
                artifact_id: artifact_id.to_string(),
                vector,
                chunk,
            });
        }

        Ok(index)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    /// Appends `other` after the existing entries. Positions already in the
    /// index keep their insertion order.
    pub fn merge_from(&mut self, other: FlatIndex) -> Result<(), SearchError> {
        if self.dimension != other.dimension {
            let key = other
                .entries
                .first()
                .map(|entry| entry.artifact_id.clone())
                .unwrap_or_default();
            return Err(SearchError::CorruptIndex {
                key,
                details: format!(
                    "dimension {} cannot be merged into an index of dimension {}",
                    other.dimension, self.dimension
                ),
            });
        }
        self.entries.extend(other.entries);
        Ok(())
    }

    /// The `k` most similar chunks, best first. Equal scores keep insertion
    /// order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, SearchError> {
        if k == 0 {
            return Err(SearchError::Request("k must be greater than zero".to_string()));
        }
        if query.len() != self.dimension {
            return Err(SearchError::DimensionMismatch {
                index: self.dimension,
                query: query.len(),
            });
        }

        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(&entry.vector, query), entry))
            .collect();

        scored.sort_by(|left, right| right.0.total_cmp(&left.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, entry)| RetrievedChunk {
                chunk: entry.chunk.clone(),
                score,
                artifact_id: entry.artifact_id.clone(),
            })
            .collect())
    }
}

/// An artifact left out of a merge, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptArtifact {
    pub key: String,
    pub details: String,
}

impl CorruptArtifact {
    pub fn to_error(&self) -> SearchError {
        SearchError::CorruptIndex {
            key: self.key.clone(),
            details: self.details.clone(),
        }
    }
}

/// One artifact that made it into a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedArtifact {
    pub identifier: String,
    pub embedding_model: String,
    pub chunk_count: usize,
}

#[derive(Debug, Clone)]
pub struct MergedIndex {
    index: FlatIndex,
    artifacts: Vec<MergedArtifact>,
    corrupt: Vec<CorruptArtifact>,
}

impl MergedIndex {
    pub fn new(
        index: FlatIndex,
        artifacts: Vec<MergedArtifact>,
        corrupt: Vec<CorruptArtifact>,
    ) -> Self {
        Self {
            index,
            artifacts,
            corrupt,
        }
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Merged artifacts, in merge order.
    pub fn artifacts(&self) -> &[MergedArtifact] {
        &self.artifacts
    }

    pub fn artifact_ids(&self) -> Vec<&str> {
        self.artifacts
            .iter()
            .map(|artifact| artifact.identifier.as_str())
            .collect()
    }

    pub fn corrupt_artifacts(&self) -> &[CorruptArtifact] {
        &self.corrupt
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.index.chunks()
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, SearchError> {
        self.index.search(query, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, index: u64) -> Chunk {
        Chunk {
            chunk_id: format!("chunk-{index}"),
            document_id: "doc".to_string(),
            page_number: 1,
            offset: 0,
            chunk_index: index,
            text: text.to_string(),
        }
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn search_orders_by_descending_similarity() {
        let index = FlatIndex::from_parts(
            "a",
            2,
            vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]],
            vec![chunk("north", 0), chunk("east", 1), chunk("diagonal", 2)],
        )
        .unwrap();

        let hits = index.search(&[1.0, 0.1], 3).unwrap();
        let texts: Vec<_> = hits.iter().map(|hit| hit.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["east", "diagonal", "north"]);
        assert!(hits.windows(2).all(|pair| pair[0].score >= pair[1].score));
    }

    #[test]
    fn ties_keep_insertion_order() {
        let index = FlatIndex::from_parts(
            "a",
            2,
            vec![vec![1.0, 0.0], vec![2.0, 0.0], vec![3.0, 0.0]],
            vec![chunk("first", 0), chunk("second", 1), chunk("third", 2)],
        )
        .unwrap();

        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].chunk.text, "first");
        assert_eq!(hits[1].chunk.text, "second");
    }

    #[test]
    fn k_larger_than_index_returns_everything() {
        let index = FlatIndex::from_parts("a", 1, vec![vec![1.0]], vec![chunk("only", 0)]).unwrap();
        assert_eq!(index.search(&[1.0], 10).unwrap().len(), 1);
    }

    #[test]
    fn query_dimension_mismatch_is_fatal() {
        let index =
            FlatIndex::from_parts("a", 2, vec![vec![1.0, 0.0]], vec![chunk("x", 0)]).unwrap();
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], 1),
            Err(SearchError::DimensionMismatch { index: 2, query: 3 })
        ));
    }

    #[test]
    fn mismatched_part_lengths_are_corrupt() {
        let result = FlatIndex::from_parts("a", 1, vec![vec![1.0]], Vec::new());
        assert!(matches!(result, Err(SearchError::CorruptIndex { .. })));
    }

    #[test]
    fn merge_unions_entries_and_checks_dimension() {
        let mut left = FlatIndex::from_parts("a", 1, vec![vec![1.0]], vec![chunk("A", 0)]).unwrap();
        let right = FlatIndex::from_parts("b", 1, vec![vec![0.5]], vec![chunk("B", 0)]).unwrap();
        left.merge_from(right).unwrap();
        assert_eq!(left.len(), 2);

        let other =
            FlatIndex::from_parts("c", 2, vec![vec![1.0, 1.0]], vec![chunk("C", 0)]).unwrap();
        assert!(matches!(
            left.merge_from(other),
            Err(SearchError::CorruptIndex { key, .. }) if key == "c"
        ));
        assert_eq!(left.len(), 2);
    }
}
