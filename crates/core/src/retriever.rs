use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::index::MergedIndex;
use crate::models::RetrievalResult;

/// Top-k similarity search over a merged index. The embedder must be the one
/// the artifacts were built with.
pub struct Retriever<'a, E: ?Sized> {
    embedder: &'a E,
}

impl<'a, E> Retriever<'a, E>
where
    E: Embedder + ?Sized,
{
    pub fn new(embedder: &'a E) -> Self {
        Self { embedder }
    }

    pub async fn search(
        &self,
        index: &MergedIndex,
        query: &str,
        k: usize,
    ) -> Result<RetrievalResult, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }
        if k == 0 {
            return Err(SearchError::Request("k must be greater than zero".to_string()));
        }

        let query_vector = self.embedder.embed(query).await?;
        if query_vector.len() != index.dimension() {
            return Err(SearchError::DimensionMismatch {
                index: index.dimension(),
                query: query_vector.len(),
            });
        }

        Ok(RetrievalResult {
            query: query.to_string(),
            hits: index.search(&query_vector, k)?,
        })
    }
}
