//! Query-time retrieval.
//!
//! Embeds the query, asks the index for a diversity-aware result set,
//! deduplicates overlapping hits and returns them ranked. An empty or
//! unreachable collection is "no context", never an error.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::RagError;

use super::vector::{ScoredChunk, VectorIndex};

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    /// Returns up to `top_k` deduplicated chunks for the query, best first.
    ///
    /// A blank query or an empty/unreachable collection yields `Ok(vec![])`;
    /// only an embedding failure aborts the request.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>, RagError> {
        if query.trim().is_empty() {
            return Ok(vec![]);
        }

        let query_vector = self.embedder.embed(query).await?;

        let results = match self
            .index
            .query(&query_vector, self.config.top_k, self.config.mode)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!("Vector index unreachable during retrieval: {e}");
                return Ok(vec![]);
            }
        };

        let mut deduped = dedup_by_position(results);
        deduped.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(deduped)
    }
}

/// Drops hits that point at the same `(parent_document_id, position_index)`,
/// keeping the higher-scored one. The index can return such overlaps when
/// the same source was ingested more than once.
fn dedup_by_position(mut results: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut seen = HashSet::new();
    results.retain(|r| seen.insert((r.chunk.parent_document_id, r.chunk.position_index)));
    results
}

// ============================================================================
// Tests
// ============================================================================
