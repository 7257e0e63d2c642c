//! Vector index contract and in-process implementation.
//!
//! The vector database is an external collaborator; this module defines the
//! schema and query contract the pipeline relies on, plus a small exact-scan
//! in-memory index used by tests and as a zero-dependency fallback.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::document::Chunk;
use crate::error::RagError;

use super::mmr::{mmr_rerank, MmrPolicy};

// ============================================================================
// Types
// ============================================================================

/// The tuple stored in the index: a chunk and its embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// One retrieval hit. The vector is carried along so diversity reranking
/// does not need a second round trip to the index.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub vector: Option<Vec<f32>>,
}

/// Nearest-neighbor selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Plain cosine ranking; scores non-increasing.
    Similarity,
    /// MMR reranking over an over-fetched candidate pool, so near-duplicate
    /// chunks do not crowd out distinct ones.
    Diversity,
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// Storage backend contract: insert and query, nothing more.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserts or overwrites records, idempotent by chunk id.
    /// Returns the number of records written.
    async fn upsert(&self, records: Vec<EmbeddingRecord>) -> Result<usize, RagError>;

    /// Returns up to `k` scored chunks for the query vector.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        mode: QueryMode,
    ) -> Result<Vec<ScoredChunk>, RagError>;

    /// Number of records in the collection.
    async fn count(&self) -> Result<usize, RagError>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Cosine similarity between two vectors, 0.0 for mismatched or empty input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

// ============================================================================
// MemoryVectorIndex
// ============================================================================

/// Exact cosine-scan index held in process memory.
///
/// Not meant for large collections; exists so the pipeline and its tests can
/// run without a Qdrant instance.
pub struct MemoryVectorIndex {
    records: RwLock<HashMap<Uuid, EmbeddingRecord>>,
    mmr: MmrPolicy,
}

impl MemoryVectorIndex {
    pub fn new(mmr: MmrPolicy) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            mmr,
        }
    }
}

impl Default for MemoryVectorIndex {
    fn default() -> Self {
        Self::new(MmrPolicy::default())
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, records: Vec<EmbeddingRecord>) -> Result<usize, RagError> {
        let mut store = self.records.write().await;
        let written = records.len();
        for record in records {
            store.insert(record.chunk.id, record);
        }
        Ok(written)
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        mode: QueryMode,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        if k == 0 {
            return Ok(vec![]);
        }

        let store = self.records.read().await;
        let mut scored: Vec<ScoredChunk> = store
            .values()
            .map(|record| ScoredChunk {
                chunk: record.chunk.clone(),
                score: cosine_similarity(vector, &record.vector),
                vector: Some(record.vector.clone()),
            })
            .collect();
        drop(store);

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        match mode {
            QueryMode::Similarity => {
                scored.truncate(k);
                Ok(scored)
            }
            QueryMode::Diversity => {
                scored.truncate(k.saturating_mul(self.mmr.fetch_multiplier.max(1)));
                Ok(mmr_rerank(vector, scored, k, self.mmr.lambda))
            }
        }
    }

    async fn count(&self) -> Result<usize, RagError> {
        Ok(self.records.read().await.len())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{SourceMetadata, SourceType};

    fn record(text: &str, position: usize, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            chunk: Chunk {
                id: Uuid::new_v4(),
                parent_document_id: Uuid::nil(),
                text: text.to_string(),
                position_index: position,
                metadata: SourceMetadata {
                    source_type: SourceType::Text,
                    source_identifier: "test".to_string(),
                    page_number: None,
                },
            },
            vector,
        }
    }

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_empty_or_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_memory_index_query_empty_collection() {
        let index = MemoryVectorIndex::default();
        let results = index
            .query(&[1.0, 0.0], 5, QueryMode::Similarity)
            .await
            .expect("query must not fail on empty collection");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_memory_index_similarity_scores_non_increasing() {
        let index = MemoryVectorIndex::default();
        index
            .upsert(vec![
                record("close", 0, vec![0.9, 0.1]),
                record("far", 1, vec![0.0, 1.0]),
                record("closest", 2, vec![1.0, 0.0]),
            ])
            .await
            .expect("upsert");

        let results = index
            .query(&[1.0, 0.0], 3, QueryMode::Similarity)
            .await
            .expect("query");

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk.text, "closest");
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_memory_index_upsert_idempotent_by_chunk_id() {
        let index = MemoryVectorIndex::default();
        let mut rec = record("original", 0, vec![1.0, 0.0]);
        let id = rec.chunk.id;
        index.upsert(vec![rec.clone()]).await.expect("first upsert");

        rec.vector = vec![0.0, 1.0];
        rec.chunk.id = id;
        index.upsert(vec![rec]).await.expect("second upsert");

        assert_eq!(index.count().await.expect("count"), 1);
        let results = index
            .query(&[0.0, 1.0], 1, QueryMode::Similarity)
            .await
            .expect("query");
        assert!(results[0].score > 0.99, "re-upsert must overwrite the vector");
    }

    #[tokio::test]
    async fn test_memory_index_diversity_includes_distinct_chunk() {
        let index = MemoryVectorIndex::default();
        // k near-duplicates plus one distinct chunk.
        let mut records = vec![];
        for i in 0..3 {
            records.push(record(&format!("dup {}", i), i, vec![1.0, 0.001 * i as f32, 0.0]));
        }
        records.push(record("distinct", 3, vec![0.3, 0.0, 0.95]));
        index.upsert(records).await.expect("upsert");

        let results = index
            .query(&[1.0, 0.0, 0.0], 3, QueryMode::Diversity)
            .await
            .expect("query");

        assert_eq!(results.len(), 3);
        assert!(
            results.iter().any(|r| r.chunk.text == "distinct"),
            "diversity mode must surface the distinct chunk"
        );
    }
}
