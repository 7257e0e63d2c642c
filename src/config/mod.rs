//! Pipeline configuration.
//!
//! Every policy choice (chunk sizes, retrieval depth, MMR balance, context
//! budget, crawl bounds) lives here rather than being hard-coded, and the
//! collection identity is explicit configuration instead of ambient state.

use crate::knowledge::QueryMode;

/// Default Qdrant endpoint when `QDRANT_URL` is unset.
const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";

/// Default collection name when `MINDVAULT_COLLECTION` is unset.
const DEFAULT_COLLECTION: &str = "mindvault";

// ============================================================================
// Chunking
// ============================================================================

/// Chunking policy, measured in characters.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum chunk length.
    pub max_chars: usize,
    /// Characters of trailing context repeated at the start of the next chunk.
    pub overlap_chars: usize,
    /// How far before `max_chars` the chunker may pull a break back to land
    /// on a paragraph or sentence boundary.
    pub boundary_window: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            overlap_chars: 200,
            boundary_window: 150,
        }
    }
}

// ============================================================================
// Retrieval
// ============================================================================

/// Retrieval policy.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Number of chunks returned per query.
    pub top_k: usize,
    /// Similarity or diversity-aware (MMR) selection.
    pub mode: QueryMode,
    /// MMR balance: 1.0 = pure relevance, 0.0 = pure diversity.
    pub mmr_lambda: f32,
    /// Over-fetch multiplier for the MMR candidate pool.
    pub fetch_multiplier: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 7,
            mode: QueryMode::Diversity,
            mmr_lambda: 0.5,
            fetch_multiplier: 3,
        }
    }
}

// ============================================================================
// Crawling
// ============================================================================

/// Bounds for the same-origin web crawl.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum link depth from the seed (0 = seed page only).
    pub max_depth: usize,
    /// Path segments that must never be followed.
    pub exclude: Vec<String>,
    /// Pages whose cleaned text is shorter than this are discarded as noise.
    pub min_page_chars: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            exclude: vec![
                "admin".to_string(),
                "login".to_string(),
                "cart".to_string(),
            ],
            min_page_chars: 100,
        }
    }
}

// ============================================================================
// Embedding
// ============================================================================

/// Batching policy for the embedding provider.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Maximum texts per provider call.
    pub max_batch: usize,
    /// Batches in flight concurrently during one ingestion.
    pub fan_out: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            max_batch: 100,
            fan_out: 4,
        }
    }
}

// ============================================================================
// RagConfig
// ============================================================================

/// Full pipeline configuration.
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// The single logical document collection this pipeline reads and writes.
    pub collection: String,
    /// Qdrant endpoint base URL.
    pub qdrant_url: String,
    /// Qdrant API key, if the cluster requires one.
    pub qdrant_api_key: Option<String>,
    pub chunking: ChunkConfig,
    pub retrieval: RetrievalConfig,
    pub crawl: CrawlConfig,
    pub embedding: EmbeddingConfig,
    /// Maximum assembled context size, in characters.
    pub context_budget_chars: usize,
    /// Rewrite free-form text input with the generator before chunking.
    pub normalize_text_input: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            qdrant_api_key: None,
            chunking: ChunkConfig::default(),
            retrieval: RetrievalConfig::default(),
            crawl: CrawlConfig::default(),
            embedding: EmbeddingConfig::default(),
            context_budget_chars: 6000,
            normalize_text_input: true,
        }
    }
}

impl RagConfig {
    /// Defaults overridden by `QDRANT_URL`, `QDRANT_API_KEY` and
    /// `MINDVAULT_COLLECTION` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("QDRANT_URL") {
            if !url.is_empty() {
                config.qdrant_url = url;
            }
        }

        if let Ok(key) = std::env::var("QDRANT_API_KEY") {
            if !key.is_empty() {
                config.qdrant_api_key = Some(key);
            }
        }

        if let Ok(name) = std::env::var("MINDVAULT_COLLECTION") {
            if !name.is_empty() {
                config.collection = name;
            }
        }

        config
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_retrieval_policy() {
        let config = RagConfig::default();
        assert_eq!(config.retrieval.top_k, 7);
        assert_eq!(config.retrieval.mode, QueryMode::Diversity);
        assert_eq!(config.crawl.min_page_chars, 100);
        assert!(config.crawl.exclude.iter().any(|s| s == "admin"));
    }

    #[test]
    fn test_chunk_defaults_leave_room_for_overlap() {
        let chunking = ChunkConfig::default();
        assert!(chunking.overlap_chars < chunking.max_chars);
        assert!(chunking.boundary_window < chunking.max_chars - chunking.overlap_chars);
    }
}
