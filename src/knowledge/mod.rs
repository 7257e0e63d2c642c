//! Knowledge layer: chunking, vector indexing, retrieval, context assembly.
//!
//! - Chunker: bounded, overlapping slices of loader page texts
//! - VectorIndex: storage contract, with Qdrant and in-memory backends
//! - MMR: diversity-aware reranking over the candidate pool
//! - Retriever: query embedding, deduplication, ranking
//! - Context: budgeted prompt grounding with source attribution

mod chunker;
mod context;
mod mmr;
mod qdrant;
mod retriever;
mod vector;

// Re-exports
pub use chunker::{chunk_document, reconstruct, split_page};
pub use context::{assemble, ContextBlock};
pub use mmr::{mmr_rerank, MmrPolicy};
pub use qdrant::QdrantIndex;
pub use retriever::Retriever;
pub use vector::{
    cosine_similarity, EmbeddingRecord, MemoryVectorIndex, QueryMode, ScoredChunk, VectorIndex,
};
