//! mindvault - retrieval-augmented question answering over documents.
//!
//! Ingests PDFs, crawled web pages, and free text into a vector index,
//! then answers questions grounded strictly in the retrieved content,
//! with source attribution and streamed responses.

pub mod cli;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod knowledge;
pub mod pipeline;
pub mod scraper;

// Re-exports
pub use config::{ChunkConfig, CrawlConfig, EmbeddingConfig, RagConfig, RetrievalConfig};
pub use document::{
    latest_user_query, ChatMessage, Chunk, Document, IngestReport, PageText, Role, SourceMetadata,
    SourceType,
};
pub use embedding::{get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding};
pub use error::RagError;
pub use generation::{
    build_system_prompt, AnswerStream, GeminiGenerator, GenerationProvider, GenerationRequest,
};
pub use knowledge::{
    assemble, chunk_document, cosine_similarity, ContextBlock, EmbeddingRecord, MemoryVectorIndex,
    QdrantIndex, QueryMode, Retriever, ScoredChunk, VectorIndex,
};
pub use pipeline::RagPipeline;
pub use scraper::WebCrawler;
