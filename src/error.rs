//! Error taxonomy for the RAG pipeline.
//!
//! Library code returns [`RagError`]; the CLI boundary wraps it with
//! `anyhow::Context` for user-facing messages.

use thiserror::Error;

/// Failures the pipeline can surface to its callers.
#[derive(Debug, Error)]
pub enum RagError {
    /// The document bytes could not be parsed (e.g. corrupt PDF).
    #[error("unreadable document: {0}")]
    UnreadableDocument(String),

    /// A URL could not be fetched. Fatal only for the crawl seed;
    /// interior pages are logged and skipped.
    #[error("failed to fetch {url}: {reason}")]
    FetchError { url: String, reason: String },

    /// Text input was blank after trimming.
    #[error("empty input: nothing to ingest")]
    EmptyInput,

    /// The embedding provider failed after all retries.
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The vector index rejected an operation or could not be reached.
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// The generation provider failed before or during streaming.
    #[error("generation provider unavailable: {0}")]
    GenerationUnavailable(String),

    /// The conversation history contains no user turn to answer.
    #[error("no query provided: conversation has no user message")]
    NoQueryProvided,
}
