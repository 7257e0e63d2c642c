//! End-to-end pipeline: ingestion (write path) and question answering
//! (read path) over the shared vector index.

use std::sync::Arc;

use futures::StreamExt;

use crate::config::RagConfig;
use crate::document::{
    latest_user_query, ChatMessage, Document, IngestReport, PageText, SourceType,
};
use crate::embedding::EmbeddingProvider;
use crate::error::RagError;
use crate::extractor;
use crate::generation::{
    build_system_prompt, AnswerStream, GenerationProvider, GenerationRequest,
    TEXT_NORMALIZE_PROMPT,
};
use crate::knowledge::{assemble, chunk_document, EmbeddingRecord, Retriever, VectorIndex};
use crate::scraper::WebCrawler;

/// Label attached to manually entered text sources.
pub const MANUAL_TEXT_SOURCE: &str = "manual-text-input";

/// The assembled RAG pipeline. All capabilities are trait objects so
/// tests can substitute deterministic fakes.
pub struct RagPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn GenerationProvider>,
    config: RagConfig,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn GenerationProvider>,
        config: RagConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            config,
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Number of chunks currently stored in the index.
    pub async fn indexed_chunks(&self) -> Result<usize, RagError> {
        self.index.count().await
    }

    // ========================================================================
    // Write Path
    // ========================================================================

    /// Ingests a PDF given its raw bytes and display filename.
    pub async fn ingest_pdf(&self, bytes: Vec<u8>, filename: &str) -> Result<IngestReport, RagError> {
        let pages = extractor::extract_pdf_pages(bytes).await?;
        let document = Document::new(SourceType::Pdf, filename, pages);
        self.index_document(document).await
    }

    /// Crawls a URL to the configured depth and ingests every retained page.
    pub async fn ingest_url(&self, url: &str) -> Result<IngestReport, RagError> {
        let crawler = WebCrawler::new(self.config.crawl.clone())?;
        let pages = crawler.crawl(url).await?;
        let document = Document::new(SourceType::Url, url, pages);
        self.index_document(document).await
    }

    /// Ingests free text entered by hand, attributed to `label` (or the
    /// manual-input default).
    ///
    /// When enabled, a best-effort normalization pass asks the language
    /// model to clean up typos before chunking; on failure the raw text
    /// is used as-is.
    pub async fn ingest_text(
        &self,
        text: &str,
        label: Option<&str>,
    ) -> Result<IngestReport, RagError> {
        if text.trim().is_empty() {
            return Err(RagError::EmptyInput);
        }

        let text = if self.config.normalize_text_input {
            self.normalize_text(text).await
        } else {
            text.to_string()
        };

        let page = PageText::new(text);
        let label = label.unwrap_or(MANUAL_TEXT_SOURCE);
        let document = Document::new(SourceType::Text, label, vec![page]);
        self.index_document(document).await
    }

    async fn normalize_text(&self, text: &str) -> String {
        let request = GenerationRequest {
            system_instructions: TEXT_NORMALIZE_PROMPT.to_string(),
            history: vec![ChatMessage::user(text)],
        };

        match self.generator.generate(&request).await {
            Ok(normalized) if !normalized.trim().is_empty() => normalized,
            Ok(_) => text.to_string(),
            Err(e) => {
                tracing::warn!("text normalization failed, using raw input: {e}");
                text.to_string()
            }
        }
    }

    /// Chunks, embeds, and upserts one document.
    ///
    /// A document with nothing to index (every crawled page filtered
    /// out, a scanned PDF with no text) is not an error; the report
    /// carries the zero counts.
    async fn index_document(&self, document: Document) -> Result<IngestReport, RagError> {
        let pages_processed = document.pages.len();
        let chunks = chunk_document(&document, &self.config.chunking);

        if chunks.is_empty() {
            tracing::info!(
                source = %document.source_identifier,
                "nothing to index after filtering"
            );
            return Ok(IngestReport {
                pages_processed,
                chunks_created: 0,
            });
        }

        tracing::info!(
            source = %document.source_identifier,
            pages = pages_processed,
            chunks = chunks.len(),
            "indexing document"
        );

        // Embed in batches with bounded concurrency; `buffered` keeps
        // batch order, so vectors line up with their chunks.
        let batches: Vec<Vec<String>> = chunks
            .chunks(self.config.embedding.max_batch.max(1))
            .map(|batch| batch.iter().map(|c| c.text.clone()).collect())
            .collect();

        let results: Vec<Result<Vec<Vec<f32>>, RagError>> =
            futures::stream::iter(batches.into_iter().map(|batch| {
                let embedder = Arc::clone(&self.embedder);
                async move { embedder.embed_batch(&batch).await }
            }))
            .buffered(self.config.embedding.fan_out.max(1))
            .collect()
            .await;

        let mut vectors = Vec::with_capacity(chunks.len());
        for result in results {
            vectors.extend(result?);
        }

        let records: Vec<EmbeddingRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord { chunk, vector })
            .collect();

        let chunks_created = self.index.upsert(records).await?;

        Ok(IngestReport {
            pages_processed,
            chunks_created,
        })
    }

    // ========================================================================
    // Read Path
    // ========================================================================

    /// Answers the latest user question in `history`, streaming the
    /// response incrementally.
    pub async fn answer_query(&self, history: &[ChatMessage]) -> Result<AnswerStream, RagError> {
        let request = self.prepare_answer(history).await?;
        self.generator.generate_stream(&request).await
    }

    /// Non-streaming variant of [`answer_query`](Self::answer_query).
    pub async fn answer_query_sync(&self, history: &[ChatMessage]) -> Result<String, RagError> {
        let request = self.prepare_answer(history).await?;
        self.generator.generate(&request).await
    }

    /// Retrieval and prompt assembly shared by both answer modes.
    async fn prepare_answer(
        &self,
        history: &[ChatMessage],
    ) -> Result<GenerationRequest, RagError> {
        let query = latest_user_query(history).ok_or(RagError::NoQueryProvided)?;

        let retriever = Retriever::new(
            Arc::clone(&self.embedder),
            Arc::clone(&self.index),
            self.config.retrieval.clone(),
        );
        let retrieved = retriever.retrieve(query).await?;
        let context = assemble(&retrieved, self.config.context_budget_chars);

        tracing::debug!(
            query,
            retrieved = retrieved.len(),
            context_chars = context.text.chars().count(),
            "assembled answer context"
        );

        Ok(GenerationRequest {
            system_instructions: build_system_prompt(&context),
            history: history.to_vec(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
