//! Embedding provider: text to fixed-length dense vectors.
//!
//! The model is an external capability; this module defines the calling
//! contract and the Gemini implementation. Vectors are deterministic for a
//! fixed model version and share one dimensionality per collection.
//!
//! ## Usage
//! ```rust,ignore
//! let embedder = GeminiEmbedding::from_env()?;
//! let vector = embedder.embed("Hello, world!").await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RagError;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// Interface for turning text into embedding vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a single text (used for queries).
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Embeds a batch of texts (used for ingestion), preserving order.
    /// Callers keep batches within the provider's limit.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Vector dimensionality, fixed per model version.
    fn dimension(&self) -> usize;

    /// Provider name.
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// Gemini embedding API endpoints (gemini-embedding-001)
/// source: https://ai.google.dev/gemini-api/docs/embeddings
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";
const GEMINI_BATCH_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:batchEmbedContents";

/// Default embedding dimension
pub const DEFAULT_DIMENSION: usize = 768;

/// Provider-side cap on texts per batch call
pub const GEMINI_MAX_BATCH: usize = 100;

/// Transient-failure retry policy
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

/// Google Gemini embedding implementation.
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
}

impl GeminiEmbedding {
    pub fn new(api_key: String) -> Result<Self, RagError> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    /// Creates a provider with an explicit dimension (768, 1536 or 3072).
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self, RagError> {
        if ![768, 1536, 3072].contains(&dimension) {
            return Err(RagError::EmbeddingUnavailable(format!(
                "invalid dimension {dimension}: must be 768, 1536 or 3072"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                RagError::EmbeddingUnavailable(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            api_key,
            client,
            dimension,
        })
    }

    /// Reads the API key from `GEMINI_API_KEY` or `GOOGLE_AI_API_KEY`.
    pub fn from_env() -> Result<Self, RagError> {
        let api_key = get_api_key()
            .map_err(|e| RagError::EmbeddingUnavailable(e.to_string()))?;
        Self::new(api_key)
    }

    /// POSTs a request body, retrying transient failures (429, 5xx,
    /// transport errors) with bounded exponential backoff.
    async fn post_with_retry<B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<String, RagError> {
        let mut last_error = String::new();

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff =
                    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1));
                tracing::warn!(
                    "Embedding call retry {}/{} after {:?}: {}",
                    attempt,
                    MAX_RETRIES,
                    backoff,
                    last_error
                );
                tokio::time::sleep(backoff).await;
            }

            let response = match self
                .client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = format!("request failed: {e}");
                    continue;
                }
            };

            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            if status.is_success() {
                return Ok(text);
            }

            if status.as_u16() == 429 || status.is_server_error() {
                last_error = format!("transient error ({status})");
                continue;
            }

            // Non-retryable provider error
            if let Ok(error) = serde_json::from_str::<GeminiError>(&text) {
                return Err(RagError::EmbeddingUnavailable(format!(
                    "Gemini API error ({}): {}",
                    error.error.status, error.error.message
                )));
            }
            return Err(RagError::EmbeddingUnavailable(format!(
                "Gemini API error ({status}): {text}"
            )));
        }

        Err(RagError::EmbeddingUnavailable(format!(
            "gave up after {MAX_RETRIES} retries: {last_error}"
        )))
    }

    fn content_request(&self, text: &str, task_type: &str) -> EmbedRequest {
        EmbedRequest {
            model: "models/gemini-embedding-001".to_string(),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type: task_type.to_string(),
            output_dimensionality: Some(self.dimension),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = self.content_request(text, "RETRIEVAL_QUERY");
        let body = self.post_with_retry(GEMINI_EMBED_URL, &request).await?;

        let parsed: EmbedResponse = serde_json::from_str(&body).map_err(|e| {
            RagError::EmbeddingUnavailable(format!("bad embedding response: {e}"))
        })?;
        Ok(parsed.embedding.values)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if texts.len() > GEMINI_MAX_BATCH {
            return Err(RagError::EmbeddingUnavailable(format!(
                "batch of {} exceeds provider limit {}",
                texts.len(),
                GEMINI_MAX_BATCH
            )));
        }

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|t| self.content_request(t, "RETRIEVAL_DOCUMENT"))
                .collect(),
        };

        tracing::debug!("Embedding batch of {} texts", texts.len());
        let body = self
            .post_with_retry(GEMINI_BATCH_EMBED_URL, &request)
            .await?;

        let parsed: BatchEmbedResponse = serde_json::from_str(&body).map_err(|e| {
            RagError::EmbeddingUnavailable(format!("bad batch embedding response: {e}"))
        })?;

        if parsed.embeddings.len() != texts.len() {
            return Err(RagError::EmbeddingUnavailable(format!(
                "provider returned {} vectors for {} texts",
                parsed.embeddings.len(),
                texts.len()
            )));
        }

        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// source: https://ai.google.dev/gemini-api/docs/embeddings
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: String,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

// ============================================================================
// API Key Management
// ============================================================================

/// Loads the Gemini API key from the environment.
///
/// Precedence: `GEMINI_API_KEY`, then `GOOGLE_AI_API_KEY`.
pub fn get_api_key() -> anyhow::Result<String> {
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            tracing::debug!("Using API key from GEMINI_API_KEY");
            return Ok(key);
        }
    }

    if let Ok(key) = std::env::var("GOOGLE_AI_API_KEY") {
        if !key.is_empty() {
            tracing::debug!("Using API key from GOOGLE_AI_API_KEY");
            return Ok(key);
        }
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// Whether an API key is present in the environment.
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_dimension() {
        let result = GeminiEmbedding::with_dimension("fake_key".to_string(), 999);
        assert!(matches!(result, Err(RagError::EmbeddingUnavailable(_))));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in [768, 1536, 3072] {
            let embedder = GeminiEmbedding::with_dimension("fake_key".to_string(), dim)
                .expect("valid dimension");
            assert_eq!(embedder.dimension(), dim);
        }
    }

    #[tokio::test]
    async fn test_empty_text_embeds_to_zero_vector_without_api_call() {
        let embedder =
            GeminiEmbedding::with_dimension("fake_key".to_string(), 768).expect("create");
        let vector = embedder.embed("   ").await.expect("embed");
        assert_eq!(vector.len(), 768);
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected() {
        let embedder =
            GeminiEmbedding::with_dimension("fake_key".to_string(), 768).expect("create");
        let texts: Vec<String> = (0..GEMINI_MAX_BATCH + 1).map(|i| format!("t{i}")).collect();
        let result = embedder.embed_batch(&texts).await;
        assert!(matches!(result, Err(RagError::EmbeddingUnavailable(_))));
    }

    #[test]
    fn test_batch_request_shape() {
        let embedder =
            GeminiEmbedding::with_dimension("fake_key".to_string(), 768).expect("create");
        let request = BatchEmbedRequest {
            requests: vec![embedder.content_request("hello", "RETRIEVAL_DOCUMENT")],
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["requests"][0]["taskType"], "RETRIEVAL_DOCUMENT");
        assert_eq!(json["requests"][0]["outputDimensionality"], 768);
        assert_eq!(
            json["requests"][0]["content"]["parts"][0]["text"],
            "hello"
        );
    }
}
