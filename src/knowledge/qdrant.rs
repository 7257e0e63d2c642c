//! Qdrant-backed vector index.
//!
//! Talks to Qdrant over its REST API; the engine itself stays an external
//! collaborator. The collection is created on connect with the embedder's
//! dimensionality and cosine distance, so every vector in one collection
//! shares one dimensionality and one model identity.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RagConfig;
use crate::document::{Chunk, SourceMetadata, SourceType};
use crate::error::RagError;

use super::mmr::{mmr_rerank, MmrPolicy};
use super::vector::{EmbeddingRecord, QueryMode, ScoredChunk, VectorIndex};

// ============================================================================
// QdrantIndex
// ============================================================================

pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
    dimension: usize,
    mmr: MmrPolicy,
}

impl QdrantIndex {
    /// Connects to Qdrant and ensures the configured collection exists with
    /// the given vector dimensionality.
    pub async fn connect(config: &RagConfig, dimension: usize) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagError::IndexUnavailable(format!("failed to build HTTP client: {e}")))?;

        let index = Self {
            client,
            base_url: config.qdrant_url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            api_key: config.qdrant_api_key.clone(),
            dimension,
            mmr: MmrPolicy {
                lambda: config.retrieval.mmr_lambda,
                fetch_multiplier: config.retrieval.fetch_multiplier,
            },
        };

        index.ensure_collection().await?;
        Ok(index)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(ref key) = self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    async fn ensure_collection(&self) -> Result<(), RagError> {
        let path = format!("/collections/{}", self.collection);
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(index_error)?;

        if response.status().is_success() {
            return Ok(());
        }

        if response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(RagError::IndexUnavailable(format!(
                "collection check failed with {}",
                response.status()
            )));
        }

        tracing::info!(
            "Creating collection '{}' (dimension: {})",
            self.collection,
            self.dimension
        );

        let body = CreateCollection {
            vectors: VectorParams {
                size: self.dimension,
                distance: "Cosine",
            },
        };
        let response = self
            .request(reqwest::Method::PUT, &path)
            .json(&body)
            .send()
            .await
            .map_err(index_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::IndexUnavailable(format!(
                "collection create failed ({status}): {body}"
            )));
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize, with_vector: bool) -> Result<Vec<ScoredChunk>, RagError> {
        let path = format!("/collections/{}/points/search", self.collection);
        let body = SearchRequest {
            vector,
            limit,
            with_payload: true,
            with_vector,
        };

        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&body)
            .send()
            .await
            .map_err(index_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::IndexUnavailable(format!(
                "search failed ({status}): {body}"
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("bad search response: {e}")))?;

        Ok(parsed
            .result
            .into_iter()
            .filter_map(|point| {
                let payload = point.payload?;
                Some(ScoredChunk {
                    chunk: payload.into_chunk(point.id),
                    score: point.score,
                    vector: point.vector,
                })
            })
            .collect())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, records: Vec<EmbeddingRecord>) -> Result<usize, RagError> {
        if records.is_empty() {
            return Ok(0);
        }

        let points: Vec<Point> = records
            .iter()
            .map(|record| Point {
                id: record.chunk.id,
                vector: record.vector.clone(),
                payload: ChunkPayload::from_chunk(&record.chunk),
            })
            .collect();
        let written = points.len();

        let path = format!("/collections/{}/points?wait=true", self.collection);
        let response = self
            .request(reqwest::Method::PUT, &path)
            .json(&UpsertRequest { points })
            .send()
            .await
            .map_err(index_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::IndexUnavailable(format!(
                "upsert failed ({status}): {body}"
            )));
        }

        tracing::debug!("Upserted {} points into '{}'", written, self.collection);
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

        match mode {
            QueryMode::Similarity => self.search(vector, k, false).await,
            QueryMode::Diversity => {
                let fetch_k = k.saturating_mul(self.mmr.fetch_multiplier.max(1));
                let candidates = self.search(vector, fetch_k, true).await?;
                Ok(mmr_rerank(vector, candidates, k, self.mmr.lambda))
            }
        }
    }

    async fn count(&self) -> Result<usize, RagError> {
        let path = format!("/collections/{}/points/count", self.collection);
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&CountRequest { exact: true })
            .send()
            .await
            .map_err(index_error)?;

        if !response.status().is_success() {
            return Err(RagError::IndexUnavailable(format!(
                "count failed with {}",
                response.status()
            )));
        }

        let parsed: CountResponse = response
            .json()
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("bad count response: {e}")))?;
        Ok(parsed.result.count)
    }
}

fn index_error(err: reqwest::Error) -> RagError {
    RagError::IndexUnavailable(err.to_string())
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Serialize)]
struct CreateCollection {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct VectorParams {
    size: usize,
    distance: &'static str,
}

#[derive(Serialize)]
struct UpsertRequest {
    points: Vec<Point>,
}

#[derive(Serialize)]
struct Point {
    id: Uuid,
    vector: Vec<f32>,
    payload: ChunkPayload,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
    with_vector: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: Uuid,
    score: f32,
    #[serde(default)]
    payload: Option<ChunkPayload>,
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

#[derive(Serialize)]
struct CountRequest {
    exact: bool,
}

#[derive(Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

/// Chunk fields as stored in the Qdrant point payload.
#[derive(Debug, Serialize, Deserialize)]
struct ChunkPayload {
    parent_document_id: Uuid,
    position_index: usize,
    text: String,
    source_type: SourceType,
    source_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    page_number: Option<usize>,
}

impl ChunkPayload {
    fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            parent_document_id: chunk.parent_document_id,
            position_index: chunk.position_index,
            text: chunk.text.clone(),
            source_type: chunk.metadata.source_type,
            source_identifier: chunk.metadata.source_identifier.clone(),
            page_number: chunk.metadata.page_number,
        }
    }

    fn into_chunk(self, id: Uuid) -> Chunk {
        Chunk {
            id,
            parent_document_id: self.parent_document_id,
            text: self.text,
            position_index: self.position_index,
            metadata: SourceMetadata {
                source_type: self.source_type,
                source_identifier: self.source_identifier,
                page_number: self.page_number,
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_payload_roundtrip() {
        let chunk = Chunk {
            id: Uuid::new_v4(),
            parent_document_id: Uuid::new_v4(),
            text: "payload text".to_string(),
            position_index: 4,
            metadata: SourceMetadata {
                source_type: SourceType::Url,
                source_identifier: "https://example.com/page".to_string(),
                page_number: None,
            },
        };

        let payload = ChunkPayload::from_chunk(&chunk);
        let json = serde_json::to_string(&payload).expect("serialize");
        let back: ChunkPayload = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.into_chunk(chunk.id), chunk);
    }

    #[test]
    fn test_search_response_parsing() {
        let body = r#"{
            "result": [
                {
                    "id": "9f4ad1b0-93b7-4d8f-8cf0-4dbb5c1d9dc2",
                    "score": 0.87,
                    "payload": {
                        "parent_document_id": "7a7e6c16-5246-4b33-8bb6-41d316f8bb5f",
                        "position_index": 0,
                        "text": "Paris is the capital of France.",
                        "source_type": "text",
                        "source_identifier": "manual-text-input"
                    },
                    "vector": [0.1, 0.2, 0.3]
                }
            ]
        }"#;

        let parsed: SearchResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.result.len(), 1);
        let point = &parsed.result[0];
        assert!((point.score - 0.87).abs() < 1e-6);
        assert_eq!(point.vector.as_deref(), Some(&[0.1, 0.2, 0.3][..]));
        let payload = point.payload.as_ref().expect("payload");
        assert_eq!(payload.source_identifier, "manual-text-input");
    }

    #[test]
    fn test_create_collection_body_shape() {
        let body = CreateCollection {
            vectors: VectorParams {
                size: 768,
                distance: "Cosine",
            },
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["vectors"]["size"], 768);
        assert_eq!(json["vectors"]["distance"], "Cosine");
    }
}
