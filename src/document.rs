//! Core data model: documents, page texts, chunks and conversation turns.
//!
//! A [`Document`] is immutable once built. Chunks carry everything the
//! vector index needs to attribute an answer back to its source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Source Types
// ============================================================================

/// Where ingested content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Pdf,
    Url,
    Text,
}

/// Attribution carried by every chunk into the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Source kind (pdf, url, text).
    pub source_type: SourceType,
    /// Filename, URL, or label - shown in the answer's source list.
    pub source_identifier: String,
    /// 1-based PDF page number, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<usize>,
}

// ============================================================================
// Documents and Pages
// ============================================================================

/// One normalized text unit produced by a source loader.
#[derive(Debug, Clone)]
pub struct PageText {
    /// Cleaned text content.
    pub text: String,
    /// 1-based page number (PDF sources).
    pub page_number: Option<usize>,
    /// Page URL (crawled sources).
    pub url: Option<String>,
}

impl PageText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page_number: None,
            url: None,
        }
    }
}

/// A unit of ingested content. Created once, never mutated.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub source_type: SourceType,
    pub source_identifier: String,
    pub pages: Vec<PageText>,
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    pub fn new(source_type: SourceType, source_identifier: impl Into<String>, pages: Vec<PageText>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_type,
            source_identifier: source_identifier.into(),
            pages,
            ingested_at: Utc::now(),
        }
    }
}

// ============================================================================
// Chunks
// ============================================================================

/// A bounded slice of a document's text - the unit of embedding and retrieval.
///
/// `position_index` starts at 0 and is strictly increasing per parent
/// document, continuing across pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub parent_document_id: Uuid,
    pub text: String,
    pub position_index: usize,
    pub metadata: SourceMetadata,
}

// ============================================================================
// Conversation
// ============================================================================

/// Message role in a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of request-scoped conversation history supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Extracts the retrieval query: the content of the most recent user turn.
pub fn latest_user_query(history: &[ChatMessage]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|m| m.role == Role::User && !m.content.trim().is_empty())
        .map(|m| m.content.as_str())
}

// ============================================================================
// Ingestion Report
// ============================================================================

/// Counts reported back to the caller after a successful ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Pages that survived loading and filtering.
    pub pages_processed: usize,
    /// Chunks embedded and upserted into the index.
    pub chunks_created: usize,
}

// ============================================================================
// Tests
// ============================================================================
