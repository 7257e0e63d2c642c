//! Content extraction from document payloads.
//!
//! PDF bytes are turned into per-page text units; plain text passes
//! through as a single page. Page attribution survives into chunk
//! metadata downstream.

pub mod pdf;

use crate::document::PageText;
use crate::error::RagError;

/// Extracts per-page text from PDF bytes.
///
/// CPU bound; runs on the blocking pool so the async runtime stays
/// responsive for large documents.
pub async fn extract_pdf_pages(bytes: Vec<u8>) -> Result<Vec<PageText>, RagError> {
    tokio::task::spawn_blocking(move || pdf::extract_pages(&bytes))
        .await
        .map_err(|e| RagError::UnreadableDocument(format!("extraction task failed: {e}")))?
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_bytes_are_unreadable() {
        let result = extract_pdf_pages(b"not a pdf at all".to_vec()).await;
        assert!(matches!(result, Err(RagError::UnreadableDocument(_))));
    }
}
