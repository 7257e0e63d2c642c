//! PDF text extraction built on the pdf-extract crate.

use crate::document::PageText;
use crate::error::RagError;

/// Extracts text from PDF bytes, split into pages.
///
/// Page numbers start at 1. A PDF with extractable structure but no
/// text (e.g. a scanned document) yields a warning and a single empty
/// page; corrupt or encrypted bytes are an error.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<PageText>, RagError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| RagError::UnreadableDocument(format!("failed to extract PDF text: {e}")))?;

    if text.trim().is_empty() {
        tracing::warn!("no text extracted from PDF; it might be a scanned document");
        return Ok(vec![page(1, String::new())]);
    }

    Ok(split_pages(&text)
        .into_iter()
        .enumerate()
        .map(|(i, text)| page(i + 1, text))
        .collect())
}

fn page(number: usize, text: String) -> PageText {
    PageText {
        text,
        page_number: Some(number),
        url: None,
    }
}

/// Splits extracted text into pages.
fn split_pages(text: &str) -> Vec<String> {
    // Form feed (\x0c) is the usual page boundary in extracted text.
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.len() > 1 {
        return pages;
    }

    // Some PDFs carry textual separators instead,
    // e.g. "--- Page 1 ---" or "=== 2 ===".
    let page_pattern = regex::Regex::new(r"(?m)^[\s]*[-=]+[\s]*(?:Page[\s]*)?(\d+)[\s]*[-=]+[\s]*$")
        .expect("Invalid regex");

    if page_pattern.is_match(text) {
        let pages: Vec<String> = page_pattern
            .split(text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if pages.len() > 1 {
            return pages;
        }
    }

    // No recognizable boundaries, treat the whole document as one page.
    vec![text.to_string()]
}

// ============================================================================
// Tests
// ============================================================================
