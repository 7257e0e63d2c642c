//! Text chunking.
//!
//! Splits loader page texts into bounded, overlapping chunks. Sizes are
//! measured in characters (not bytes, not tokens). Chunks are exact slices
//! of the page text: stripping the overlap prefix from every chunk after
//! the first and concatenating reconstructs the page exactly, in order.

use crate::config::ChunkConfig;
use crate::document::{Chunk, Document, SourceMetadata};
use uuid::Uuid;

// ============================================================================
// Page Splitting
// ============================================================================

/// Splits one page text into overlapping chunks.
///
/// Greedy window: each chunk takes up to `max_chars` characters. When the
/// hard limit falls mid-text, the break is pulled back within
/// `boundary_window` characters to land after a paragraph break, a newline,
/// or a sentence terminator; otherwise it hard-breaks at the limit. Every
/// chunk after the first starts `overlap_chars` before the previous break.
///
/// A page shorter than `max_chars` yields exactly one chunk, no overlap.
pub fn split_page(text: &str, config: &ChunkConfig) -> Vec<String> {
    if text.is_empty() {
        return vec![];
    }

    // Char-index to byte-offset table for UTF-8 safe slicing.
    let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let n = offsets.len();
    let slice = |a: usize, b: usize| -> &str {
        let lo = offsets[a];
        let hi = if b >= n { text.len() } else { offsets[b] };
        &text[lo..hi]
    };

    let max = config.max_chars.max(1);
    if n <= max {
        return vec![text.to_string()];
    }

    // Clamp so every chunk advances past the previous break point.
    let overlap = config.overlap_chars.min(max.saturating_sub(1));
    let window = config
        .boundary_window
        .min((max - overlap).saturating_sub(1));

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize; // char position where new content begins

    while start < n {
        let chunk_start = start.saturating_sub(if chunks.is_empty() { 0 } else { overlap });
        let hard_end = (chunk_start + max).min(n);

        let end = if hard_end == n {
            n
        } else {
            find_break(&chars, hard_end.saturating_sub(window).max(start + 1), hard_end)
        };

        chunks.push(slice(chunk_start, end).to_string());
        start = end;
    }

    chunks
}

/// Picks the best break position in `(lo..=hi]`, preferring paragraph
/// breaks, then single newlines, then sentence ends. Falls back to `hi`.
fn find_break(chars: &[char], lo: usize, hi: usize) -> usize {
    // Paragraph boundary: break right after "\n\n".
    for end in (lo..=hi).rev() {
        if end >= 2 && chars[end - 1] == '\n' && chars[end - 2] == '\n' {
            return end;
        }
    }

    // Line boundary.
    for end in (lo..=hi).rev() {
        if chars[end - 1] == '\n' {
            return end;
        }
    }

    // Sentence boundary: terminator followed by whitespace.
    for end in (lo..=hi).rev() {
        if end >= 2
            && chars[end - 1].is_whitespace()
            && matches!(chars[end - 2], '.' | '!' | '?')
        {
            return end;
        }
    }

    hi
}

// ============================================================================
// Document Chunking
// ============================================================================

/// Chunks every page of a document.
///
/// `position_index` starts at 0 and increases monotonically across pages.
/// Overlap never crosses a page boundary. Crawled pages attribute their
/// chunks to the page URL; everything else to the document identifier.
pub fn chunk_document(doc: &Document, config: &ChunkConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut position = 0usize;

    for page in &doc.pages {
        let identifier = page
            .url
            .clone()
            .unwrap_or_else(|| doc.source_identifier.clone());

        for text in split_page(&page.text, config) {
            chunks.push(Chunk {
                id: Uuid::new_v4(),
                parent_document_id: doc.id,
                text,
                position_index: position,
                metadata: SourceMetadata {
                    source_type: doc.source_type,
                    source_identifier: identifier.clone(),
                    page_number: page.page_number,
                },
            });
            position += 1;
        }
    }

    chunks
}

/// Rebuilds a page text from its chunks by dropping each overlap prefix.
/// Exists for the reconstruction invariant; also exercised by tests.
pub fn reconstruct(chunks: &[String], overlap_chars: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            out.push_str(chunk);
        } else {
            out.extend(chunk.chars().skip(overlap_chars));
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{PageText, SourceType};

    fn config(max: usize, overlap: usize, window: usize) -> ChunkConfig {
        ChunkConfig {
            max_chars: max,
            overlap_chars: overlap,
            boundary_window: window,
        }
    }

    #[test]
    fn test_empty_page_yields_no_chunks() {
        assert!(split_page("", &ChunkConfig::default()).is_empty());
    }

    #[test]
    fn test_short_page_yields_single_chunk_without_overlap() {
        let chunks = split_page("short text", &config(40, 10, 6));
        assert_eq!(chunks, vec!["short text".to_string()]);
    }

    #[test]
    fn test_paris_scenario_two_chunks_with_overlap() {
        let text = "Paris is the capital of France. It is known for the Eiffel Tower.";
        let cfg = config(40, 10, 6);
        let chunks = split_page(text, &cfg);

        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));

        // Second chunk begins with the trailing 10 characters of the first.
        let tail: String = chunks[0]
            .chars()
            .skip(chunks[0].chars().count() - 10)
            .collect();
        assert!(chunks[1].starts_with(&tail));

        assert_eq!(reconstruct(&chunks, 10), text);
    }

    #[test]
    fn test_reconstruction_over_long_text() {
        let text = "Lorem ipsum dolor sit amet. Consectetur adipiscing elit.\n\n\
                    Sed do eiusmod tempor incididunt ut labore et dolore magna aliqua. \
                    Ut enim ad minim veniam, quis nostrud exercitation ullamco laboris \
                    nisi ut aliquip ex ea commodo consequat.";
        let cfg = config(60, 15, 10);
        let chunks = split_page(text, &cfg);

        assert!(chunks.len() > 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= 60));
        assert_eq!(reconstruct(&chunks, 15), text);
    }

    #[test]
    fn test_prefers_sentence_boundary_within_window() {
        let text = "Alpha beta gamma delta. Epsilon zeta eta theta iota kappa.";
        let chunks = split_page(text, &config(30, 0, 10));

        assert!(chunks[0].ends_with("delta. "), "got {:?}", chunks[0]);
        assert_eq!(reconstruct(&chunks, 0), text);
    }

    #[test]
    fn test_prefers_paragraph_boundary_within_window() {
        let text = "First paragraph here.\n\nSecond paragraph follows with more text after it.";
        let chunks = split_page(text, &config(30, 0, 10));

        assert!(chunks[0].ends_with("\n\n"), "got {:?}", chunks[0]);
        assert_eq!(reconstruct(&chunks, 0), text);
    }

    #[test]
    fn test_hard_break_when_no_boundary_available() {
        let text: String = "x".repeat(100);
        let chunks = split_page(&text, &config(40, 10, 6));

        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
        assert_eq!(reconstruct(&chunks, 10), text);
    }

    #[test]
    fn test_multibyte_text_is_sliced_on_char_boundaries() {
        let text = "안녕하세요 세계. 이것은 한국어 문장입니다. 청킹이 잘 되는지 확인합니다. 조금 더 길게 씁니다.";
        let cfg = config(20, 5, 4);
        let chunks = split_page(text, &cfg);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
        assert_eq!(reconstruct(&chunks, 5), text);
    }

    #[test]
    fn test_position_index_monotonic_across_pages() {
        let doc = Document::new(
            SourceType::Pdf,
            "report.pdf",
            vec![
                PageText {
                    text: "a".repeat(90),
                    page_number: Some(1),
                    url: None,
                },
                PageText {
                    text: "b".repeat(90),
                    page_number: Some(2),
                    url: None,
                },
            ],
        );

        let chunks = chunk_document(&doc, &config(40, 10, 6));

        assert!(chunks.len() >= 4);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.position_index, i);
            assert_eq!(chunk.parent_document_id, doc.id);
        }
        assert_eq!(chunks[0].metadata.page_number, Some(1));
        assert_eq!(chunks.last().unwrap().metadata.page_number, Some(2));
    }

    #[test]
    fn test_crawled_pages_attribute_chunks_to_page_url() {
        let doc = Document::new(
            SourceType::Url,
            "https://example.com",
            vec![PageText {
                text: "Some page content long enough to keep.".to_string(),
                page_number: None,
                url: Some("https://example.com/docs".to_string()),
            }],
        );

        let chunks = chunk_document(&doc, &ChunkConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].metadata.source_identifier,
            "https://example.com/docs"
        );
    }
}
