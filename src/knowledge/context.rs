//! Context assembly.
//!
//! Turns retrieved chunks into the bounded text block the generator is
//! grounded on, with a deduplicated source list for citation.

use super::vector::ScoredChunk;

/// Separator placed between chunk texts in the assembled block.
const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

/// The grounding material for one generation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextBlock {
    /// Chunk texts joined with separators, within the budget.
    pub text: String,
    /// Deduplicated source identifiers of the included chunks,
    /// first-seen order.
    pub sources: Vec<String>,
}

impl ContextBlock {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Assembles a context block from scored chunks under a character budget.
///
/// Chunks are taken best-score first; a chunk that would push the block past
/// the budget is dropped whole, along with everything ranked below it.
/// Never truncates mid-chunk. Empty input produces an empty block.
pub fn assemble(chunks: &[ScoredChunk], budget_chars: usize) -> ContextBlock {
    let mut ordered: Vec<&ScoredChunk> = chunks.iter().collect();
    ordered.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut block = ContextBlock::default();
    let mut used = 0usize;

    for scored in ordered {
        let text_len = scored.chunk.text.chars().count();
        let sep_len = if block.text.is_empty() {
            0
        } else {
            CHUNK_SEPARATOR.chars().count()
        };

        if used + sep_len + text_len > budget_chars {
            break;
        }

        if !block.text.is_empty() {
            block.text.push_str(CHUNK_SEPARATOR);
        }
        block.text.push_str(&scored.chunk.text);
        used += sep_len + text_len;

        let source = &scored.chunk.metadata.source_identifier;
        if !block.sources.iter().any(|s| s == source) {
            block.sources.push(source.clone());
        }
    }

    block
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Chunk, SourceMetadata, SourceType};
    use uuid::Uuid;

    fn scored(text: &str, score: f32, source: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: Uuid::new_v4(),
                parent_document_id: Uuid::nil(),
                text: text.to_string(),
                position_index: 0,
                metadata: SourceMetadata {
                    source_type: SourceType::Text,
                    source_identifier: source.to_string(),
                    page_number: None,
                },
            },
            score,
            vector: None,
        }
    }

    #[test]
    fn test_empty_input_gives_empty_block() {
        let block = assemble(&[], 1000);
        assert!(block.is_empty());
        assert!(block.sources.is_empty());
    }

    #[test]
    fn test_block_contains_chunks_best_first() {
        let chunks = vec![
            scored("lower ranked", 0.4, "b"),
            scored("top ranked", 0.9, "a"),
        ];
        let block = assemble(&chunks, 1000);

        let top = block.text.find("top ranked").expect("top chunk included");
        let low = block.text.find("lower ranked").expect("low chunk included");
        assert!(top < low);
        assert_eq!(block.sources, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_budget_never_exceeded_and_whole_chunks_only() {
        let chunks = vec![
            scored(&"a".repeat(50), 0.9, "first"),
            scored(&"b".repeat(50), 0.8, "second"),
            scored(&"c".repeat(50), 0.7, "third"),
        ];
        // Budget fits the first chunk plus separator plus second chunk,
        // but not the third.
        let block = assemble(&chunks, 110);

        assert!(block.text.chars().count() <= 110);
        assert!(block.text.contains(&"a".repeat(50)));
        assert!(block.text.contains(&"b".repeat(50)));
        assert!(!block.text.contains('c'), "lowest-scored chunk must be dropped whole");
        assert_eq!(block.sources, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_drops_lowest_score_first() {
        let chunks = vec![
            scored(&"x".repeat(60), 0.2, "low"),
            scored(&"y".repeat(60), 0.9, "high"),
        ];
        let block = assemble(&chunks, 70);

        assert!(block.text.contains('y'));
        assert!(!block.text.contains('x'));
        assert_eq!(block.sources, vec!["high".to_string()]);
    }

    #[test]
    fn test_sources_deduplicated() {
        let chunks = vec![
            scored("one", 0.9, "same.pdf"),
            scored("two", 0.8, "same.pdf"),
            scored("three", 0.7, "other.pdf"),
        ];
        let block = assemble(&chunks, 1000);
        assert_eq!(
            block.sources,
            vec!["same.pdf".to_string(), "other.pdf".to_string()]
        );
    }
}
