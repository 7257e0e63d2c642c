//! Maximal marginal relevance reranking.
//!
//! MMR = lambda * sim(query, chunk) - (1 - lambda) * max sim(chunk, selected)
//!
//! lambda 1.0 is pure relevance, 0.0 pure diversity. Applied over an
//! over-fetched candidate pool so repetitive source text cannot fill the
//! whole result set with near-duplicates.

use super::vector::{cosine_similarity, ScoredChunk};

/// Diversity policy applied when an index queries in diversity mode.
#[derive(Debug, Clone, Copy)]
pub struct MmrPolicy {
    /// Relevance/diversity balance, clamped to 0.0..=1.0.
    pub lambda: f32,
    /// Candidate pool size as a multiple of `k`.
    pub fetch_multiplier: usize,
}

impl Default for MmrPolicy {
    fn default() -> Self {
        Self {
            lambda: 0.5,
            fetch_multiplier: 3,
        }
    }
}

/// Selects `k` results from relevance-sorted candidates, greedily
/// maximizing the MMR criterion. Candidates without vectors are dropped.
/// Returned chunks keep their original relevance scores.
pub fn mmr_rerank(
    query: &[f32],
    candidates: Vec<ScoredChunk>,
    k: usize,
    lambda: f32,
) -> Vec<ScoredChunk> {
    let lambda = lambda.clamp(0.0, 1.0);
    let mut remaining: Vec<ScoredChunk> = candidates
        .into_iter()
        .filter(|c| c.vector.is_some())
        .collect();

    if remaining.is_empty() || k == 0 {
        return vec![];
    }

    let k = k.min(remaining.len());
    let mut selected: Vec<ScoredChunk> = Vec::with_capacity(k);

    for _ in 0..k {
        let mut best_idx = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (idx, candidate) in remaining.iter().enumerate() {
            let vector = candidate.vector.as_deref().unwrap_or(&[]);
            let relevance = cosine_similarity(query, vector);

            let redundancy = selected
                .iter()
                .map(|s| cosine_similarity(vector, s.vector.as_deref().unwrap_or(&[])))
                .fold(0.0f32, f32::max);

            let score = lambda * relevance - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }

        selected.push(remaining.remove(best_idx));
    }

    selected
}

// ============================================================================
// Tests
// ============================================================================
