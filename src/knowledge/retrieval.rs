//! In-process vector retrieval over stored chunks.
//!
//! The corpus is small enough that retrieval loads every chunk and ranks by
//! cosine similarity locally instead of pushing the search into the database.

use crate::store::KnowledgeChunk;

/// A chunk paired with its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: KnowledgeChunk,
    pub score: f32,
}

/// Cosine similarity between two vectors. Zero when either is empty,
/// zero-length, or the dimensions disagree.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Rank chunks against a query embedding, highest similarity first.
/// Ties break on chunk id so the ordering is deterministic.
pub fn rank(chunks: Vec<KnowledgeChunk>, query: &[f32], top_k: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .map(|chunk| {
            let score = cosine_similarity(&chunk.embedding, query);
            ScoredChunk { chunk, score }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    scored.truncate(top_k);
    scored
}
