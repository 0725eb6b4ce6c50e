//! Ranking strategies over a consistent snapshot of a tier.
//!
//! Phase 1 of every strategy scores candidates; phase 2 sorts descending
//! (stable, so ties keep insertion order) and truncates to `top_k`.

use crate::embedding::{cosine_similarity, HashingEmbedder};
use chrono::{DateTime, Utc};
use phylactery_types::memory::{MemoryEntry, MemoryId, RetrievalStrategy};
use std::collections::HashMap;

const MS_PER_DAY: f32 = 86_400_000.0;

/// Weight of the semantic score in hybrid and MemRL rankings.
const SEMANTIC_WEIGHT: f32 = 0.7;
/// Weight of the keyword score (hybrid) or `q_value` (MemRL).
const SECONDARY_WEIGHT: f32 = 0.3;

/// A scored entry.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub entry: MemoryEntry,
    pub score: f32,
    pub strategy: RetrievalStrategy,
}

/// Rank `entries` against `query` with the given strategy.
pub fn retrieve(
    entries: &[MemoryEntry],
    embedder: &HashingEmbedder,
    query: &str,
    strategy: RetrievalStrategy,
    top_k: usize,
    now: DateTime<Utc>,
) -> Vec<RetrievalResult> {
    match strategy {
        RetrievalStrategy::Semantic => rank_semantic(entries, &embedder.embed(query), top_k),
        RetrievalStrategy::Keyword => rank_keyword(entries, query, top_k),
        RetrievalStrategy::Hybrid => rank_hybrid(entries, &embedder.embed(query), query, top_k),
        RetrievalStrategy::Recency => rank_recency(entries, now, top_k),
        RetrievalStrategy::MemRl => rank_memrl(entries, &embedder.embed(query), top_k),
    }
}

/// Cosine ranking. Entries without an embedding are excluded, not scored 0.
pub fn rank_semantic(
    entries: &[MemoryEntry],
    query_embedding: &[f32],
    top_k: usize,
) -> Vec<RetrievalResult> {
    let scored = entries
        .iter()
        .filter_map(|entry| {
            let embedding = entry.embedding.as_deref()?;
            Some(RetrievalResult {
                entry: entry.clone(),
                score: cosine_similarity(query_embedding, embedding),
                strategy: RetrievalStrategy::Semantic,
            })
        })
        .collect();
    top(scored, top_k)
}

/// Fraction of whitespace-separated query words found in the content.
pub fn rank_keyword(entries: &[MemoryEntry], query: &str, top_k: usize) -> Vec<RetrievalResult> {
    let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    if words.is_empty() {
        return Vec::new();
    }
    let scored = entries
        .iter()
        .filter_map(|entry| {
            let content = entry.content.to_lowercase();
            let matches = words.iter().filter(|w| content.contains(w.as_str())).count();
            (matches > 0).then(|| RetrievalResult {
                entry: entry.clone(),
                score: matches as f32 / words.len() as f32,
                strategy: RetrievalStrategy::Keyword,
            })
        })
        .collect();
    top(scored, top_k)
}

/// `0.7·semantic + 0.3·keyword` over twice as many candidates of each.
pub fn rank_hybrid(
    entries: &[MemoryEntry],
    query_embedding: &[f32],
    query: &str,
    top_k: usize,
) -> Vec<RetrievalResult> {
    let candidates = top_k.saturating_mul(2);
    let mut combined: Vec<RetrievalResult> = Vec::new();
    let mut position: HashMap<MemoryId, usize> = HashMap::new();

    for r in rank_semantic(entries, query_embedding, candidates) {
        position.insert(r.entry.id.clone(), combined.len());
        combined.push(RetrievalResult {
            score: r.score * SEMANTIC_WEIGHT,
            strategy: RetrievalStrategy::Hybrid,
            entry: r.entry,
        });
    }
    for r in rank_keyword(entries, query, candidates) {
        match position.get(&r.entry.id) {
            Some(&i) => combined[i].score += r.score * SECONDARY_WEIGHT,
            None => {
                position.insert(r.entry.id.clone(), combined.len());
                combined.push(RetrievalResult {
                    score: r.score * SECONDARY_WEIGHT,
                    strategy: RetrievalStrategy::Hybrid,
                    entry: r.entry,
                });
            }
        }
    }
    top(combined, top_k)
}

/// `1 / (1 + age_in_days)`.
pub fn rank_recency(
    entries: &[MemoryEntry],
    now: DateTime<Utc>,
    top_k: usize,
) -> Vec<RetrievalResult> {
    let scored = entries
        .iter()
        .map(|entry| {
            let age_days =
                ((now - entry.timestamp).num_milliseconds().max(0) as f32) / MS_PER_DAY;
            RetrievalResult {
                entry: entry.clone(),
                score: 1.0 / (1.0 + age_days),
                strategy: RetrievalStrategy::Recency,
            }
        })
        .collect();
    top(scored, top_k)
}

/// Two-phase MemRL: `3·top_k` semantic candidates re-ranked by
/// `0.7·similarity + 0.3·q_value`.
pub fn rank_memrl(
    entries: &[MemoryEntry],
    query_embedding: &[f32],
    top_k: usize,
) -> Vec<RetrievalResult> {
    let reranked = rank_semantic(entries, query_embedding, top_k.saturating_mul(3))
        .into_iter()
        .map(|r| RetrievalResult {
            score: SEMANTIC_WEIGHT * r.score + SECONDARY_WEIGHT * r.entry.q_value,
            strategy: RetrievalStrategy::MemRl,
            entry: r.entry,
        })
        .collect();
    top(reranked, top_k)
}

fn top(mut results: Vec<RetrievalResult>, top_k: usize) -> Vec<RetrievalResult> {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top_k);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use phylactery_types::memory::MemoryTier;

    fn entry(embedder: &HashingEmbedder, content: &str) -> MemoryEntry {
        MemoryEntry::new(MemoryTier::Episodic, content).with_embedding(embedder.embed(content))
    }

    #[test]
    fn test_semantic_ranks_best_match_first() {
        let e = HashingEmbedder::default();
        let entries = vec![
            entry(&e, "grocery list includes apples and oranges"),
            entry(&e, "the user adopted a golden retriever puppy"),
            entry(&e, "meeting with accountant about taxes"),
        ];
        let results = rank_semantic(&entries, &e.embed("golden retriever puppy"), 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entry.id, entries[1].id);
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn test_semantic_excludes_entries_without_embedding() {
        let e = HashingEmbedder::default();
        let entries = vec![
            MemoryEntry::new(MemoryTier::CoreIdentity, "golden retriever puppy"),
            entry(&e, "golden retriever puppy"),
        ];
        let results = rank_semantic(&entries, &e.embed("golden retriever puppy"), 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.id, entries[1].id);
    }

    #[test]
    fn test_keyword_scores_fraction_of_words() {
        let e = HashingEmbedder::default();
        let entries = vec![
            entry(&e, "Coffee with Alice on Monday"),
            entry(&e, "Tea with Bob"),
            entry(&e, "nothing relevant here"),
        ];
        let results = rank_keyword(&entries, "coffee alice", 10);
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 1.0).abs() < 1e-6);

        let results = rank_keyword(&entries, "with alice", 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entry.id, entries[0].id);
        assert!((results[1].score - 0.5).abs() < 1e-6);

        assert!(rank_keyword(&entries, "   ", 10).is_empty());
    }

    #[test]
    fn test_recency_prefers_newer() {
        let e = HashingEmbedder::default();
        let now = Utc::now();
        let mut old = entry(&e, "old memory");
        old.timestamp = now - chrono::Duration::days(3);
        let fresh = entry(&e, "fresh memory");
        let results = rank_recency(&[old.clone(), fresh.clone()], now, 10);
        assert_eq!(results[0].entry.id, fresh.id);
        assert!((results[1].score - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_memrl_prefers_higher_q_on_equal_similarity() {
        let e = HashingEmbedder::default();
        let low = entry(&e, "rainy weather forecast").with_q_value(0.1);
        let high = entry(&e, "rainy weather forecast").with_q_value(0.9);
        let results = rank_memrl(&[low, high.clone()], &e.embed("rainy weather forecast"), 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.id, high.id);
        assert_eq!(results[0].strategy, RetrievalStrategy::MemRl);
        assert!((results[0].score - (0.7 + 0.27)).abs() < 1e-4);
    }

    #[test]
    fn test_hybrid_merges_scores() {
        let e = HashingEmbedder::default();
        let entries = vec![
            entry(&e, "planning a trip to kyoto in april"),
            entry(&e, "kyoto"),
        ];
        let results = retrieve(
            &entries,
            &e,
            "kyoto trip",
            RetrievalStrategy::Hybrid,
            5,
            Utc::now(),
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entry.id, entries[0].id);
        assert!(results.iter().all(|r| r.strategy == RetrievalStrategy::Hybrid));
    }
}
