use crate::config::IndexConfig;
use crate::index::{DocId, IndexStore, TokenMetadata};
use crate::tokenizer::tokenize;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub content: String,
    pub score: f64,
}

/// Ranks documents by query-token coverage plus a segment-proximity bonus.
#[derive(Debug, Clone)]
pub struct Searcher {
    proximity_bonus: f64,
}

impl Searcher {
    pub fn new(config: &IndexConfig) -> Self {
        Self { proximity_bonus: config.proximity_bonus }
    }

    pub fn search(&self, store: &IndexStore, query: &str, limit: usize) -> Vec<SearchHit> {
        // Sorted so pair iteration below is deterministic.
        let query_tokens: BTreeSet<String> = tokenize(query).into_iter().map(|(t, _)| t).collect();
        if query_tokens.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut candidates: HashSet<&DocId> = HashSet::new();
        for token in &query_tokens {
            if let Some(docs) = store.matching_documents(token) {
                candidates.extend(docs.iter());
            }
        }

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter_map(|doc_id| {
                let score = self.score(store, doc_id, &query_tokens)?;
                let doc = store.get_document(doc_id)?;
                Some(SearchHit { doc_id: doc_id.clone(), content: doc.content.clone(), score })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        let total_hits = hits.len();
        hits.truncate(limit);
        tracing::debug!(query, total_hits, returned = hits.len(), "search complete");
        hits
    }

    /// Coverage (distinct query tokens present) plus `proximity_bonus` per
    /// co-located token pair. The bonus is capped at `matched - 1` pairs, so a
    /// long query can't inflate a document's score quadratically.
    fn score(&self, store: &IndexStore, doc_id: &str, query_tokens: &BTreeSet<String>) -> Option<f64> {
        let tokens = store.get_token_metadata(doc_id)?;
        let matched: Vec<&TokenMetadata> = query_tokens.iter().filter_map(|t| tokens.get(t)).collect();
        if matched.is_empty() {
            return None;
        }

        let mut close_pairs = 0usize;
        for (i, a) in matched.iter().enumerate() {
            for b in &matched[i + 1..] {
                if segments_adjacent(&a.segments, &b.segments) {
                    close_pairs += 1;
                }
            }
        }
        let capped_pairs = close_pairs.min(matched.len() - 1);
        Some(matched.len() as f64 + capped_pairs as f64 * self.proximity_bonus)
    }
}

/// True when some segment of `a` equals or neighbours some segment of `b`.
/// Both slices are ascending, so a merge walk suffices.
fn segments_adjacent(a: &[u32], b: &[u32]) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].abs_diff(b[j]) <= 1 {
            return true;
        }
        if a[i] < b[j] { i += 1 } else { j += 1 }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::Indexer;

    fn setup(docs: &[(&str, &str)]) -> (IndexStore, Searcher) {
        setup_with(IndexConfig::default(), docs)
    }

    fn setup_with(config: IndexConfig, docs: &[(&str, &str)]) -> (IndexStore, Searcher) {
        let indexer = Indexer::new(&config);
        let mut store = IndexStore::new();
        for (id, content) in docs {
            indexer.index(&mut store, id, content).unwrap();
        }
        (store, Searcher::new(&config))
    }

    #[test]
    fn adjacency_walk() {
        assert!(segments_adjacent(&[0, 5], &[6]));
        assert!(segments_adjacent(&[3], &[3]));
        assert!(!segments_adjacent(&[0, 4], &[2, 6]));
        assert!(!segments_adjacent(&[], &[1]));
    }

    #[test]
    fn single_token_query_scores_coverage() {
        let (store, searcher) = setup(&[("a", "the quick brown fox")]);
        let hits = searcher.search(&store, "fox", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, "a");
        assert_eq!(hits[0].score, 1.0);
    }

    #[test]
    fn proximity_breaks_coverage_ties() {
        let (store, searcher) = setup(&[("a", "the quick brown fox"), ("b", "quick fox jumps")]);
        let hits = searcher.search(&store, "quick fox", 10);
        let ids: Vec<&str> = hits.iter().map(|h| h.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(hits[0].score, 2.5);
        assert_eq!(hits[1].score, 2.0);
    }

    #[test]
    fn more_coverage_outranks_partial_matches() {
        let (store, searcher) = setup(&[("a", "fox fox fox fox"), ("b", "red fox"), ("c", "red hen")]);
        let hits = searcher.search(&store, "red fox", 10);
        assert_eq!(hits[0].doc_id, "b");
        assert_eq!(hits.len(), 3);
        assert!(hits[1..].iter().all(|h| h.score == 1.0));
        // equal scores fall back to ascending id
        assert_eq!(hits[1].doc_id, "a");
        assert_eq!(hits[2].doc_id, "c");
    }

    #[test]
    fn proximity_bonus_is_capped_per_document() {
        let config = IndexConfig::new(1, 0.5).unwrap();
        let (store, searcher) = setup_with(config, &[("a", "alpha beta gamma delta")]);
        let hits = searcher.search(&store, "alpha beta gamma delta", 10);
        // one segment: all 6 pairs qualify, only 3 count
        assert_eq!(hits[0].score, 4.0 + 3.0 * 0.5);
        let (store, searcher) = setup(&[("a", "alpha beta")]);
        assert_eq!(searcher.search(&store, "alpha beta alpha", 10)[0].score, 2.5);
    }

    #[test]
    fn empty_query_and_zero_limit_return_nothing() {
        let (store, searcher) = setup(&[("a", "red fox")]);
        assert!(searcher.search(&store, "", 10).is_empty());
        assert!(searcher.search(&store, "  ?! ", 10).is_empty());
        assert!(searcher.search(&store, "fox", 0).is_empty());
        assert!(searcher.search(&store, "wolf", 10).is_empty());
    }

    #[test]
    fn results_are_truncated_to_limit() {
        let (store, searcher) = setup(&[("a", "fox"), ("b", "fox"), ("c", "fox")]);
        let hits = searcher.search(&store, "fox", 2);
        let ids: Vec<&str> = hits.iter().map(|h| h.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
