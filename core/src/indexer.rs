use crate::config::IndexConfig;
use crate::error::{QpsError, Result};
use crate::index::{Document, IndexStore, TokenMap, TokenMetadata};
use crate::tokenizer::tokenize;

/// Builds index entries for documents and writes them into an [`IndexStore`].
#[derive(Debug, Clone)]
pub struct Indexer {
    max_segments: u32,
}

impl Indexer {
    pub fn new(config: &IndexConfig) -> Self {
        Self { max_segments: config.max_segments.max(1) }
    }

    /// Index `content` under `doc_id`, replacing any previous entry.
    /// Returns the number of tokens the document produced.
    pub fn index(&self, store: &mut IndexStore, doc_id: &str, content: &str) -> Result<usize> {
        if doc_id.trim().is_empty() {
            return Err(QpsError::InvalidDocument("document id must not be empty".into()));
        }
        let (tokens, token_count) = self.build_token_map(content)?;
        store.put_document(Document { id: doc_id.to_string(), content: content.to_string() }, tokens);
        tracing::debug!(doc_id, token_count, "indexed document");
        Ok(token_count)
    }

    /// Group token occurrences by token and assign each to one of
    /// `min(max_segments, token_count)` equal-width segments. Width is floored,
    /// so trailing positions past the last full segment clamp into it.
    pub fn build_token_map(&self, content: &str) -> Result<(TokenMap, usize)> {
        let stream = tokenize(content);
        let token_count = stream.len();
        let mut tokens = TokenMap::new();
        if token_count == 0 {
            return Ok((tokens, 0));
        }
        if token_count > u32::MAX as usize {
            return Err(QpsError::InvalidDocument(format!("{token_count} tokens exceeds the per-document limit")));
        }

        let segment_count = (self.max_segments as usize).min(token_count);
        let width = token_count / segment_count;
        for (token, pos) in stream {
            let segment = (pos / width).min(segment_count - 1) as u32;
            let meta = tokens.entry(token).or_insert_with(TokenMetadata::default);
            meta.positions.push(pos as u32);
            if meta.segments.last() != Some(&segment) {
                meta.segments.push(segment);
            }
        }
        Ok((tokens, token_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::searcher::Searcher;
    use std::collections::BTreeSet;

    fn indexer(max_segments: u32) -> Indexer {
        Indexer::new(&IndexConfig::new(max_segments, 0.5).unwrap())
    }

    #[test]
    fn groups_positions_per_token() {
        let (tokens, count) = indexer(16).build_token_map("fox hen fox").unwrap();
        assert_eq!(count, 3);
        assert_eq!(tokens["fox"].positions, vec![0, 2]);
        assert_eq!(tokens["hen"].positions, vec![1]);
    }

    #[test]
    fn short_documents_get_one_segment_per_token() {
        let (tokens, _) = indexer(16).build_token_map("the quick brown fox").unwrap();
        assert_eq!(tokens["the"].segments, vec![0]);
        assert_eq!(tokens["quick"].segments, vec![1]);
        assert_eq!(tokens["fox"].segments, vec![3]);
    }

    #[test]
    fn long_documents_are_bounded_by_max_segments() {
        let text = (0..100).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let (tokens, _) = indexer(4).build_token_map(&text).unwrap();
        // 100 tokens over 4 segments: width 25
        assert_eq!(tokens["w0"].segments, vec![0]);
        assert_eq!(tokens["w24"].segments, vec![0]);
        assert_eq!(tokens["w25"].segments, vec![1]);
        assert_eq!(tokens["w99"].segments, vec![3]);
        assert!(tokens.values().flat_map(|m| m.segments.iter()).all(|s| *s < 4));
    }

    #[test]
    fn every_segment_is_used_when_tokens_barely_exceed_bound() {
        let text = (0..17).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let config = IndexConfig::new(16, 0.5).unwrap();
        let (tokens, _) = Indexer::new(&config).build_token_map(&text).unwrap();
        let used: BTreeSet<u32> = tokens.values().flat_map(|m| m.segments.iter().copied()).collect();
        assert_eq!(used, (0..16).collect::<BTreeSet<u32>>());
        assert_eq!(tokens["w0"].segments, vec![0]);
        assert_eq!(tokens["w3"].segments, vec![3]);
        assert_eq!(tokens["w16"].segments, vec![15]);

        let mut store = IndexStore::new();
        Indexer::new(&config).index(&mut store, "a", &text).unwrap();
        let hits = Searcher::new(&config).search(&store, "w0 w3", 10);
        assert_eq!(hits[0].score, 2.0);
    }

    #[test]
    fn uneven_widths_clamp_to_last_segment() {
        let text = (0..10).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let (tokens, _) = indexer(4).build_token_map(&text).unwrap();
        assert!(tokens.values().flat_map(|m| m.segments.iter()).all(|s| *s < 4));
        assert_eq!(tokens["w9"].segments, vec![3]);
    }

    #[test]
    fn repeated_token_records_distinct_segments() {
        let (tokens, _) = indexer(2).build_token_map("fox a b fox").unwrap();
        assert_eq!(tokens["fox"].segments, vec![0, 1]);
    }

    #[test]
    fn empty_content_indexes_without_tokens() {
        let mut store = IndexStore::new();
        let count = indexer(16).index(&mut store, "a", "   ").unwrap();
        assert_eq!(count, 0);
        assert!(store.get_document("a").is_some());
        assert_eq!(store.token_count(), 0);
    }

    #[test]
    fn reindex_replaces_previous_entry() {
        let mut store = IndexStore::new();
        let idx = indexer(16);
        idx.index(&mut store, "a", "red fox").unwrap();
        idx.index(&mut store, "a", "blue hen").unwrap();
        assert!(store.matching_documents("fox").is_none());
        assert!(store.matching_documents("hen").unwrap().contains("a"));
        assert!(store.check_consistency().is_ok());
    }

    #[test]
    fn rejects_blank_ids() {
        let mut store = IndexStore::new();
        assert!(matches!(indexer(16).index(&mut store, " ", "text"), Err(QpsError::InvalidDocument(_))));
        assert!(store.is_empty());
    }
}
