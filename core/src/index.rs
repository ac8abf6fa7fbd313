use crate::error::{QpsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

pub type DocId = String;

/// Per-document token occurrences: a token string mapped to where it occurs.
pub type TokenMap = HashMap<String, TokenMetadata>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Document {
    pub id: DocId,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenMetadata {
    /// Token positions in the document's token stream, ascending.
    pub positions: Vec<u32>,
    /// Distinct segments touched by those positions, ascending.
    pub segments: Vec<u32>,
}

/// In-memory store: token -> docs, doc -> token metadata, doc -> raw record.
///
/// All three maps cover the same document set; `put_document`, `remove_document`
/// and `clear` are the only mutators and keep them in step.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IndexStore {
    inverted_index: HashMap<String, HashSet<DocId>>,
    doc_token_metadata: HashMap<DocId, TokenMap>,
    doc_store: HashMap<DocId, Document>,
}

/// Order-independent capture of an [`IndexStore`]. Sorted maps give the
/// snapshot a canonical encoding regardless of hash iteration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSnapshot {
    pub inverted_index: BTreeMap<String, BTreeSet<DocId>>,
    pub doc_token_metadata: BTreeMap<DocId, BTreeMap<String, TokenMetadata>>,
    pub doc_store: BTreeMap<DocId, Document>,
}

impl IndexStore {
    pub fn new() -> Self { Self::default() }

    /// Install a document and its token metadata, replacing any previous entry
    /// for the same id.
    pub fn put_document(&mut self, doc: Document, tokens: TokenMap) {
        self.remove_document(&doc.id);
        for token in tokens.keys() {
            self.inverted_index.entry(token.clone()).or_default().insert(doc.id.clone());
        }
        self.doc_token_metadata.insert(doc.id.clone(), tokens);
        self.doc_store.insert(doc.id.clone(), doc);
    }

    pub fn get_document(&self, doc_id: &str) -> Option<&Document> {
        self.doc_store.get(doc_id)
    }

    pub fn get_token_metadata(&self, doc_id: &str) -> Option<&TokenMap> {
        self.doc_token_metadata.get(doc_id)
    }

    pub fn matching_documents(&self, token: &str) -> Option<&HashSet<DocId>> {
        self.inverted_index.get(token)
    }

    /// Drop a document from all three maps, pruning inverted-index sets it
    /// leaves empty. Returns the removed record, if any.
    pub fn remove_document(&mut self, doc_id: &str) -> Option<Document> {
        let removed = self.doc_store.remove(doc_id);
        if let Some(tokens) = self.doc_token_metadata.remove(doc_id) {
            for token in tokens.keys() {
                if let Some(docs) = self.inverted_index.get_mut(token) {
                    docs.remove(doc_id);
                    if docs.is_empty() {
                        self.inverted_index.remove(token);
                    }
                }
            }
        }
        removed
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn document_count(&self) -> usize { self.doc_store.len() }

    pub fn token_count(&self) -> usize { self.inverted_index.len() }

    pub fn is_empty(&self) -> bool { self.doc_store.is_empty() }

    /// Largest segment index recorded for any token of any document.
    pub fn max_segment(&self) -> Option<u32> {
        self.doc_token_metadata
            .values()
            .flat_map(|tokens| tokens.values())
            .filter_map(|meta| meta.segments.last().copied())
            .max()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            inverted_index: self
                .inverted_index
                .iter()
                .map(|(token, docs)| (token.clone(), docs.iter().cloned().collect()))
                .collect(),
            doc_token_metadata: self
                .doc_token_metadata
                .iter()
                .map(|(doc_id, tokens)| {
                    (doc_id.clone(), tokens.iter().map(|(t, m)| (t.clone(), m.clone())).collect())
                })
                .collect(),
            doc_store: self.doc_store.iter().map(|(id, doc)| (id.clone(), doc.clone())).collect(),
        }
    }

    /// Rebuild a store from a snapshot. Snapshots that break the store's
    /// invariants are rejected as malformed rather than partially installed.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self> {
        let store = Self {
            inverted_index: snapshot
                .inverted_index
                .into_iter()
                .map(|(token, docs)| (token, docs.into_iter().collect()))
                .collect(),
            doc_token_metadata: snapshot
                .doc_token_metadata
                .into_iter()
                .map(|(doc_id, tokens)| (doc_id, tokens.into_iter().collect()))
                .collect(),
            doc_store: snapshot.doc_store.into_iter().collect(),
        };
        store.check_consistency().map_err(QpsError::MalformedSnapshot)?;
        Ok(store)
    }

    /// Verify the cross-map invariants, describing the first violation found.
    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        for (doc_id, doc) in &self.doc_store {
            if &doc.id != doc_id {
                return Err(format!("document keyed {doc_id} carries id {}", doc.id));
            }
            if !self.doc_token_metadata.contains_key(doc_id) {
                return Err(format!("document {doc_id} has no token metadata"));
            }
        }
        for (doc_id, tokens) in &self.doc_token_metadata {
            if !self.doc_store.contains_key(doc_id) {
                return Err(format!("token metadata for unknown document {doc_id}"));
            }
            for token in tokens.keys() {
                let indexed = self.inverted_index.get(token).is_some_and(|docs| docs.contains(doc_id));
                if !indexed {
                    return Err(format!("token {token:?} of {doc_id} missing from inverted index"));
                }
            }
        }
        for (token, docs) in &self.inverted_index {
            if docs.is_empty() {
                return Err(format!("empty inverted index entry for {token:?}"));
            }
            for doc_id in docs {
                let known = self.doc_token_metadata.get(doc_id).is_some_and(|t| t.contains_key(token));
                if !known {
                    return Err(format!("inverted index maps {token:?} to {doc_id} without metadata"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> TokenMap {
        words
            .iter()
            .enumerate()
            .map(|(i, w)| (w.to_string(), TokenMetadata { positions: vec![i as u32], segments: vec![0] }))
            .collect()
    }

    fn doc(id: &str, content: &str) -> Document {
        Document { id: id.into(), content: content.into() }
    }

    #[test]
    fn put_links_both_directions() {
        let mut store = IndexStore::new();
        store.put_document(doc("a", "red fox"), tokens(&["red", "fox"]));
        assert!(store.matching_documents("fox").unwrap().contains("a"));
        assert!(store.get_token_metadata("a").unwrap().contains_key("red"));
        assert_eq!(store.document_count(), 1);
        assert_eq!(store.token_count(), 2);
        assert!(store.check_consistency().is_ok());
    }

    #[test]
    fn remove_prunes_exclusive_tokens() {
        let mut store = IndexStore::new();
        store.put_document(doc("a", "red fox"), tokens(&["red", "fox"]));
        store.put_document(doc("b", "red hen"), tokens(&["red", "hen"]));

        let removed = store.remove_document("a");
        assert_eq!(removed.map(|d| d.id), Some("a".to_string()));
        assert!(store.matching_documents("fox").is_none());
        let red = store.matching_documents("red").unwrap();
        assert_eq!(red.len(), 1);
        assert!(red.contains("b"));
        assert!(store.get_document("a").is_none());
        assert!(store.check_consistency().is_ok());
    }

    #[test]
    fn put_replaces_stale_tokens() {
        let mut store = IndexStore::new();
        store.put_document(doc("a", "red fox"), tokens(&["red", "fox"]));
        store.put_document(doc("a", "blue"), tokens(&["blue"]));
        assert!(store.matching_documents("red").is_none());
        assert!(store.matching_documents("fox").is_none());
        assert_eq!(store.get_document("a").unwrap().content, "blue");
        assert!(store.check_consistency().is_ok());
    }

    #[test]
    fn empty_document_is_stored_without_tokens() {
        let mut store = IndexStore::new();
        store.put_document(doc("a", ""), TokenMap::new());
        assert!(store.get_document("a").is_some());
        assert_eq!(store.token_count(), 0);
        assert!(store.check_consistency().is_ok());
    }

    #[test]
    fn clear_empties_everything() {
        let mut store = IndexStore::new();
        store.put_document(doc("a", "red"), tokens(&["red"]));
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.token_count(), 0);
        assert!(store.get_token_metadata("a").is_none());
    }

    #[test]
    fn snapshot_round_trips() {
        let mut store = IndexStore::new();
        store.put_document(doc("a", "red fox"), tokens(&["red", "fox"]));
        store.put_document(doc("b", "red hen"), tokens(&["red", "hen"]));
        store.put_document(doc("c", ""), TokenMap::new());
        let restored = IndexStore::from_snapshot(store.snapshot()).unwrap();
        assert_eq!(restored, store);
    }

    #[test]
    fn snapshot_is_independent_of_insertion_order() {
        let mut first = IndexStore::new();
        first.put_document(doc("a", "red fox"), tokens(&["red", "fox"]));
        first.put_document(doc("b", "red hen"), tokens(&["red", "hen"]));
        let mut second = IndexStore::new();
        second.put_document(doc("b", "red hen"), tokens(&["red", "hen"]));
        second.put_document(doc("a", "red fox"), tokens(&["red", "fox"]));
        assert_eq!(
            serde_json::to_string(&first.snapshot()).unwrap(),
            serde_json::to_string(&second.snapshot()).unwrap()
        );
    }

    #[test]
    fn inconsistent_snapshot_is_rejected() {
        let mut store = IndexStore::new();
        store.put_document(doc("a", "red fox"), tokens(&["red", "fox"]));
        let mut snapshot = store.snapshot();
        snapshot.inverted_index.remove("fox");
        assert!(matches!(IndexStore::from_snapshot(snapshot), Err(QpsError::MalformedSnapshot(_))));

        let mut snapshot = store.snapshot();
        snapshot.inverted_index.entry("ghost".into()).or_default().insert("a".into());
        assert!(matches!(IndexStore::from_snapshot(snapshot), Err(QpsError::MalformedSnapshot(_))));
    }
}
