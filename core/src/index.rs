use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{IndexError, IndexResult};

pub type TermId = u32;
pub type DocId = u32;

/// A corpus entry: a stable external key and its raw text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub key: String,
    pub text: String,
}

impl Document {
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self { key: key.into(), text: text.into() }
    }

    /// Decode raw bytes as UTF-8. Undecodable text is replaced by an empty
    /// document so a single bad entry never aborts a build.
    pub fn from_bytes(key: impl Into<String>, bytes: Vec<u8>) -> Self {
        let key = key.into();
        match String::from_utf8(bytes) {
            Ok(text) => Self { key, text },
            Err(err) => {
                tracing::warn!(key = %key, %err, "document is not valid utf-8, indexing it as empty");
                Self { key, text: String::new() }
            }
        }
    }
}

/// Term-doc entry: the term occurs `tf` times in `doc_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMeta {
    pub external_id: String,
    /// Number of terms (unigrams and bigrams) the document contributed.
    pub length: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub num_docs: u32,
    pub num_terms: u32,
    pub num_postings: u64,
    /// Collection size in terms.
    pub total_tokens: u64,
    pub avg_doc_len: f64,
}

/// Sorted term list with a reverse lookup. A term's id is its rank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    terms: Vec<String>,
    lookup: HashMap<String, TermId>,
}

impl Vocabulary {
    /// `terms` must be sorted and free of duplicates.
    pub fn from_sorted(terms: Vec<String>) -> IndexResult<Self> {
        if let Some(w) = terms.windows(2).find(|w| w[0] >= w[1]) {
            return Err(IndexError::inconsistent(
                "vocabulary",
                format!("terms not strictly sorted at {:?} / {:?}", w[0], w[1]),
            ));
        }
        Ok(Self::from_sorted_trusted(terms))
    }

    pub(crate) fn from_sorted_trusted(terms: Vec<String>) -> Self {
        let lookup = terms.iter().enumerate().map(|(i, t)| (t.clone(), i as TermId)).collect();
        Self { terms, lookup }
    }

    pub fn get(&self, term: &str) -> Option<TermId> {
        self.lookup.get(term).copied()
    }

    pub fn term(&self, id: TermId) -> Option<&str> {
        self.terms.get(id as usize).map(String::as_str)
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// The built index: vocabulary, the term-doc and doc-term structures, and the
/// statistics scoring needs. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    vocab: Vocabulary,
    /// Indexed by `TermId`; postings sorted by `doc_id`.
    term_doc: Vec<Vec<Posting>>,
    /// Indexed by `DocId`; rows sorted by `TermId`.
    doc_term: Vec<Vec<(TermId, u32)>>,
    collection_freq: Vec<u64>,
    docs: Vec<DocMeta>,
    doc_lookup: HashMap<String, DocId>,
    stats: IndexStats,
}

impl Index {
    /// Assemble an index from its parts, deriving collection frequencies and
    /// statistics. Callers run [`Index::verify`] when the parts come from an
    /// untrusted source.
    pub(crate) fn from_parts(
        vocab: Vocabulary,
        term_doc: Vec<Vec<Posting>>,
        doc_term: Vec<Vec<(TermId, u32)>>,
        docs: Vec<DocMeta>,
    ) -> Self {
        let collection_freq: Vec<u64> =
            term_doc.iter().map(|plist| plist.iter().map(|p| p.tf as u64).sum()).collect();
        let total_tokens: u64 = docs.iter().map(|d| d.length).sum();
        let num_postings: u64 = term_doc.iter().map(|p| p.len() as u64).sum();
        let num_docs = docs.len() as u32;
        let stats = IndexStats {
            num_docs,
            num_terms: vocab.len() as u32,
            num_postings,
            total_tokens,
            avg_doc_len: if num_docs == 0 { 0.0 } else { total_tokens as f64 / num_docs as f64 },
        };
        let doc_lookup = docs.iter().enumerate().map(|(i, d)| (d.external_id.clone(), i as DocId)).collect();
        Self { vocab, term_doc, doc_term, collection_freq, docs, doc_lookup, stats }
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn num_docs(&self) -> u32 {
        self.stats.num_docs
    }

    pub fn docs(&self) -> &[DocMeta] {
        &self.docs
    }

    pub fn doc(&self, doc_id: DocId) -> Option<&DocMeta> {
        self.docs.get(doc_id as usize)
    }

    pub fn doc_id(&self, external_id: &str) -> Option<DocId> {
        self.doc_lookup.get(external_id).copied()
    }

    pub fn postings(&self, term_id: TermId) -> &[Posting] {
        self.term_doc.get(term_id as usize).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Postings for a term string; empty if the term is unknown.
    pub fn postings_for(&self, term: &str) -> &[Posting] {
        self.vocab.get(term).map(|id| self.postings(id)).unwrap_or(&[])
    }

    pub fn doc_terms(&self, doc_id: DocId) -> &[(TermId, u32)] {
        self.doc_term.get(doc_id as usize).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn term_doc(&self) -> &[Vec<Posting>] {
        &self.term_doc
    }

    pub(crate) fn doc_term(&self) -> &[Vec<(TermId, u32)>] {
        &self.doc_term
    }

    pub fn term_freq(&self, term: &str, doc_id: DocId) -> u32 {
        let Some(term_id) = self.vocab.get(term) else { return 0 };
        let row = self.doc_terms(doc_id);
        row.binary_search_by_key(&term_id, |&(t, _)| t).map(|i| row[i].1).unwrap_or(0)
    }

    pub fn doc_freq(&self, term: &str) -> u32 {
        self.postings_for(term).len() as u32
    }

    pub fn doc_freq_by_id(&self, term_id: TermId) -> u32 {
        self.postings(term_id).len() as u32
    }

    pub fn collection_freq(&self, term: &str) -> u64 {
        self.vocab.get(term).map(|id| self.collection_freq_by_id(id)).unwrap_or(0)
    }

    pub fn collection_freq_by_id(&self, term_id: TermId) -> u64 {
        self.collection_freq.get(term_id as usize).copied().unwrap_or(0)
    }

    /// Re-derive the summary statistics from both structures and check they
    /// agree with each other and with the stored values.
    pub fn verify(&self, stage: &'static str) -> IndexResult<()> {
        let num_terms = self.vocab.len();
        if self.term_doc.len() != num_terms || self.collection_freq.len() != num_terms {
            return Err(IndexError::inconsistent(
                stage,
                format!(
                    "vocabulary has {num_terms} terms but term-doc has {} lists",
                    self.term_doc.len()
                ),
            ));
        }
        if self.doc_term.len() != self.docs.len() {
            return Err(IndexError::inconsistent(
                stage,
                format!("{} documents but {} doc-term rows", self.docs.len(), self.doc_term.len()),
            ));
        }

        let mut derived_cf = vec![0u64; num_terms];
        let mut doc_side_postings = 0u64;
        let mut total_tokens = 0u64;
        for (doc_id, row) in self.doc_term.iter().enumerate() {
            let mut length = 0u64;
            let mut prev: Option<TermId> = None;
            for &(term_id, tf) in row {
                if prev.is_some_and(|p| p >= term_id) || term_id as usize >= num_terms || tf == 0 {
                    return Err(IndexError::inconsistent(
                        stage,
                        format!("malformed doc-term row for document {doc_id}"),
                    ));
                }
                prev = Some(term_id);
                let plist = &self.term_doc[term_id as usize];
                let found = plist
                    .binary_search_by_key(&(doc_id as DocId), |p| p.doc_id)
                    .map(|i| plist[i].tf);
                if found != Ok(tf) {
                    return Err(IndexError::inconsistent(
                        stage,
                        format!(
                            "term {:?} in document {doc_id}: doc-term says {tf}, term-doc says {:?}",
                            self.vocab.term(term_id).unwrap_or("?"),
                            found.ok()
                        ),
                    ));
                }
                derived_cf[term_id as usize] += tf as u64;
                length += tf as u64;
                doc_side_postings += 1;
            }
            if length != self.docs[doc_id].length {
                return Err(IndexError::inconsistent(
                    stage,
                    format!("document {doc_id} length {} but its terms sum to {length}", self.docs[doc_id].length),
                ));
            }
            total_tokens += length;
        }

        let term_side_postings: u64 = self.term_doc.iter().map(|p| p.len() as u64).sum();
        if term_side_postings != doc_side_postings || term_side_postings != self.stats.num_postings {
            return Err(IndexError::inconsistent(
                stage,
                format!("term-doc holds {term_side_postings} postings, doc-term holds {doc_side_postings}"),
            ));
        }
        if let Some(term_id) = (0..num_terms).find(|&t| derived_cf[t] != self.collection_freq[t]) {
            return Err(IndexError::inconsistent(
                stage,
                format!(
                    "collection frequency of {:?}: term-doc {} vs doc-term {}",
                    self.vocab.term(term_id as TermId).unwrap_or("?"),
                    self.collection_freq[term_id],
                    derived_cf[term_id]
                ),
            ));
        }
        if total_tokens != self.stats.total_tokens {
            return Err(IndexError::inconsistent(
                stage,
                format!("collection size {} but documents sum to {total_tokens}", self.stats.total_tokens),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> Index {
        let vocab = Vocabulary::from_sorted(vec!["book".into(), "good".into()]).unwrap();
        let term_doc = vec![
            vec![Posting { doc_id: 0, tf: 1 }, Posting { doc_id: 1, tf: 2 }],
            vec![Posting { doc_id: 1, tf: 1 }],
        ];
        let doc_term = vec![vec![(0, 1)], vec![(0, 2), (1, 1)]];
        let docs = vec![
            DocMeta { external_id: "a".into(), length: 1 },
            DocMeta { external_id: "b".into(), length: 3 },
        ];
        Index::from_parts(vocab, term_doc, doc_term, docs)
    }

    #[test]
    fn lookups() {
        let index = tiny();
        assert_eq!(index.term_freq("book", 1), 2);
        assert_eq!(index.term_freq("good", 0), 0);
        assert_eq!(index.term_freq("missing", 0), 0);
        assert_eq!(index.doc_freq("book"), 2);
        assert_eq!(index.collection_freq("book"), 3);
        assert_eq!(index.doc_id("b"), Some(1));
        assert_eq!(index.stats().avg_doc_len, 2.0);
        index.verify("test").unwrap();
    }

    #[test]
    fn verify_detects_mismatch() {
        let vocab = Vocabulary::from_sorted(vec!["book".into()]).unwrap();
        let term_doc = vec![vec![Posting { doc_id: 0, tf: 2 }]];
        let doc_term = vec![vec![(0, 1)]];
        let docs = vec![DocMeta { external_id: "a".into(), length: 1 }];
        let index = Index::from_parts(vocab, term_doc, doc_term, docs);
        let err = index.verify("merge").unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn unsorted_vocabulary_rejected() {
        assert!(Vocabulary::from_sorted(vec!["b".into(), "a".into()]).is_err());
    }

    #[test]
    fn undecodable_text_becomes_empty() {
        let doc = Document::from_bytes("x", vec![0xff, 0xfe]);
        assert!(doc.text.is_empty());
    }
}
