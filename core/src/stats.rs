use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::mem::size_of;

use crate::index::{DocMeta, Index, Posting, TermId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStatistics {
    pub document_count: u32,
    pub vocabulary_size: u32,
    pub avg_doc_length: f64,
    pub max_doc_length: u64,
    pub min_doc_length: u64,
    pub avg_term_freq: f64,
    pub max_term_freq: u64,
    pub min_term_freq: u64,
    pub avg_doc_freq: f64,
    pub max_doc_freq: u32,
    pub min_doc_freq: u32,
}

/// Approximate heap footprint per component, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    pub term_doc: usize,
    pub doc_term: usize,
    pub vocabulary: usize,
    pub documents: usize,
}

impl MemoryUsage {
    pub fn total(&self) -> usize {
        self.term_doc + self.doc_term + self.vocabulary + self.documents
    }
}

impl Index {
    pub fn statistics(&self) -> IndexStatistics {
        let lengths = self.docs().iter().map(|d| d.length);
        let cfs = (0..self.vocabulary().len() as TermId).map(|t| self.collection_freq_by_id(t));
        let dfs = (0..self.vocabulary().len() as TermId).map(|t| self.doc_freq_by_id(t));
        let num_terms = self.vocabulary().len().max(1) as f64;

        IndexStatistics {
            document_count: self.num_docs(),
            vocabulary_size: self.vocabulary().len() as u32,
            avg_doc_length: self.stats().avg_doc_len,
            max_doc_length: lengths.clone().max().unwrap_or(0),
            min_doc_length: lengths.min().unwrap_or(0),
            avg_term_freq: self.stats().total_tokens as f64 / num_terms,
            max_term_freq: cfs.clone().max().unwrap_or(0),
            min_term_freq: cfs.min().unwrap_or(0),
            avg_doc_freq: self.stats().num_postings as f64 / num_terms,
            max_doc_freq: dfs.clone().max().unwrap_or(0),
            min_doc_freq: dfs.min().unwrap_or(0),
        }
    }

    /// The `n` terms with the highest collection frequency, ties broken by
    /// term order.
    pub fn most_frequent_terms(&self, n: usize) -> Vec<(String, u64)> {
        if n == 0 {
            return Vec::new();
        }
        // min-heap of the best n seen so far
        let mut heap: BinaryHeap<Reverse<(u64, Reverse<TermId>)>> = BinaryHeap::with_capacity(n + 1);
        for term_id in 0..self.vocabulary().len() as TermId {
            heap.push(Reverse((self.collection_freq_by_id(term_id), Reverse(term_id))));
            if heap.len() > n {
                heap.pop();
            }
        }
        let mut top: Vec<(u64, TermId)> = heap.into_iter().map(|Reverse((cf, Reverse(t)))| (cf, t)).collect();
        top.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        top.into_iter()
            .filter_map(|(cf, t)| self.vocabulary().term(t).map(|s| (s.to_string(), cf)))
            .collect()
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let term_doc = self
            .term_doc()
            .iter()
            .map(|p| size_of::<Vec<Posting>>() + p.capacity() * size_of::<Posting>())
            .sum::<usize>()
            + self.vocabulary().len() * size_of::<u64>();
        let doc_term = self
            .doc_term()
            .iter()
            .map(|r| size_of::<Vec<(TermId, u32)>>() + r.capacity() * size_of::<(TermId, u32)>())
            .sum();
        // terms are stored twice: the sorted list and the lookup keys
        let vocabulary = self
            .vocabulary()
            .terms()
            .iter()
            .map(|t| 2 * (size_of::<String>() + t.capacity()) + size_of::<TermId>())
            .sum();
        let documents = self
            .docs()
            .iter()
            .map(|d| 2 * (size_of::<DocMeta>() + d.external_id.capacity()) + size_of::<u32>())
            .sum();
        MemoryUsage { term_doc, doc_term, vocabulary, documents }
    }
}
