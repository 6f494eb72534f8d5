//! Vector-space view of an index for downstream learners.
//!
//! Every document maps to an L2-normalized tf-idf vector over the index
//! vocabulary; component `i` belongs to term id `i`. The three backends differ
//! only in representation and when the work is done.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::index::{DocId, Index, TermId, Vocabulary};
use crate::weighting::Weighting;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TermVector {
    Dense(Vec<f64>),
    Sparse { dimension: usize, entries: Vec<(TermId, f64)> },
}

impl TermVector {
    pub fn zero(dimension: usize) -> Self {
        TermVector::Sparse { dimension, entries: Vec::new() }
    }

    pub fn dimension(&self) -> usize {
        match self {
            TermVector::Dense(v) => v.len(),
            TermVector::Sparse { dimension, .. } => *dimension,
        }
    }

    pub fn get(&self, term_id: TermId) -> f64 {
        match self {
            TermVector::Dense(v) => v.get(term_id as usize).copied().unwrap_or(0.0),
            TermVector::Sparse { entries, .. } => entries
                .binary_search_by_key(&term_id, |&(t, _)| t)
                .map(|i| entries[i].1)
                .unwrap_or(0.0),
        }
    }

    /// Non-zero entries sorted by term id.
    pub fn to_sparse(&self) -> Vec<(TermId, f64)> {
        match self {
            TermVector::Dense(v) => v
                .iter()
                .enumerate()
                .filter(|(_, &w)| w != 0.0)
                .map(|(i, &w)| (i as TermId, w))
                .collect(),
            TermVector::Sparse { entries, .. } => entries.clone(),
        }
    }

    pub fn nnz(&self) -> usize {
        match self {
            TermVector::Dense(v) => v.iter().filter(|&&w| w != 0.0).count(),
            TermVector::Sparse { entries, .. } => entries.len(),
        }
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn dot(&self, other: &TermVector) -> f64 {
        match (self, other) {
            (TermVector::Dense(a), TermVector::Dense(b)) => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            (TermVector::Sparse { entries: a, .. }, TermVector::Sparse { entries: b, .. }) => {
                let (mut i, mut j, mut sum) = (0, 0, 0.0);
                while i < a.len() && j < b.len() {
                    match a[i].0.cmp(&b[j].0) {
                        std::cmp::Ordering::Less => i += 1,
                        std::cmp::Ordering::Greater => j += 1,
                        std::cmp::Ordering::Equal => {
                            sum += a[i].1 * b[j].1;
                            i += 1;
                            j += 1;
                        }
                    }
                }
                sum
            }
            (sparse @ TermVector::Sparse { .. }, dense) | (dense, sparse @ TermVector::Sparse { .. }) => {
                sparse.to_sparse().iter().map(|&(t, w)| w * dense.get(t)).sum()
            }
        }
    }

    pub fn cosine(&self, other: &TermVector) -> f64 {
        let denom = self.norm() * other.norm();
        if denom == 0.0 {
            0.0
        } else {
            self.dot(other) / denom
        }
    }
}

/// Normalized tf-idf row of one document; empty if nothing carries weight.
fn weighted_row(index: &Index, weighting: &Weighting, doc_id: DocId) -> Vec<(TermId, f64)> {
    let n = index.num_docs();
    let mut row: Vec<(TermId, f64)> = index
        .doc_terms(doc_id)
        .iter()
        .map(|&(t, tf)| (t, weighting.tf_idf(tf, n, index.doc_freq_by_id(t))))
        .filter(|&(_, w)| w != 0.0)
        .collect();
    normalize(&mut row);
    row
}

fn normalize(row: &mut Vec<(TermId, f64)>) {
    let norm = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
    if norm == 0.0 {
        row.clear();
    } else {
        row.iter_mut().for_each(|(_, w)| *w /= norm);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VsmBackend {
    InMemory,
    Parallel,
    Sparse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VsmPreference {
    Auto,
    Baseline,
    Parallel,
    Sparse,
}

/// Document vectors over a fixed vocabulary.
pub trait VectorSpace: Send + Sync {
    fn backend(&self) -> VsmBackend;

    fn index(&self) -> &Index;

    fn vocabulary(&self) -> &Vocabulary {
        self.index().vocabulary()
    }

    fn dimension(&self) -> usize {
        self.vocabulary().len()
    }

    /// `None` for an unknown document.
    fn document_vector(&self, doc_id: DocId) -> Option<TermVector>;

    fn document_vectors(&self, doc_ids: &[DocId]) -> Vec<Option<TermVector>> {
        doc_ids.iter().map(|&d| self.document_vector(d)).collect()
    }

    /// Normalized centroid of several documents, e.g. all reviews by one
    /// user. Unknown documents are skipped.
    fn aggregate(&self, doc_ids: &[DocId]) -> TermVector {
        let mut sum: BTreeMap<TermId, f64> = BTreeMap::new();
        for vector in self.document_vectors(doc_ids).into_iter().flatten() {
            for (t, w) in vector.to_sparse() {
                *sum.entry(t).or_insert(0.0) += w;
            }
        }
        let mut entries: Vec<(TermId, f64)> = sum.into_iter().filter(|&(_, w)| w != 0.0).collect();
        normalize(&mut entries);
        TermVector::Sparse { dimension: self.dimension(), entries }
    }

    /// Cosine similarity of two documents; `None` if either is unknown.
    fn similarity(&self, a: DocId, b: DocId) -> Option<f64> {
        Some(self.document_vector(a)?.cosine(&self.document_vector(b)?))
    }

    /// The `n` documents closest to `doc_id` by cosine, best first, ties by
    /// id. The document itself is never listed. `n == 0` returns every other
    /// document.
    fn most_similar(&self, doc_id: DocId, n: usize) -> Vec<(DocId, f64)> {
        let Some(target) = self.document_vector(doc_id) else { return Vec::new() };
        let others: Vec<DocId> = (0..self.index().num_docs()).filter(|&d| d != doc_id).collect();
        let mut scored: Vec<(DocId, f64)> = others
            .iter()
            .zip(self.document_vectors(&others))
            .filter_map(|(&d, v)| v.map(|v| (d, target.cosine(&v))))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        if n > 0 {
            scored.truncate(n);
        }
        scored
    }
}

/// Baseline: dense vectors computed on demand.
pub struct InMemoryVectorSpace {
    index: Arc<Index>,
    weighting: Weighting,
}

impl InMemoryVectorSpace {
    pub fn new(index: Arc<Index>, weighting: Weighting) -> Self {
        Self { index, weighting }
    }
}

impl VectorSpace for InMemoryVectorSpace {
    fn backend(&self) -> VsmBackend {
        VsmBackend::InMemory
    }

    fn index(&self) -> &Index {
        &self.index
    }

    fn document_vector(&self, doc_id: DocId) -> Option<TermVector> {
        self.index.doc(doc_id)?;
        let mut dense = vec![0.0; self.dimension()];
        for (t, w) in weighted_row(&self.index, &self.weighting, doc_id) {
            if let Some(slot) = dense.get_mut(t as usize) {
                *slot = w;
            }
        }
        Some(TermVector::Dense(dense))
    }
}

/// Sparse vectors computed on demand.
pub struct SparseVectorSpace {
    index: Arc<Index>,
    weighting: Weighting,
}

impl SparseVectorSpace {
    pub fn new(index: Arc<Index>, weighting: Weighting) -> Self {
        Self { index, weighting }
    }
}

impl VectorSpace for SparseVectorSpace {
    fn backend(&self) -> VsmBackend {
        VsmBackend::Sparse
    }

    fn index(&self) -> &Index {
        &self.index
    }

    fn document_vector(&self, doc_id: DocId) -> Option<TermVector> {
        self.index.doc(doc_id)?;
        Some(TermVector::Sparse {
            dimension: self.dimension(),
            entries: weighted_row(&self.index, &self.weighting, doc_id),
        })
    }
}

/// All rows precomputed up front on the rayon pool.
pub struct ParallelVectorSpace {
    index: Arc<Index>,
    rows: Vec<Vec<(TermId, f64)>>,
}

impl ParallelVectorSpace {
    pub fn new(index: Arc<Index>, weighting: Weighting) -> Self {
        let rows = (0..index.num_docs())
            .into_par_iter()
            .map(|d| weighted_row(&index, &weighting, d))
            .collect();
        Self { index, rows }
    }
}

impl VectorSpace for ParallelVectorSpace {
    fn backend(&self) -> VsmBackend {
        VsmBackend::Parallel
    }

    fn index(&self) -> &Index {
        &self.index
    }

    fn document_vector(&self, doc_id: DocId) -> Option<TermVector> {
        let row = self.rows.get(doc_id as usize)?;
        Some(TermVector::Sparse { dimension: self.dimension(), entries: row.clone() })
    }

    fn document_vectors(&self, doc_ids: &[DocId]) -> Vec<Option<TermVector>> {
        doc_ids.par_iter().map(|&d| self.document_vector(d)).collect()
    }
}

const DENSE_VOCAB_LIMIT: usize = 4_096;
const PARALLEL_DOC_THRESHOLD: u32 = 10_000;

pub fn select_vector_space(index: Arc<Index>, weighting: Weighting, preference: VsmPreference) -> Box<dyn VectorSpace> {
    let backend = match preference {
        VsmPreference::Baseline => VsmBackend::InMemory,
        VsmPreference::Parallel => VsmBackend::Parallel,
        VsmPreference::Sparse => VsmBackend::Sparse,
        VsmPreference::Auto if index.vocabulary().len() <= DENSE_VOCAB_LIMIT => VsmBackend::InMemory,
        VsmPreference::Auto if index.num_docs() >= PARALLEL_DOC_THRESHOLD => VsmBackend::Parallel,
        VsmPreference::Auto => VsmBackend::Sparse,
    };
    tracing::debug!(?preference, ?backend, "selected vector space backend");
    match backend {
        VsmBackend::InMemory => Box::new(InMemoryVectorSpace::new(index, weighting)),
        VsmBackend::Parallel => Box::new(ParallelVectorSpace::new(index, weighting)),
        VsmBackend::Sparse => Box::new(SparseVectorSpace::new(index, weighting)),
    }
}

/// The `n` heaviest terms of a document, for display.
pub fn top_weighted_terms(space: &dyn VectorSpace, doc_id: DocId, n: usize) -> Vec<(String, f64)> {
    let Some(vector) = space.document_vector(doc_id) else { return Vec::new() };
    let mut entries = vector.to_sparse();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    entries
        .into_iter()
        .take(n)
        .filter_map(|(t, w)| space.vocabulary().term(t).map(|s| (s.to_string(), w)))
        .collect()
}
