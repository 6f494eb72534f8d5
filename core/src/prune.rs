use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};
use crate::index::{DocMeta, Index, TermId, Vocabulary};

/// Upper bound of a document-frequency band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DfLimit {
    /// At most this many documents.
    Count(u32),
    /// At most this fraction of all documents.
    Ratio(f64),
}

/// Keep only terms whose document frequency lies in `[min_df, max_df]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DfBand {
    pub min_df: u32,
    pub max_df: DfLimit,
}

impl Default for DfBand {
    fn default() -> Self {
        Self { min_df: 1, max_df: DfLimit::Ratio(1.0) }
    }
}

impl DfBand {
    pub fn new(min_df: u32, max_df: DfLimit) -> Self {
        Self { min_df, max_df }
    }

    pub fn validate(&self) -> IndexResult<()> {
        match self.max_df {
            DfLimit::Ratio(r) if !(0.0..=1.0).contains(&r) => {
                Err(IndexError::Config(format!("max_df ratio {r} is outside [0, 1]")))
            }
            DfLimit::Count(c) if c < self.min_df => {
                Err(IndexError::Config(format!("max_df {c} is below min_df {}", self.min_df)))
            }
            _ => Ok(()),
        }
    }

    /// Absolute upper bound for a corpus of `num_docs` documents. May fall
    /// below `min_df`, in which case no term fits the band.
    pub fn max_for(&self, num_docs: u32) -> u32 {
        match self.max_df {
            DfLimit::Count(c) => c,
            DfLimit::Ratio(r) => (r * num_docs as f64).floor() as u32,
        }
    }

    /// True when no document frequency can satisfy the band.
    pub fn is_empty_for(&self, num_docs: u32) -> bool {
        self.max_for(num_docs) < self.min_df
    }

    pub fn contains(&self, df: u32, num_docs: u32) -> bool {
        df >= self.min_df && df <= self.max_for(num_docs)
    }
}

impl Index {
    /// A new index restricted to the terms inside `band`.
    ///
    /// Decisions use the document frequencies of the whole index. Every
    /// document is kept; its length shrinks to the terms that remain, so the
    /// frequency invariants still hold. Pruning twice with the same band is a
    /// no-op the second time.
    pub fn prune(&self, band: &DfBand) -> Index {
        let num_docs = self.num_docs();
        let old_terms = self.vocabulary().terms();
        if band.is_empty_for(num_docs) {
            tracing::warn!(
                min_df = band.min_df,
                max_df = band.max_for(num_docs),
                num_docs,
                "df band is empty for this corpus, every term will be dropped"
            );
        }

        let mut remap: Vec<Option<TermId>> = Vec::with_capacity(old_terms.len());
        let mut kept_terms = Vec::new();
        let mut term_doc = Vec::new();
        for (old_id, plist) in self.term_doc().iter().enumerate() {
            if band.contains(plist.len() as u32, num_docs) {
                remap.push(Some(kept_terms.len() as TermId));
                kept_terms.push(old_terms[old_id].clone());
                term_doc.push(plist.clone());
            } else {
                remap.push(None);
            }
        }

        let mut docs = Vec::with_capacity(self.docs().len());
        let doc_term: Vec<Vec<(TermId, u32)>> = self
            .doc_term()
            .iter()
            .zip(self.docs())
            .map(|(row, meta)| {
                let row: Vec<(TermId, u32)> = row
                    .iter()
                    .filter_map(|&(t, tf)| remap.get(t as usize).copied().flatten().map(|nt| (nt, tf)))
                    .collect();
                docs.push(DocMeta {
                    external_id: meta.external_id.clone(),
                    length: row.iter().map(|&(_, tf)| tf as u64).sum(),
                });
                row
            })
            .collect();

        tracing::info!(
            before = old_terms.len(),
            after = kept_terms.len(),
            min_df = band.min_df,
            max_df = band.max_for(num_docs),
            "pruned vocabulary to df band"
        );

        // Filtering a sorted, duplicate-free list keeps it so.
        let vocab = Vocabulary::from_sorted_trusted(kept_terms);
        Index::from_parts(vocab, term_doc, doc_term, docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_resolves_against_corpus() {
        let band = DfBand::new(5, DfLimit::Ratio(0.85));
        assert_eq!(band.max_for(100), 85);
        assert!(band.contains(5, 100));
        assert!(!band.contains(4, 100));
        assert!(!band.contains(86, 100));
    }

    #[test]
    fn ratio_below_min_df_keeps_nothing() {
        let band = DfBand::new(3, DfLimit::Ratio(0.5));
        assert_eq!(band.max_for(4), 2);
        assert!(band.is_empty_for(4));
        assert!(!band.contains(3, 4));
        assert!(!band.contains(2, 4));
        assert!(!band.is_empty_for(6));
    }

    #[test]
    fn invalid_bands() {
        assert!(DfBand::new(1, DfLimit::Ratio(1.5)).validate().is_err());
        assert!(DfBand::new(10, DfLimit::Count(3)).validate().is_err());
        assert!(DfBand::default().validate().is_ok());
    }
}
