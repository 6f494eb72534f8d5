use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::diagnostics::Diagnostics;
use crate::index::{DocId, Index, TermId};
use crate::tokenizer::Tokenizer;
use crate::weighting::{bim_weight, Weighting};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalModel {
    /// Binary Independence Model.
    Bim,
    TfIdf,
}

impl RetrievalModel {
    fn task_name(self) -> &'static str {
        match self {
            RetrievalModel::Bim => "BIM Search",
            RetrievalModel::TfIdf => "TF-IDF Search",
        }
    }
}

impl FromStr for RetrievalModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bim" => Ok(RetrievalModel::Bim),
            "tfidf" | "tf-idf" => Ok(RetrievalModel::TfIdf),
            other => Err(format!("unknown retrieval model {other:?} (expected bim or tfidf)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Free text, normalized with the index tokenizer.
    Text(String),
    /// Already-normalized index terms.
    Terms(Vec<String>),
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::Text(text.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub external_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    /// Query terms found in the vocabulary.
    pub terms: Vec<String>,
    pub hits: Vec<ScoredDoc>,
    pub total_hits: usize,
    pub elapsed: Duration,
}

/// Ranks documents against the prebuilt postings. Holds the index by `Arc`,
/// so clones are cheap and searches can run concurrently.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    index: Arc<Index>,
    tokenizer: Arc<Tokenizer>,
    weighting: Weighting,
}

impl QueryEngine {
    pub fn new(index: Arc<Index>, tokenizer: Arc<Tokenizer>, weighting: Weighting) -> Self {
        Self { index, tokenizer, weighting }
    }

    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    pub fn tokenizer(&self) -> &Arc<Tokenizer> {
        &self.tokenizer
    }

    pub fn weighting(&self) -> Weighting {
        self.weighting
    }

    /// Distinct vocabulary ids of the query terms, ascending.
    fn resolve(&self, query: &Query) -> Vec<TermId> {
        let terms = match query {
            Query::Text(text) => self.tokenizer.tokenize(text),
            Query::Terms(terms) => terms.clone(),
        };
        let vocab = self.index.vocabulary();
        let mut ids: Vec<TermId> = terms.iter().filter_map(|t| vocab.get(t)).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// tf-idf weight of `term` in `doc_id`; zero when either is unknown.
    pub fn tf_idf(&self, term: &str, doc_id: DocId) -> f64 {
        let df = self.index.doc_freq(term);
        if df == 0 {
            return 0.0;
        }
        self.weighting.tf_idf(self.index.term_freq(term, doc_id), self.index.num_docs(), df)
    }

    pub fn bim_weight(&self, term: &str) -> f64 {
        bim_weight(self.index.num_docs(), self.index.doc_freq(term))
    }

    /// Rank the documents containing at least one query term. Scores are
    /// descending with ties broken by ascending `DocId`; `k == 0` keeps all
    /// hits.
    pub fn search(&self, query: &Query, model: RetrievalModel, k: usize, diagnostics: &Diagnostics) -> SearchResults {
        let started = Instant::now();
        let _t = diagnostics.timer(model.task_name());
        let term_ids = self.resolve(query);
        let n = self.index.num_docs();

        let mut scores: HashMap<DocId, f64> = HashMap::new();
        for &term_id in &term_ids {
            let postings = self.index.postings(term_id);
            let df = postings.len() as u32;
            match model {
                RetrievalModel::Bim => {
                    let w = bim_weight(n, df);
                    for p in postings {
                        *scores.entry(p.doc_id).or_insert(0.0) += w;
                    }
                }
                RetrievalModel::TfIdf => {
                    for p in postings {
                        *scores.entry(p.doc_id).or_insert(0.0) += self.weighting.tf_idf(p.tf, n, df);
                    }
                }
            }
        }

        let mut ranked: Vec<(DocId, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        let total_hits = ranked.len();
        if k > 0 {
            ranked.truncate(k);
        }

        let hits = ranked
            .into_iter()
            .filter_map(|(doc_id, score)| {
                self.index.doc(doc_id).map(|d| ScoredDoc { doc_id, external_id: d.external_id.clone(), score })
            })
            .collect();
        let terms = term_ids
            .iter()
            .filter_map(|&t| self.index.vocabulary().term(t).map(str::to_string))
            .collect::<Vec<_>>();

        let elapsed = started.elapsed();
        if terms.is_empty() {
            tracing::debug!(?query, "no query terms in vocabulary");
        }
        tracing::info!(?model, terms = terms.len(), total_hits, elapsed_s = elapsed.as_secs_f64(), "search complete");
        SearchResults { terms, hits, total_hits, elapsed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_model_names() {
        assert_eq!("BIM".parse::<RetrievalModel>().unwrap(), RetrievalModel::Bim);
        assert_eq!("tf-idf".parse::<RetrievalModel>().unwrap(), RetrievalModel::TfIdf);
        assert!("bm25".parse::<RetrievalModel>().is_err());
    }
}
