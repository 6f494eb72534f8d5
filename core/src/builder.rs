//! Index construction.
//!
//! The corpus is consumed in partitions of `partition_size` documents so only
//! one partition of raw text is resident at a time. Each partition is
//! tokenized into one or more [`PartialIndex`] values covering contiguous
//! document ranges; these are folded into the accumulator in document order
//! on the calling thread. The parallel builder only changes who computes the
//! partials, never the order they are folded in, so both builders produce
//! identical indexes.

use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{available_workers, BuildConfig, BuildMode};
use crate::diagnostics::Diagnostics;
use crate::error::{IndexError, IndexResult};
use crate::index::{DocId, DocMeta, Document, Index, Posting, TermId, Vocabulary};
use crate::tokenizer::Tokenizer;

/// Cooperative cancellation flag, checked between partitions.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-build context threaded through by the caller.
pub struct BuildContext<'a> {
    pub diagnostics: &'a Diagnostics,
    pub cancel: CancelToken,
}

impl<'a> BuildContext<'a> {
    pub fn new(diagnostics: &'a Diagnostics) -> Self {
        Self { diagnostics, cancel: CancelToken::new() }
    }

    pub fn with_cancel(diagnostics: &'a Diagnostics, cancel: CancelToken) -> Self {
        Self { diagnostics, cancel }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Mode actually used, after any fallback.
    pub mode: BuildMode,
    pub workers: usize,
    pub partitions: usize,
    pub documents: usize,
    pub empty_documents: usize,
    pub terms_before_pruning: usize,
    pub terms: usize,
    pub postings: u64,
    pub elapsed: Duration,
    pub estimated_memory_bytes: usize,
    pub notes: Vec<String>,
}

#[derive(Debug)]
pub struct BuildOutput {
    pub index: Index,
    pub report: BuildReport,
}

/// Something that turns a corpus into an [`Index`].
pub trait IndexBuilder {
    fn mode(&self) -> BuildMode;

    fn build<I>(&self, corpus: I, ctx: &BuildContext<'_>) -> IndexResult<BuildOutput>
    where
        I: IntoIterator<Item = Document>;
}

/// Postings for a contiguous run of documents, keyed by term string.
#[derive(Debug, Default)]
struct PartialIndex {
    postings: HashMap<String, Vec<Posting>>,
    docs: Vec<DocMeta>,
}

impl PartialIndex {
    fn from_documents(documents: &[Document], first_doc: DocId, tokenizer: &Tokenizer) -> Self {
        let mut partial = PartialIndex { postings: HashMap::new(), docs: Vec::with_capacity(documents.len()) };
        let mut counts: HashMap<String, u32> = HashMap::new();
        for (offset, document) in documents.iter().enumerate() {
            let doc_id = first_doc + offset as DocId;
            let terms = tokenizer.tokenize(&document.text);
            let length = terms.len() as u64;
            for term in terms {
                *counts.entry(term).or_insert(0) += 1;
            }
            for (term, tf) in counts.drain() {
                partial.postings.entry(term).or_default().push(Posting { doc_id, tf });
            }
            partial.docs.push(DocMeta { external_id: document.key.clone(), length });
        }
        partial
    }
}

/// Running totals across partitions.
#[derive(Default)]
struct Accumulator {
    postings: HashMap<String, Vec<Posting>>,
    docs: Vec<DocMeta>,
    partitions: usize,
}

impl Accumulator {
    fn next_doc_id(&self) -> DocId {
        self.docs.len() as DocId
    }

    /// Partials must arrive in document order so postings stay sorted.
    fn absorb(&mut self, partial: PartialIndex) {
        for (term, plist) in partial.postings {
            match self.postings.get_mut(&term) {
                Some(existing) => existing.extend(plist),
                None => {
                    self.postings.insert(term, plist);
                }
            }
        }
        self.docs.extend(partial.docs);
    }

    /// Sort the vocabulary, assign term ids and transpose the postings into
    /// doc-term rows.
    fn finish(self, sort: impl FnOnce(&mut Vec<(String, Vec<Posting>)>)) -> Index {
        let mut entries: Vec<(String, Vec<Posting>)> = self.postings.into_iter().collect();
        sort(&mut entries);
        let (terms, term_doc): (Vec<String>, Vec<Vec<Posting>>) = entries.into_iter().unzip();

        let mut doc_term: Vec<Vec<(TermId, u32)>> = vec![Vec::new(); self.docs.len()];
        for (term_id, plist) in term_doc.iter().enumerate() {
            for p in plist {
                doc_term[p.doc_id as usize].push((term_id as TermId, p.tf));
            }
        }
        Index::from_parts(Vocabulary::from_sorted_trusted(terms), term_doc, doc_term, self.docs)
    }
}

/// Shared driver for both builders. `tokenize_partition` turns one partition
/// into ordered partials.
fn build_partitioned<I, F>(
    corpus: I,
    ctx: &BuildContext<'_>,
    config: &BuildConfig,
    mode: BuildMode,
    workers: usize,
    tokenize_partition: F,
    sort: impl FnOnce(&mut Vec<(String, Vec<Posting>)>),
) -> IndexResult<BuildOutput>
where
    I: IntoIterator<Item = Document>,
    F: Fn(&[Document], DocId) -> Vec<PartialIndex>,
{
    let started = Instant::now();
    let _span = tracing::info_span!("build", ?mode, workers).entered();
    tracing::info!(partition_size = config.partition_size, "starting index build");

    let mut acc = Accumulator::default();
    let mut corpus = corpus.into_iter();
    {
        let _t = ctx.diagnostics.timer("Indexing");
        loop {
            let batch: Vec<Document> = corpus.by_ref().take(config.partition_size.max(1)).collect();
            if batch.is_empty() {
                break;
            }
            if ctx.cancel.is_cancelled() {
                tracing::warn!(partition = acc.partitions, documents = acc.docs.len(), "build cancelled");
                return Err(IndexError::Cancelled { partition: acc.partitions, documents_indexed: acc.docs.len() });
            }
            let first = acc.next_doc_id();
            for partial in tokenize_partition(&batch, first) {
                acc.absorb(partial);
            }
            acc.partitions += 1;
            tracing::debug!(
                partition = acc.partitions,
                documents = acc.docs.len(),
                terms = acc.postings.len(),
                "partition merged"
            );
        }
    }

    let partitions = acc.partitions;
    let documents = acc.docs.len();
    let empty_documents = acc.docs.iter().filter(|d| d.length == 0).count();
    if empty_documents > 0 {
        ctx.diagnostics.note(format!("{empty_documents} documents produced no terms"));
    }

    let mut index = {
        let _t = ctx.diagnostics.timer("Merge");
        acc.finish(sort)
    };
    let terms_before_pruning = index.vocabulary().len();

    if let Some(band) = &config.df_band {
        band.validate()?;
        let _t = ctx.diagnostics.timer("Pruning");
        index = index.prune(band);
    }

    if config.verify {
        let _t = ctx.diagnostics.timer("Verify");
        index.verify("build")?;
    }

    let report = BuildReport {
        mode,
        workers,
        partitions,
        documents,
        empty_documents,
        terms_before_pruning,
        terms: index.vocabulary().len(),
        postings: index.stats().num_postings,
        elapsed: started.elapsed(),
        estimated_memory_bytes: index.memory_usage().total(),
        notes: ctx.diagnostics.notes(),
    };
    tracing::info!(
        documents,
        terms = report.terms,
        postings = report.postings,
        elapsed_s = report.elapsed.as_secs_f64(),
        "index build complete"
    );
    Ok(BuildOutput { index, report })
}

/// Single-threaded construction.
#[derive(Debug, Clone)]
pub struct SequentialBuilder {
    tokenizer: Arc<Tokenizer>,
    config: BuildConfig,
}

impl SequentialBuilder {
    pub fn new(tokenizer: Arc<Tokenizer>, config: BuildConfig) -> Self {
        Self { tokenizer, config }
    }
}

impl IndexBuilder for SequentialBuilder {
    fn mode(&self) -> BuildMode {
        BuildMode::Sequential
    }

    fn build<I>(&self, corpus: I, ctx: &BuildContext<'_>) -> IndexResult<BuildOutput>
    where
        I: IntoIterator<Item = Document>,
    {
        let tokenizer = &self.tokenizer;
        build_partitioned(
            corpus,
            ctx,
            &self.config,
            BuildMode::Sequential,
            1,
            |batch, first| vec![PartialIndex::from_documents(batch, first, tokenizer)],
            |entries| entries.sort_unstable_by(|a, b| a.0.cmp(&b.0)),
        )
    }
}

/// Multi-threaded construction on a dedicated rayon pool. Falls back to
/// [`SequentialBuilder`] when the pool cannot be started.
#[derive(Debug, Clone)]
pub struct ParallelBuilder {
    tokenizer: Arc<Tokenizer>,
    config: BuildConfig,
    workers: usize,
}

impl ParallelBuilder {
    pub fn new(tokenizer: Arc<Tokenizer>, config: BuildConfig) -> Self {
        let workers = config.effective_workers().max(1);
        Self { tokenizer, config, workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl IndexBuilder for ParallelBuilder {
    fn mode(&self) -> BuildMode {
        BuildMode::Parallel
    }

    fn build<I>(&self, corpus: I, ctx: &BuildContext<'_>) -> IndexResult<BuildOutput>
    where
        I: IntoIterator<Item = Document>,
    {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("index-worker-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(err) => {
                tracing::warn!(%err, workers = self.workers, "parallel pool unavailable, building sequentially");
                ctx.diagnostics.note(format!("parallel backend unavailable ({err}); used sequential build"));
                return SequentialBuilder::new(self.tokenizer.clone(), self.config.clone()).build(corpus, ctx);
            }
        };

        let tokenizer = &self.tokenizer;
        let workers = self.workers;
        build_partitioned(
            corpus,
            ctx,
            &self.config,
            BuildMode::Parallel,
            workers,
            |batch, first| {
                let chunk_len = batch.len().div_ceil(workers).max(1);
                pool.install(|| {
                    batch
                        .par_chunks(chunk_len)
                        .enumerate()
                        .map(|(i, chunk)| {
                            PartialIndex::from_documents(chunk, first + (i * chunk_len) as DocId, tokenizer)
                        })
                        .collect::<Vec<_>>()
                })
            },
            |entries| pool.install(|| entries.par_sort_unstable_by(|a, b| a.0.cmp(&b.0))),
        )
    }
}

/// Either builder, chosen at runtime by [`select_builder`].
#[derive(Debug, Clone)]
pub enum Builder {
    Sequential(SequentialBuilder),
    Parallel(ParallelBuilder),
}

impl IndexBuilder for Builder {
    fn mode(&self) -> BuildMode {
        match self {
            Builder::Sequential(b) => b.mode(),
            Builder::Parallel(b) => b.mode(),
        }
    }

    fn build<I>(&self, corpus: I, ctx: &BuildContext<'_>) -> IndexResult<BuildOutput>
    where
        I: IntoIterator<Item = Document>,
    {
        match self {
            Builder::Sequential(b) => b.build(corpus, ctx),
            Builder::Parallel(b) => b.build(corpus, ctx),
        }
    }
}

/// Construction policy: sequential when forced, when only one worker is
/// available, or when the corpus is known to be below the threshold.
pub fn choose_mode(config: &BuildConfig, corpus_size_hint: Option<usize>, available: usize) -> BuildMode {
    match config.mode {
        BuildMode::Sequential => BuildMode::Sequential,
        _ if available < 2 => BuildMode::Sequential,
        BuildMode::Parallel => BuildMode::Parallel,
        BuildMode::Auto => match corpus_size_hint {
            Some(n) if n < config.parallel_threshold => BuildMode::Sequential,
            _ => BuildMode::Parallel,
        },
    }
}

pub fn select_builder(tokenizer: Arc<Tokenizer>, config: &BuildConfig, corpus_size_hint: Option<usize>) -> Builder {
    let available = if config.workers > 0 { config.workers } else { available_workers() };
    let mode = choose_mode(config, corpus_size_hint, available);
    tracing::debug!(?mode, available, corpus_size_hint, "selected index builder");
    match mode {
        BuildMode::Parallel => Builder::Parallel(ParallelBuilder::new(tokenizer, config.clone())),
        _ => Builder::Sequential(SequentialBuilder::new(tokenizer, config.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(mode: BuildMode) -> BuildConfig {
        BuildConfig { mode, parallel_threshold: 100, ..BuildConfig::default() }
    }

    #[test]
    fn policy() {
        assert_eq!(choose_mode(&cfg(BuildMode::Auto), Some(10), 8), BuildMode::Sequential);
        assert_eq!(choose_mode(&cfg(BuildMode::Auto), Some(1000), 8), BuildMode::Parallel);
        assert_eq!(choose_mode(&cfg(BuildMode::Auto), None, 8), BuildMode::Parallel);
        assert_eq!(choose_mode(&cfg(BuildMode::Parallel), Some(1000), 1), BuildMode::Sequential);
        assert_eq!(choose_mode(&cfg(BuildMode::Sequential), Some(1000), 8), BuildMode::Sequential);
        assert_eq!(choose_mode(&cfg(BuildMode::Parallel), Some(1), 4), BuildMode::Parallel);
    }

    #[test]
    fn partial_counts_terms_per_document() {
        let tokenizer = Tokenizer::default();
        let docs = vec![Document::new("a", "book book"), Document::new("b", "")];
        let partial = PartialIndex::from_documents(&docs, 7, &tokenizer);
        assert_eq!(partial.postings["book"], vec![Posting { doc_id: 7, tf: 2 }]);
        assert_eq!(partial.postings["book book"], vec![Posting { doc_id: 7, tf: 1 }]);
        assert_eq!(partial.docs[0].length, 3);
        assert_eq!(partial.docs[1].length, 0);
    }
}
