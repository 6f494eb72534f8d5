use reviewdex_core::builder::{BuildContext, CancelToken, IndexBuilder, ParallelBuilder, SequentialBuilder};
use reviewdex_core::config::{BuildConfig, BuildMode};
use reviewdex_core::{DfBand, DfLimit, Diagnostics, Document, Index, IndexError, Tokenizer};
use std::collections::BTreeSet;
use std::sync::Arc;

fn reviews() -> Vec<Document> {
    vec![
        Document::new("doc1", "not a good book"),
        Document::new("doc2", "a good book"),
        Document::new("doc3", "a great book"),
    ]
}

fn corpus(n: usize) -> Vec<Document> {
    let words = ["plot", "slow", "characters", "loved", "boring", "ending", "great", "writing", "never", "again"];
    (0..n)
        .map(|i| {
            let text: Vec<&str> = (0..(5 + i % 7)).map(|j| words[(i * 3 + j * j) % words.len()]).collect();
            Document::new(format!("r{i}"), text.join(" "))
        })
        .collect()
}

fn config(partition_size: usize, workers: usize) -> BuildConfig {
    BuildConfig { partition_size, workers, ..BuildConfig::default() }
}

fn sequential(docs: Vec<Document>, cfg: BuildConfig) -> Index {
    let diagnostics = Diagnostics::new();
    SequentialBuilder::new(Arc::new(Tokenizer::default()), cfg)
        .build(docs, &BuildContext::new(&diagnostics))
        .unwrap()
        .index
}

fn parallel(docs: Vec<Document>, cfg: BuildConfig) -> Index {
    let diagnostics = Diagnostics::new();
    let output = ParallelBuilder::new(Arc::new(Tokenizer::default()), cfg)
        .build(docs, &BuildContext::new(&diagnostics))
        .unwrap();
    assert_eq!(output.report.mode, BuildMode::Parallel);
    output.index
}

#[test]
fn sequential_and_parallel_agree_on_three_reviews() {
    let seq = sequential(reviews(), config(50_000, 1));
    let par = parallel(reviews(), config(50_000, 4));

    let seq_terms: BTreeSet<&String> = seq.vocabulary().terms().iter().collect();
    let par_terms: BTreeSet<&String> = par.vocabulary().terms().iter().collect();
    assert_eq!(seq_terms, par_terms);
    for term in seq.vocabulary().terms() {
        assert_eq!(seq.collection_freq(term), par.collection_freq(term), "{term}");
    }
    assert_eq!(seq, par);
}

#[test]
fn partitioning_does_not_change_the_index() {
    let whole = sequential(corpus(200), config(50_000, 1));
    let small = sequential(corpus(200), config(7, 1));
    let par = parallel(corpus(200), config(13, 3));
    assert_eq!(whole, small);
    assert_eq!(whole, par);
}

#[test]
fn negation_marker_is_its_own_term() {
    let index = sequential(reviews(), config(50_000, 1));
    assert_eq!(index.doc_freq("not"), 1);
    assert_eq!(index.doc_freq("not good"), 1);
    assert_eq!(index.doc_freq("good"), 2);
    assert_eq!(index.doc_freq("good book"), 2);
    assert_eq!(index.doc_id("doc3"), Some(2));
}

#[test]
fn frequencies_are_conserved() {
    let index = sequential(corpus(120), config(25, 1));
    index.verify("test").unwrap();
    let cf_total: u64 = index.vocabulary().terms().iter().map(|t| index.collection_freq(t)).sum();
    assert_eq!(cf_total, index.stats().total_tokens);
    for (doc_id, meta) in index.docs().iter().enumerate() {
        let row_total: u64 = index.doc_terms(doc_id as u32).iter().map(|&(_, tf)| tf as u64).sum();
        assert_eq!(row_total, meta.length);
    }
}

#[test]
fn empty_documents_are_kept() {
    let docs = vec![Document::new("a", ""), Document::new("b", "🔥🔥"), Document::new("c", "lovely book")];
    let diagnostics = Diagnostics::new();
    let output = SequentialBuilder::new(Arc::new(Tokenizer::default()), BuildConfig::default())
        .build(docs, &BuildContext::new(&diagnostics))
        .unwrap();
    assert_eq!(output.index.num_docs(), 3);
    assert_eq!(output.report.empty_documents, 2);
    assert_eq!(output.index.doc(0).unwrap().length, 0);
    assert!(diagnostics.notes().iter().any(|n| n.contains("produced no terms")));
}

#[test]
fn cancelled_build_stops_between_partitions() {
    let diagnostics = Diagnostics::new();
    let cancel = CancelToken::new();
    let ctx = BuildContext::with_cancel(&diagnostics, cancel.clone());
    let trigger = cancel.clone();
    // cancel once the second partition has been pulled
    let docs = corpus(30).into_iter().enumerate().map(move |(i, d)| {
        if i == 12 {
            trigger.cancel();
        }
        d
    });
    let err = SequentialBuilder::new(Arc::new(Tokenizer::default()), config(10, 1))
        .build(docs, &ctx)
        .unwrap_err();
    match err {
        IndexError::Cancelled { partition, documents_indexed } => {
            assert_eq!(partition, 1);
            assert_eq!(documents_indexed, 10);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn pruning_respects_band_and_is_idempotent() {
    let index = sequential(corpus(200), config(50_000, 1));
    let band = DfBand::new(5, DfLimit::Ratio(0.85));
    let pruned = index.prune(&band);

    assert!(pruned.vocabulary().len() <= index.vocabulary().len());
    let max = band.max_for(index.num_docs());
    for term in pruned.vocabulary().terms() {
        let df = pruned.doc_freq(term);
        assert!(df >= 5 && df <= max, "{term} has df {df}");
    }
    assert_eq!(pruned.num_docs(), index.num_docs());
    pruned.verify("prune").unwrap();
    assert_eq!(pruned.prune(&band), pruned);
}

#[test]
fn band_in_config_prunes_during_build() {
    let band = DfBand::new(2, DfLimit::Count(2));
    let cfg = BuildConfig { df_band: Some(band), ..BuildConfig::default() };
    let diagnostics = Diagnostics::new();
    let output = SequentialBuilder::new(Arc::new(Tokenizer::default()), cfg)
        .build(reviews(), &BuildContext::new(&diagnostics))
        .unwrap();
    let terms: Vec<&str> = output.index.vocabulary().terms().iter().map(String::as_str).collect();
    assert_eq!(terms, vec!["good", "good book"]);
    assert!(output.report.terms_before_pruning > output.report.terms);
    assert!(diagnostics.timing("Pruning").is_some());
}

#[test]
fn ratio_bound_below_min_df_is_not_widened() {
    let docs = vec![
        Document::new("a", "plot plot"),
        Document::new("b", "plot twist"),
        Document::new("c", "plot ending"),
        Document::new("d", "twist"),
    ];
    let index = sequential(docs, config(50_000, 1));
    assert_eq!(index.doc_freq("plot"), 3);

    let band = DfBand::new(3, DfLimit::Ratio(0.5));
    band.validate().unwrap();
    let pruned = index.prune(&band);
    assert!(pruned.vocabulary().is_empty());
    assert!(pruned.docs().iter().all(|d| d.length == 0));
    pruned.verify("prune").unwrap();

    let pruned = index.prune(&DfBand::new(2, DfLimit::Ratio(0.5)));
    let terms: Vec<&str> = pruned.vocabulary().terms().iter().map(String::as_str).collect();
    assert_eq!(terms, vec!["twist"]);
}
