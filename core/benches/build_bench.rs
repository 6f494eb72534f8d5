use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use reviewdex_core::builder::{BuildContext, IndexBuilder, ParallelBuilder, SequentialBuilder};
use reviewdex_core::config::BuildConfig;
use reviewdex_core::{Diagnostics, Document, Tokenizer};
use std::sync::Arc;

const WORDS: &[&str] = &[
    "plot", "slow", "characters", "loved", "boring", "ending", "great", "writing", "never", "again",
    "twist", "author", "pages", "recommend", "didn't", "enjoy", "series", "sequel", "romance", "dragged",
];

fn corpus(n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| {
            let text: Vec<&str> = (0..40).map(|j| WORDS[(i * 7 + j * j * 3) % WORDS.len()]).collect();
            Document::new(i.to_string(), text.join(" "))
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let docs = corpus(5_000);
    let tokenizer = Arc::new(Tokenizer::default());
    let config = BuildConfig { partition_size: 1_000, verify: false, ..BuildConfig::default() };
    let mut group = c.benchmark_group("build");
    group.sample_size(10);

    let sequential = SequentialBuilder::new(tokenizer.clone(), config.clone());
    group.bench_function(BenchmarkId::new("sequential", docs.len()), |b| {
        b.iter(|| {
            let diagnostics = Diagnostics::new();
            sequential.build(docs.clone(), &BuildContext::new(&diagnostics)).map(|o| o.index.num_docs())
        })
    });

    let parallel = ParallelBuilder::new(tokenizer, config);
    group.bench_function(BenchmarkId::new("parallel", docs.len()), |b| {
        b.iter(|| {
            let diagnostics = Diagnostics::new();
            parallel.build(docs.clone(), &BuildContext::new(&diagnostics)).map(|o| o.index.num_docs())
        })
    });
    group.finish();
}

criterion_group!(benches, bench_build);
criterion_main!(benches);
