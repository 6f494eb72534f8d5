use criterion::{criterion_group, criterion_main, Criterion};
use reviewdex_core::tokenizer::tokenize;

const REVIEW: &str = "I really wanted to love this one. The first half is gripping, the \
characters feel real and the writing is sharp. Then it just doesn't go anywhere: the plot \
drags, the twist isn't a twist, and the ending was NOT worth 400 pages. 2/5 ⭐⭐ would not \
recommend to friends who loved the author's earlier books!!";

fn bench_tokenize(c: &mut Criterion) {
    c.bench_function("tokenize_review", |b| b.iter(|| tokenize(REVIEW)));
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
