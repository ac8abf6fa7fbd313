use criterion::{criterion_group, criterion_main, Criterion};
use qps_core::tokenizer::tokenize;
use qps_core::{IndexConfig, QpsService};

const NOTE: &str = "Meeting notes: the quick brown fox reviewed the quarterly roadmap.\n\
Action items include proximity search tuning, snapshot checksums and a faster rebuild.";

fn bench_tokenize(c: &mut Criterion) {
    let text = NOTE.repeat(50);
    c.bench_function("tokenize_note", |b| b.iter(|| tokenize(&text)));
}

fn bench_search(c: &mut Criterion) {
    let mut service = QpsService::new(IndexConfig::default());
    for i in 0..500 {
        let content = format!("{} note number {}", NOTE, i);
        service.index_note(&format!("note-{i:04}"), &content).expect("index note");
    }
    c.bench_function("search_two_terms", |b| b.iter(|| service.search("proximity roadmap", 10)));
}

criterion_group!(benches, bench_tokenize, bench_search);
criterion_main!(benches);
