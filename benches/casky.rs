use criterion::{criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

use casky::Casky;

fn engine_latency(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let db = Casky::open(dir.path().join("bench.db")).unwrap();

    let key = vec![1u8; 64];
    let value = vec![1u8; 4096];
    db.put(&key, &value, 0).unwrap();

    c.bench_function("get_4k", |b| {
        b.iter(|| db.get(&key).unwrap());
    });

    c.bench_function("put_4k", |b| {
        b.iter(|| db.put(&key, &value, 0).unwrap());
    });
}

criterion_group!(benches, engine_latency);
criterion_main!(benches);
