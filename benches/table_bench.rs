//! Table benchmarks.
//!
//! Benchmarks for:
//! - Inserting a batch of rows in one transaction
//! - Point lookups against a populated table

use blinkdb::catalog::{ColumnProperty, TableSchema};
use blinkdb::tuple::ColumnType;
use blinkdb::{tuple, Database, DbConfig, IsolationLevel};
use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use tempfile::TempDir;

fn open_db() -> (Database, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = DbConfig::new()
        .with_cache_capacity(512)
        .with_sync_on_commit(false);
    let db = Database::create(dir.path(), config).unwrap();

    let txn = db.begin(IsolationLevel::Read).unwrap();
    db.create_table(
        txn,
        TableSchema::new(
            "bench",
            vec![
                ColumnProperty::new("id", ColumnType::Int).key(),
                ColumnProperty::new("payload", ColumnType::varchar(64)),
            ],
        ),
    )
    .unwrap();
    db.commit(txn).unwrap();
    (db, dir)
}

/// Multiplicative hash, so keys arrive out of order without an RNG.
fn scrambled(i: usize, n: usize) -> i32 {
    ((i * 7919) % n) as i32
}

/// Benchmark inserting `size` rows in one transaction.
fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("table/insert");
    group.sample_size(10);

    for size in [1_000usize, 5_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_batched(
                open_db,
                |(db, _dir)| {
                    let txn = db.begin(IsolationLevel::Read).unwrap();
                    for i in 0..size {
                        db.insert(txn, "bench", tuple![scrambled(i, size), "payload"])
                            .unwrap();
                    }
                    db.commit(txn).unwrap();
                    black_box(db.cache_stats().pages_written)
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

/// Benchmark point lookups in a table of 10k rows.
fn bench_find(c: &mut Criterion) {
    const ROWS: usize = 10_000;
    let (db, _dir) = open_db();
    let txn = db.begin(IsolationLevel::Read).unwrap();
    for i in 0..ROWS {
        db.insert(txn, "bench", tuple![i as i32, "payload"]).unwrap();
    }
    db.commit(txn).unwrap();

    let mut group = c.benchmark_group("table/find");
    group.throughput(Throughput::Elements(1));

    let reader = db.begin(IsolationLevel::Read).unwrap();
    let mut i = 0;
    group.bench_function("hit", |b| {
        b.iter(|| {
            i = (i + 7919) % ROWS;
            black_box(db.find(reader, "bench", &tuple![i as i32]).unwrap())
        });
    });
    group.bench_function("miss", |b| {
        b.iter(|| black_box(db.find(reader, "bench", &tuple![-1]).unwrap()));
    });
    db.commit(reader).unwrap();

    group.finish();
}

criterion_group!(benches, bench_insert, bench_find);
criterion_main!(benches);
