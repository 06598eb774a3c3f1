use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use stagebuf::compact::sink;
use stagebuf::{
    Block, CancellationToken, CompactingBuffer, CompositeKey, DiskStore, Options, Row, Schema,
    StoreConfig,
};

const TTL: Duration = Duration::from_secs(3600);
const PARTITIONS: usize = 16;

fn at(i: usize) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(1_700_000_000_000 + i as u64)
}

fn payload(i: usize) -> Vec<u8> {
    Block::new(vec![
        Row::new()
            .with("event", "click")
            .with("user", i as i64)
            .with("score", i as f64 * 0.5),
    ])
    .encode()
    .unwrap()
}

fn new_buffer(dir: &tempfile::TempDir) -> CompactingBuffer {
    let store = Arc::new(DiskStore::open(dir.path(), StoreConfig::default()).unwrap());
    let sink = sink(|blocks: Vec<Block>, _schema: &Schema| {
        black_box(blocks.len());
        Ok(())
    });
    let options = Options {
        compact_interval: None,
    };
    CompactingBuffer::new(store, sink, options).unwrap()
}

fn append_benchmark(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let buffer = new_buffer(&dir);
    let value = payload(7);
    let mut i = 0usize;

    c.bench_function("buffer append", |b| {
        b.iter(|| {
            let key = CompositeKey::new(format!("partition-{}", i % PARTITIONS), at(i));
            buffer.append(black_box(&key), black_box(&value), TTL).unwrap();
            i += 1;
        })
    });
}

fn compact_benchmark(c: &mut Criterion) {
    c.bench_function("compact 4096 entries", |b| {
        b.iter_batched(
            || {
                let dir = tempfile::tempdir().unwrap();
                let buffer = new_buffer(&dir);
                for i in 0..4096 {
                    let key = CompositeKey::new(format!("partition-{}", i % PARTITIONS), at(i));
                    buffer.append(&key, &payload(i), TTL).unwrap();
                }
                (dir, buffer)
            },
            |(_dir, buffer)| {
                let stats = buffer.compact(&CancellationToken::new()).unwrap();
                black_box(stats);
            },
            BatchSize::PerIteration,
        )
    });
}

fn key_encode_benchmark(c: &mut Criterion) {
    let keys: Vec<CompositeKey> = (0..1024)
        .map(|i| CompositeKey::new(format!("tenant\0{}", i % PARTITIONS), at(i)))
        .collect();

    c.bench_function("composite key encode+decode 1024", |b| {
        b.iter(|| {
            for key in &keys {
                let encoded = key.encode();
                black_box(CompositeKey::decode(&encoded).unwrap());
            }
        })
    });
}

criterion_group!(
    buffer_benchmarks,
    append_benchmark,
    compact_benchmark,
    key_encode_benchmark
);
criterion_main!(buffer_benchmarks);
