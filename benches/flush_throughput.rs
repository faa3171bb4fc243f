//! Benchmarks for the memstore write path and region flush.
//!
//! Run with: cargo bench

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

use rangekv::contracts::RegionId;
use rangekv::memstore::{CellKey, MemStore};
use rangekv::region::{KeyRange, Region};
use rangekv::storage::{FsSegmentWriter, NoopWal};

// =============================================================================
// Memstore append
// =============================================================================

fn bench_memstore_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("memstore_append");

    for size in [16, 256, 1024].iter() {
        let store = MemStore::new();
        let value = bytes::Bytes::from(vec![0u8; *size]);
        let mut seq = 0u64;

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                seq += 1;
                store
                    .append(
                        seq,
                        CellKey::new(format!("row-{}", seq).into_bytes(), b"c".to_vec(), seq),
                        black_box(value.clone()),
                    )
                    .unwrap()
            });
        });
    }

    group.finish();
}

// =============================================================================
// Region flush
// =============================================================================

fn bench_region_flush(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("region_flush");
    group.sample_size(20);

    for cells in [100usize, 1_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(cells), cells, |b, &cells| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                let region = Region::new(
                    RegionId::from("bench"),
                    "bench-table",
                    KeyRange::unbounded(),
                    Arc::new(FsSegmentWriter::new(dir.path())),
                    Arc::new(NoopWal),
                );
                for i in 0..cells as u64 {
                    region
                        .put(
                            format!("row-{:06}", i).into_bytes(),
                            b"c".to_vec(),
                            i,
                            b"value".to_vec(),
                        )
                        .unwrap();
                }
                rt.block_on(region.flush()).unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_memstore_append, bench_region_flush);
criterion_main!(benches);
