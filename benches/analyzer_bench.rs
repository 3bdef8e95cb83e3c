//! Benchmarks for the chunk walker and fragmentation analyzer
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use index_analyzer::analysis::{FragmentationAnalyzer, RunningAggregates};
use index_analyzer::config::AnalysisConfig;
use index_analyzer::index::{ChunkWalker, LabelMatcher, SeriesAccessor};
use index_analyzer::storage::*;
use tempfile::tempdir;

fn create_test_series(series: usize, chunks_per_series: usize) -> Vec<(Labels, Vec<ChunkMeta>)> {
    (0..series)
        .map(|s| {
            let labels = Labels::from_pairs([
                ("app", format!("app-{}", s % 10)),
                ("pod", format!("pod-{}", s)),
            ]);
            let chunks = (0..chunks_per_series as i64)
                .map(|c| {
                    let samples = (0..6).map(|i| Sample::new(c * 60_000 + i * 10_000, 4, 12)).collect();
                    ChunkMeta::new(c * 60_000, c * 60_000 + 59_999, 24, 72).samples(samples)
                })
                .collect();
            (labels, chunks)
        })
        .collect()
}

fn bench_config() -> AnalysisConfig {
    AnalysisConfig {
        trace_chunks: false,
        ..AnalysisConfig::default()
    }
}

fn walk_and_analyze(index: &dyn SeriesIndex, config: &AnalysisConfig) -> RunningAggregates {
    let ctx = ScanContext::new();
    let mut aggregates = RunningAggregates::default();
    let mut analyzer = FragmentationAnalyzer::new(config, &mut aggregates);

    ChunkWalker::new(index, &ctx)
        .for_each_series("bench", TimeRange::all(), &LabelMatcher::match_all(), |labels, fp, chunks| {
            analyzer.observe_series(labels, fp, chunks);
            false
        })
        .unwrap();

    aggregates
}

fn bench_memory_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_walk");
    let config = bench_config();

    for (series, chunks) in [(1000, 10), (100, 1000)] {
        let index = create_test_series(series, chunks)
            .into_iter()
            .fold(MemoryIndex::new(), |idx, (labels, chunks)| idx.with_series(labels, chunks));

        group.throughput(Throughput::Elements((series * chunks) as u64));

        group.bench_function(format!("walk_{}x{}", series, chunks), |b| {
            b.iter(|| walk_and_analyze(black_box(&index), &config))
        });
    }

    group.finish();
}

fn bench_index_file(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_file");
    let config = bench_config();

    let dir = tempdir().unwrap();
    let path = dir.path().join("bench.idx");
    let mut writer = IndexFileWriter::create(&path, IndexKind::SingleTenant).unwrap();
    for (labels, chunks) in create_test_series(1000, 20) {
        writer.append_series(&labels, &chunks).unwrap();
    }
    let file = writer.finish().unwrap();

    group.throughput(Throughput::Elements(1000 * 20));

    group.bench_function("walk_1000x20", |b| {
        b.iter(|| walk_and_analyze(black_box(&file), &config))
    });

    group.bench_function("fetch_chunk_refs_reused_buffer", |b| {
        let ctx = ScanContext::new();
        let accessor = SeriesAccessor::new(&file, &ctx);
        let matcher = LabelMatcher::match_all();
        let mut buf = Vec::new();

        b.iter(|| {
            accessor
                .fetch_chunk_refs("bench", TimeRange::all(), &matcher, &mut buf)
                .unwrap()
                .len()
        })
    });

    group.bench_function("walk_with_regex_matcher", |b| {
        let ctx = ScanContext::new();
        let matcher = LabelMatcher::parse(r#"app=~"app-[0-4]""#).unwrap();

        b.iter(|| {
            let mut series = 0usize;
            ChunkWalker::new(&file, &ctx)
                .for_each_series("bench", TimeRange::all(), &matcher, |_, _, _| {
                    series += 1;
                    false
                })
                .unwrap();
            black_box(series)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_memory_walk, bench_index_file);
criterion_main!(benches);
