//! Fragmentation & sizing analyzer
//!
//! Consumes the walker's series stream and folds it into
//! [`RunningAggregates`]. Per-chunk figures are traced, never retained.

use crate::config::AnalysisConfig;
use crate::storage::{ChunkMeta, Fingerprint, Labels};

/// `tracing` target of the per-chunk diagnostic lines
pub const CHUNK_TRACE_TARGET: &str = "index_analyzer::chunks";

/// Mutable counters of one table scan
///
/// Created at scan start, only ever incremented (or raised, for the
/// maximum) while series are visited, then consumed into a `Report`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunningAggregates {
    /// Series visited by the walker, including zero-chunk series
    pub total_series: u64,
    /// Chunks visited by the walker
    pub total_chunks: u64,
    /// Longest chunk list seen on any one series
    pub max_chunks_per_series: usize,
    /// Label set of the first series that reached `max_chunks_per_series`
    pub max_chunks_series: Option<String>,
    /// Series whose chunk count is above the fragmentation threshold
    pub series_over_threshold: u64,
    /// Series count returned by the accessor
    pub indexed_series: u64,
    /// Chunk reference count returned by the accessor
    pub indexed_chunk_refs: u64,
    pub single_tenant_indexes: u64,
    pub multi_tenant_indexes_skipped: u64,
    pub tenants_scanned: u64,
}

/// Derived figures for a single chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkStats {
    pub min_time: i64,
    pub max_time: i64,
    /// Samples the chunk's duration should hold at one per downsample period
    pub expected_samples: i64,
    /// Samples actually stored
    pub actual_samples: usize,
    pub max_kb: u32,
    pub max_entries: u32,
    pub entries: u32,
    pub kb: u32,
}

impl ChunkStats {
    /// Compute the figures for `chunk`; `downsample_period_ms` must be positive
    pub fn compute(chunk: &ChunkMeta, downsample_period_ms: i64) -> Self {
        let duration = chunk.max_time.saturating_sub(chunk.min_time);
        let expected_samples = duration.div_euclid(downsample_period_ms);

        let (max_kb, max_entries) = chunk
            .samples
            .iter()
            .fold((0u32, 0u32), |(kb, entries), s| {
                (kb.max(s.kb), entries.max(s.entries))
            });

        Self {
            min_time: chunk.min_time,
            max_time: chunk.max_time,
            expected_samples,
            actual_samples: chunk.samples.len(),
            max_kb,
            max_entries,
            entries: chunk.entries,
            kb: chunk.kb,
        }
    }

    /// Fewer samples stored than the chunk's duration implies
    pub fn is_under_sampled(&self) -> bool {
        (self.actual_samples as i64) < self.expected_samples
    }
}

/// Folds the per-series stream of one index into the scan's aggregates
pub struct FragmentationAnalyzer<'a> {
    downsample_period_ms: i64,
    fragmentation_threshold: usize,
    trace_chunks: bool,
    aggregates: &'a mut RunningAggregates,
}

impl<'a> FragmentationAnalyzer<'a> {
    pub fn new(config: &AnalysisConfig, aggregates: &'a mut RunningAggregates) -> Self {
        Self {
            downsample_period_ms: config.downsample_period_ms,
            fragmentation_threshold: config.fragmentation_threshold,
            trace_chunks: config.trace_chunks,
            aggregates,
        }
    }

    /// Account for one series and its chunk list
    pub fn observe_series(&mut self, labels: &Labels, fingerprint: Fingerprint, chunks: &[ChunkMeta]) {
        if self.trace_chunks {
            for chunk in chunks {
                let stats = ChunkStats::compute(chunk, self.downsample_period_ms);
                trace_chunk(labels, fingerprint, &stats);
            }
        }

        let agg = &mut *self.aggregates;
        agg.total_series += 1;
        agg.total_chunks += chunks.len() as u64;

        if chunks.len() > agg.max_chunks_per_series || agg.max_chunks_series.is_none() {
            agg.max_chunks_per_series = agg.max_chunks_per_series.max(chunks.len());
            agg.max_chunks_series = Some(labels.to_string());
        }

        if chunks.len() > self.fragmentation_threshold {
            agg.series_over_threshold += 1;
            tracing::debug!(
                series = %labels,
                fingerprint = %fingerprint,
                chunks = chunks.len(),
                "Series over fragmentation threshold"
            );
        }
    }

    pub fn aggregates(&self) -> &RunningAggregates {
        self.aggregates
    }
}

fn trace_chunk(labels: &Labels, fingerprint: Fingerprint, stats: &ChunkStats) {
    tracing::debug!(
        target: CHUNK_TRACE_TARGET,
        series = %labels,
        fingerprint = %fingerprint,
        from = %format_millis(stats.min_time),
        to = %format_millis(stats.max_time),
        entries = stats.entries,
        kb = stats.kb,
        expected_samples = stats.expected_samples,
        actual_samples = stats.actual_samples,
        max_entries = stats.max_entries,
        max_kb = stats.max_kb,
        "expected {} samples, found {}",
        stats.expected_samples,
        stats.actual_samples
    );
}

/// Render a millisecond timestamp as UTC, falling back to the raw value
pub fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Sample;
    use std::io;
    use std::sync::{Arc, Mutex};

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            trace_chunks: false,
            ..AnalysisConfig::default()
        }
    }

    fn chunks(n: usize) -> Vec<ChunkMeta> {
        (0..n as i64)
            .map(|i| ChunkMeta::new(i * 1000, i * 1000 + 999, 1, 1))
            .collect()
    }

    fn observe_all(counts: &[usize]) -> RunningAggregates {
        let mut aggregates = RunningAggregates::default();
        let mut analyzer = FragmentationAnalyzer::new(&config(), &mut aggregates);
        for (i, &n) in counts.iter().enumerate() {
            let labels = Labels::from_pairs([("series", i.to_string())]);
            analyzer.observe_series(&labels, labels.fingerprint(), &chunks(n));
        }
        aggregates
    }

    #[test]
    fn test_expected_vs_actual_samples() {
        let samples = (0..7)
            .map(|i| Sample::new(i * 10_000, 2 + i as u32, 10 * i as u32))
            .collect();
        let chunk = ChunkMeta::new(0, 100_000, 64, 500).samples(samples);

        let stats = ChunkStats::compute(&chunk, 10_000);
        assert_eq!(stats.expected_samples, 10);
        assert_eq!(stats.actual_samples, 7);
        assert_eq!(stats.max_kb, 8);
        assert_eq!(stats.max_entries, 60);
        assert_eq!(stats.entries, 500);
        assert_eq!(stats.kb, 64);
        assert!(stats.is_under_sampled());
    }

    #[test]
    fn test_expected_samples_floors() {
        let chunk = ChunkMeta::new(0, 19_999, 1, 1);
        assert_eq!(ChunkStats::compute(&chunk, 10_000).expected_samples, 1);

        let chunk = ChunkMeta::new(5, 5, 1, 1);
        assert_eq!(ChunkStats::compute(&chunk, 10_000).expected_samples, 0);
    }

    #[test]
    fn test_chunk_without_samples() {
        let stats = ChunkStats::compute(&ChunkMeta::new(0, 50_000, 3, 4), 10_000);
        assert_eq!(stats.actual_samples, 0);
        assert_eq!(stats.max_kb, 0);
        assert_eq!(stats.max_entries, 0);
    }

    #[test]
    fn test_sentinel_wide_chunk_does_not_overflow() {
        let chunk = ChunkMeta::new(i64::MIN, i64::MAX, 1, 1);
        let stats = ChunkStats::compute(&chunk, 10_000);
        assert_eq!(stats.expected_samples, i64::MAX / 10_000);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let agg = observe_all(&[1, 2, 1000]);
        assert_eq!(agg.total_series, 3);
        assert_eq!(agg.total_chunks, 1003);
        assert_eq!(agg.max_chunks_per_series, 1000);
        assert_eq!(agg.series_over_threshold, 0);
    }

    #[test]
    fn test_series_over_threshold_counts_once_per_series() {
        let agg = observe_all(&[1, 2, 1001]);
        assert_eq!(agg.series_over_threshold, 1);
        assert_eq!(agg.max_chunks_per_series, 1001);

        // Every series above the threshold counts, not only new maxima
        let agg = observe_all(&[5000, 1001, 2]);
        assert_eq!(agg.series_over_threshold, 2);
        assert_eq!(agg.max_chunks_per_series, 5000);
    }

    #[test]
    fn test_max_is_true_maximum_over_stream() {
        let agg = observe_all(&[3, 9, 0, 4, 9, 1]);
        assert_eq!(agg.max_chunks_per_series, 9);
        assert_eq!(agg.max_chunks_series.as_deref(), Some(r#"{series="1"}"#));
    }

    #[test]
    fn test_zero_chunk_series_still_counted() {
        let agg = observe_all(&[0, 0]);
        assert_eq!(agg.total_series, 2);
        assert_eq!(agg.total_chunks, 0);
        assert_eq!(agg.max_chunks_per_series, 0);
        assert_eq!(agg.max_chunks_series.as_deref(), Some(r#"{series="0"}"#));
    }

    #[test]
    fn test_configurable_threshold() {
        let mut aggregates = RunningAggregates::default();
        let config = AnalysisConfig {
            fragmentation_threshold: 2,
            trace_chunks: false,
            ..AnalysisConfig::default()
        };
        let mut analyzer = FragmentationAnalyzer::new(&config, &mut aggregates);
        let labels = Labels::new();
        analyzer.observe_series(&labels, labels.fingerprint(), &chunks(3));
        analyzer.observe_series(&labels, labels.fingerprint(), &chunks(2));

        assert_eq!(analyzer.aggregates().series_over_threshold, 1);
    }

    /// In-memory log sink shared with the subscriber
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn observe_traced(config: &AnalysisConfig, chunk: ChunkMeta) -> String {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut aggregates = RunningAggregates::default();
            let mut analyzer = FragmentationAnalyzer::new(config, &mut aggregates);
            let labels = Labels::from_pairs([("app", "api")]);
            analyzer.observe_series(&labels, labels.fingerprint(), &[chunk]);
        });

        logs.contents()
    }

    fn under_sampled_chunk() -> ChunkMeta {
        let samples = (0..7).map(|i| Sample::new(i * 10_000, 2, 10)).collect();
        ChunkMeta::new(0, 100_000, 64, 500).samples(samples)
    }

    #[test]
    fn test_chunk_trace_reports_expected_and_actual() {
        let logs = observe_traced(&AnalysisConfig::default(), under_sampled_chunk());

        let line = logs
            .lines()
            .find(|line| line.contains(CHUNK_TRACE_TARGET))
            .expect("no chunk trace line");
        assert!(line.contains("expected 10 samples, found 7"), "{}", line);
        assert!(line.contains(r#"series={app="api"}"#), "{}", line);
        assert!(line.contains("from=1970-01-01T00:00:00"), "{}", line);
        assert!(line.contains("to=1970-01-01T00:01:40"), "{}", line);
    }

    #[test]
    fn test_chunk_trace_can_be_disabled() {
        let logs = observe_traced(&config(), under_sampled_chunk());
        assert!(!logs.contains(CHUNK_TRACE_TARGET), "{}", logs);
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "1970-01-01T00:00:00");
        assert_eq!(format_millis(100_000), "1970-01-01T00:01:40");
        assert_eq!(format_millis(i64::MAX), i64::MAX.to_string());
    }
}
