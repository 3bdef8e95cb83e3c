//! Report model - immutable digest of one table scan

use crate::analysis::analyzer::RunningAggregates;
use serde::Serialize;
use std::fmt;

/// Final statistics of a table scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub table: String,
    pub tenants_scanned: u64,
    pub total_series: u64,
    pub total_chunks: u64,
    /// `None` when no series were scanned
    pub avg_chunks_per_series: Option<f64>,
    pub max_chunks_per_series: usize,
    pub max_chunks_series: Option<String>,
    pub fragmentation_threshold: usize,
    pub series_over_threshold: u64,
    pub indexed_series: u64,
    pub indexed_chunk_refs: u64,
    pub single_tenant_indexes: u64,
    pub multi_tenant_indexes_skipped: u64,
}

impl Report {
    /// Freeze the aggregates of a finished scan
    pub fn finalize(
        table: impl Into<String>,
        fragmentation_threshold: usize,
        aggregates: RunningAggregates,
    ) -> Self {
        let avg_chunks_per_series = (aggregates.total_series > 0)
            .then(|| aggregates.total_chunks as f64 / aggregates.total_series as f64);

        Self {
            table: table.into(),
            tenants_scanned: aggregates.tenants_scanned,
            total_series: aggregates.total_series,
            total_chunks: aggregates.total_chunks,
            avg_chunks_per_series,
            max_chunks_per_series: aggregates.max_chunks_per_series,
            max_chunks_series: aggregates.max_chunks_series,
            fragmentation_threshold,
            series_over_threshold: aggregates.series_over_threshold,
            indexed_series: aggregates.indexed_series,
            indexed_chunk_refs: aggregates.indexed_chunk_refs,
            single_tenant_indexes: aggregates.single_tenant_indexes,
            multi_tenant_indexes_skipped: aggregates.multi_tenant_indexes_skipped,
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let avg = self
            .avg_chunks_per_series
            .map(|avg| format!("{:.6}", avg))
            .unwrap_or_else(|| "n/a".to_string());

        writeln!(
            f,
            "analyzed {} series and {} chunks for an average of {} chunks per series. \
             max chunks/series was {}. number of series with over {} chunks: {}",
            self.total_series,
            self.total_chunks,
            avg,
            self.max_chunks_per_series,
            self.fragmentation_threshold,
            self.series_over_threshold
        )?;

        if let Some(series) = &self.max_chunks_series {
            writeln!(f, "series with most chunks: {}", series)?;
        }

        write!(
            f,
            "table {}: {} tenants, {} single-tenant indexes ({} multi-tenant skipped), \
             index reported {} series and {} chunk refs",
            self.table,
            self.tenants_scanned,
            self.single_tenant_indexes,
            self.multi_tenant_indexes_skipped,
            self.indexed_series,
            self.indexed_chunk_refs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_scan_has_undefined_average() {
        let report = Report::finalize("index_19700", 1000, RunningAggregates::default());

        assert_eq!(report.total_series, 0);
        assert_eq!(report.total_chunks, 0);
        assert_eq!(report.avg_chunks_per_series, None);
        assert!(report.to_string().contains("average of n/a chunks"));
    }

    #[test]
    fn test_average() {
        let aggregates = RunningAggregates {
            total_series: 4,
            total_chunks: 10,
            ..RunningAggregates::default()
        };
        let report = Report::finalize("t", 1000, aggregates);
        assert_eq!(report.avg_chunks_per_series, Some(2.5));
        assert!(report
            .to_string()
            .starts_with("analyzed 4 series and 10 chunks for an average of 2.500000 chunks"));
    }

    #[test]
    fn test_json_output() {
        let report = Report::finalize("t", 1000, RunningAggregates::default());
        let json: serde_json::Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();

        assert_eq!(json["table"], "t");
        assert_eq!(json["fragmentation_threshold"], 1000);
        assert!(json["avg_chunks_per_series"].is_null());
    }
}
