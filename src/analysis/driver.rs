//! Table/tenant driver
//!
//! Runs one scan of a table: tenants in order, index instances in the
//! order the shipper yields them, series in stored order. Merged
//! multi-tenant indexes are skipped; they have no private series space.
//! Any error aborts the scan and no report is produced.

use crate::analysis::analyzer::{FragmentationAnalyzer, RunningAggregates};
use crate::analysis::error::{AnalysisError, AnalysisResult};
use crate::analysis::report::Report;
use crate::config::AnalysisConfig;
use crate::index::{ChunkWalker, LabelMatcher, SeriesAccessor};
use crate::storage::{
    ChunkRef, IndexInstance, IndexShipper, ScanContext, SeriesDescriptor, SeriesIndex,
    StorageResult, TimeRange,
};

/// Scans the tenants of one table and produces a [`Report`]
pub struct TableDriver<'a> {
    shipper: &'a dyn IndexShipper,
    config: AnalysisConfig,
    matcher: LabelMatcher,
}

/// Buffers reused across every index of a scan
#[derive(Default)]
struct ScanBuffers {
    series: Vec<SeriesDescriptor>,
    chunk_refs: Vec<ChunkRef>,
}

impl<'a> TableDriver<'a> {
    pub fn new(shipper: &'a dyn IndexShipper, config: AnalysisConfig) -> Self {
        Self {
            shipper,
            config,
            matcher: LabelMatcher::match_all(),
        }
    }

    /// Builder method: restrict the scan to series accepted by `matcher`
    pub fn with_matcher(mut self, matcher: LabelMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Tenants owning indexes in `table`, for scans not given a tenant list
    pub fn discover_tenants(&self, table: &str) -> AnalysisResult<Vec<String>> {
        self.shipper
            .tenants(table)
            .map_err(|source| AnalysisError::Tenants {
                table: table.to_string(),
                source,
            })
    }

    /// Scan `tenants` of `table` sequentially
    pub fn run(&self, ctx: &ScanContext, table: &str, tenants: &[String]) -> AnalysisResult<Report> {
        if self.config.downsample_period_ms <= 0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "downsample period must be positive, got {}ms",
                self.config.downsample_period_ms
            )));
        }
        if tenants.iter().any(|tenant| tenant.is_empty()) {
            return Err(AnalysisError::EmptyTenant {
                table: table.to_string(),
            });
        }

        let mut aggregates = RunningAggregates::default();
        let mut buffers = ScanBuffers::default();

        for tenant in tenants {
            tracing::info!(table, tenant = %tenant, "Analyzing tenant");
            aggregates.tenants_scanned += 1;

            self.shipper
                .for_each(ctx, table, tenant, &mut |instance| match instance {
                    IndexInstance::MultiTenant(_) => {
                        tracing::debug!(table, tenant = %tenant, "Skipping multi-tenant index");
                        aggregates.multi_tenant_indexes_skipped += 1;
                        Ok(())
                    }
                    IndexInstance::SingleTenant(index) => {
                        self.scan_index(ctx, tenant, index, &mut aggregates, &mut buffers)
                    }
                })
                .map_err(|source| AnalysisError::Scan {
                    table: table.to_string(),
                    tenant: tenant.clone(),
                    source,
                })?;
        }

        let report = Report::finalize(table, self.config.fragmentation_threshold, aggregates);
        tracing::info!(
            table,
            series = report.total_series,
            chunks = report.total_chunks,
            over_threshold = report.series_over_threshold,
            "Table analysis complete"
        );
        Ok(report)
    }

    fn scan_index(
        &self,
        ctx: &ScanContext,
        tenant: &str,
        index: &dyn SeriesIndex,
        aggregates: &mut RunningAggregates,
        buffers: &mut ScanBuffers,
    ) -> StorageResult<()> {
        let range = TimeRange::all();
        aggregates.single_tenant_indexes += 1;

        let accessor = SeriesAccessor::new(index, ctx);
        let indexed_series = accessor
            .fetch_series(tenant, range, &self.matcher, &mut buffers.series)?
            .len() as u64;
        let indexed_chunk_refs = accessor
            .fetch_chunk_refs(tenant, range, &self.matcher, &mut buffers.chunk_refs)?
            .len() as u64;
        aggregates.indexed_series += indexed_series;
        aggregates.indexed_chunk_refs += indexed_chunk_refs;

        let (series_before, chunks_before) = (aggregates.total_series, aggregates.total_chunks);
        let series_limit = self.config.series_limit;
        let mut visited = 0usize;

        let mut analyzer = FragmentationAnalyzer::new(&self.config, aggregates);
        ChunkWalker::new(index, ctx).for_each_series(tenant, range, &self.matcher, |labels, fp, chunks| {
            analyzer.observe_series(labels, fp, chunks);
            visited += 1;
            series_limit.is_some_and(|limit| visited >= limit)
        })?;

        let walked_series = aggregates.total_series - series_before;
        let walked_chunks = aggregates.total_chunks - chunks_before;
        tracing::debug!(
            tenant,
            indexed_series,
            indexed_chunk_refs,
            walked_series,
            walked_chunks,
            "Index scanned"
        );

        if series_limit.is_none()
            && (walked_series != indexed_series || walked_chunks != indexed_chunk_refs)
        {
            tracing::warn!(
                tenant,
                indexed_series,
                indexed_chunk_refs,
                walked_series,
                walked_chunks,
                "Index counts differ from walked counts"
            );
        }

        Ok(())
    }
}
