//! In-memory index collaborator
//!
//! Holds series and chunk metadata in plain vectors. Used to drive the
//! analyzer without index files on disk (benchmarks, tests, dry runs).

use crate::index::{matches_all, LabelMatcher};
use crate::storage::error::StorageResult;
use crate::storage::shipper::{
    IndexCallback, IndexInstance, IndexShipper, ScanContext, SeriesIndex, SeriesVisitor,
};
use crate::storage::types::{
    ChunkMeta, ChunkRef, Labels, SeriesDescriptor, ShardHint, TimeRange,
};
use crate::storage::StorageError;
use std::collections::BTreeMap;

/// A single index held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    series: Vec<(Labels, Vec<ChunkMeta>)>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add a series
    pub fn with_series(mut self, labels: Labels, chunks: Vec<ChunkMeta>) -> Self {
        self.series.push((labels, chunks));
        self
    }

    pub fn add_series(&mut self, labels: Labels, chunks: Vec<ChunkMeta>) {
        self.series.push((labels, chunks));
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    fn matching<'a>(
        &'a self,
        ctx: &'a ScanContext,
        shard: Option<ShardHint>,
        matchers: &'a [LabelMatcher],
    ) -> impl Iterator<Item = StorageResult<&'a (Labels, Vec<ChunkMeta>)>> + 'a {
        self.series
            .iter()
            .filter(move |(labels, _)| {
                shard.map_or(true, |s| s.contains(labels.fingerprint()))
                    && matches_all(matchers, labels)
            })
            .map(move |entry| ctx.check().map(|_| entry))
    }
}

impl SeriesIndex for MemoryIndex {
    fn series(
        &self,
        ctx: &ScanContext,
        _tenant: &str,
        range: TimeRange,
        buf: &mut Vec<SeriesDescriptor>,
        shard: Option<ShardHint>,
        matchers: &[LabelMatcher],
    ) -> StorageResult<()> {
        buf.clear();
        for entry in self.matching(ctx, shard, matchers) {
            let (labels, chunks) = entry?;
            if chunks.iter().any(|c| c.overlaps(&range)) {
                buf.push(SeriesDescriptor {
                    labels: labels.clone(),
                    fingerprint: labels.fingerprint(),
                });
            }
        }
        Ok(())
    }

    fn chunk_refs(
        &self,
        ctx: &ScanContext,
        _tenant: &str,
        range: TimeRange,
        buf: &mut Vec<ChunkRef>,
        shard: Option<ShardHint>,
        matchers: &[LabelMatcher],
    ) -> StorageResult<()> {
        buf.clear();
        for entry in self.matching(ctx, shard, matchers) {
            let (labels, chunks) = entry?;
            let fingerprint = labels.fingerprint();
            buf.extend(
                chunks
                    .iter()
                    .filter(|c| c.overlaps(&range))
                    .map(|c| ChunkRef::new(fingerprint, c)),
            );
        }
        Ok(())
    }

    fn for_series(
        &self,
        ctx: &ScanContext,
        shard: Option<ShardHint>,
        range: TimeRange,
        visit: &mut SeriesVisitor<'_>,
        matchers: &[LabelMatcher],
    ) -> StorageResult<()> {
        let mut in_range = Vec::new();
        for entry in self.matching(ctx, shard, matchers) {
            let (labels, chunks) = entry?;
            in_range.clear();
            in_range.extend(chunks.iter().filter(|c| c.overlaps(&range)).cloned());
            if visit(labels, labels.fingerprint(), &in_range) {
                break;
            }
        }
        Ok(())
    }
}

/// One index registered with a [`MemoryIndexShipper`]
#[derive(Debug, Clone)]
pub enum MemoryInstance {
    SingleTenant(MemoryIndex),
    MultiTenant(MemoryIndex),
}

/// Index shipper over in-memory indexes, keyed by table then tenant
#[derive(Debug, Clone, Default)]
pub struct MemoryIndexShipper {
    tables: BTreeMap<String, BTreeMap<String, Vec<MemoryInstance>>>,
}

impl MemoryIndexShipper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an index instance for a (table, tenant) pair
    pub fn add(&mut self, table: impl Into<String>, tenant: impl Into<String>, instance: MemoryInstance) {
        self.tables
            .entry(table.into())
            .or_default()
            .entry(tenant.into())
            .or_default()
            .push(instance);
    }

    /// Builder method: register an index instance
    pub fn with(mut self, table: &str, tenant: &str, instance: MemoryInstance) -> Self {
        self.add(table, tenant, instance);
        self
    }
}

impl IndexShipper for MemoryIndexShipper {
    fn for_each(
        &self,
        ctx: &ScanContext,
        table: &str,
        tenant: &str,
        callback: &mut IndexCallback<'_>,
    ) -> StorageResult<()> {
        let tenants = self
            .tables
            .get(table)
            .ok_or_else(|| StorageError::IndexUnavailable(format!("table {} not found", table)))?;

        for instance in tenants.get(tenant).into_iter().flatten() {
            ctx.check()?;
            match instance {
                MemoryInstance::SingleTenant(idx) => callback(IndexInstance::SingleTenant(idx))?,
                MemoryInstance::MultiTenant(idx) => callback(IndexInstance::MultiTenant(idx))?,
            }
        }
        Ok(())
    }

    fn tenants(&self, table: &str) -> StorageResult<Vec<String>> {
        let tenants = self
            .tables
            .get(table)
            .ok_or_else(|| StorageError::IndexUnavailable(format!("table {} not found", table)))?;

        Ok(tenants
            .iter()
            .filter(|(_, instances)| {
                instances
                    .iter()
                    .any(|i| matches!(i, MemoryInstance::SingleTenant(_)))
            })
            .map(|(tenant, _)| tenant.clone())
            .collect())
    }
}
