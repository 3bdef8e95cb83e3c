//! Index traversal primitive
//!
//! An `IndexShipper` enumerates the index instances holding a tenant's
//! series for one table. Each instance is handed to the caller tagged as
//! single-tenant or multi-tenant (merged); the caller decides what to do
//! with each kind.
//!
//! # Directory layout
//!
//! ```text
//! <data_dir>/<table>/<name>.idx            merged, multi-tenant files
//! <data_dir>/<table>/<tenant>/<name>.idx   single-tenant files
//! ```

use crate::index::LabelMatcher;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::index_file::{IndexFile, IndexKind};
use crate::storage::types::{
    ChunkMeta, ChunkRef, Fingerprint, Labels, SeriesDescriptor, ShardHint, TimeRange,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// File extension of index files
pub const INDEX_FILE_EXTENSION: &str = "idx";

/// Per-series callback; returning true stops the walk
pub type SeriesVisitor<'v> = dyn FnMut(&Labels, Fingerprint, &[ChunkMeta]) -> bool + 'v;

/// Cancellation context shared between a scan and whoever may abort it
#[derive(Debug, Clone, Default)]
pub struct ScanContext {
    cancelled: Arc<AtomicBool>,
}

impl ScanContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; every clone observes it
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` once cancellation was requested
    pub fn check(&self) -> StorageResult<()> {
        if self.is_cancelled() {
            Err(StorageError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Query primitive offered by one index instance
///
/// Buffer arguments are cleared (length reset, capacity kept) and refilled.
pub trait SeriesIndex {
    /// Series matching all `matchers` with at least one chunk in `range`
    fn series(
        &self,
        ctx: &ScanContext,
        tenant: &str,
        range: TimeRange,
        buf: &mut Vec<SeriesDescriptor>,
        shard: Option<ShardHint>,
        matchers: &[LabelMatcher],
    ) -> StorageResult<()>;

    /// Chunk references in `range` of the series matching all `matchers`
    fn chunk_refs(
        &self,
        ctx: &ScanContext,
        tenant: &str,
        range: TimeRange,
        buf: &mut Vec<ChunkRef>,
        shard: Option<ShardHint>,
        matchers: &[LabelMatcher],
    ) -> StorageResult<()>;

    /// Stream every matching series with its chunks in `range`, one at a time
    fn for_series(
        &self,
        ctx: &ScanContext,
        shard: Option<ShardHint>,
        range: TimeRange,
        visit: &mut SeriesVisitor<'_>,
        matchers: &[LabelMatcher],
    ) -> StorageResult<()>;
}

/// An index instance yielded by the traversal primitive
#[derive(Clone, Copy)]
pub enum IndexInstance<'a> {
    /// Index private to the tenant being traversed
    SingleTenant(&'a dyn SeriesIndex),
    /// Merged index shared by several tenants
    MultiTenant(&'a dyn SeriesIndex),
}

impl IndexInstance<'_> {
    pub fn is_multi_tenant(&self) -> bool {
        matches!(self, IndexInstance::MultiTenant(_))
    }
}

/// Callback invoked once per index instance
pub type IndexCallback<'c> = dyn FnMut(IndexInstance<'_>) -> StorageResult<()> + 'c;

/// Traversal primitive over the indexes of a table
pub trait IndexShipper {
    /// Invoke `callback` for every index instance holding `tenant`'s data in
    /// `table`; the first callback error stops the traversal and is returned
    fn for_each(
        &self,
        ctx: &ScanContext,
        table: &str,
        tenant: &str,
        callback: &mut IndexCallback<'_>,
    ) -> StorageResult<()>;

    /// Tenants owning single-tenant indexes in `table`, sorted
    fn tenants(&self, table: &str) -> StorageResult<Vec<String>>;
}

/// Index shipper reading index files from a local directory tree
#[derive(Debug, Clone)]
pub struct LocalIndexShipper {
    data_dir: PathBuf,
}

impl LocalIndexShipper {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn table_dir(&self, table: &str) -> StorageResult<PathBuf> {
        let dir = self.data_dir.join(table);
        if !dir.is_dir() {
            return Err(StorageError::IndexUnavailable(format!(
                "table {} not found under {}",
                table,
                self.data_dir.display()
            )));
        }
        Ok(dir)
    }

    /// Index files directly inside `dir`, sorted by name
    fn index_files(dir: &Path) -> StorageResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(INDEX_FILE_EXTENSION)
            {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn open_logged(path: &Path) -> StorageResult<IndexFile> {
        let file = IndexFile::open(path)?;
        tracing::debug!(
            path = %path.display(),
            kind = ?file.kind(),
            series = file.header.series_count,
            chunks = file.header.chunk_count,
            "Opened index file"
        );
        Ok(file)
    }
}

impl IndexShipper for LocalIndexShipper {
    fn for_each(
        &self,
        ctx: &ScanContext,
        table: &str,
        tenant: &str,
        callback: &mut IndexCallback<'_>,
    ) -> StorageResult<()> {
        if tenant.is_empty() {
            return Err(StorageError::IndexUnavailable(format!(
                "empty tenant id for table {}",
                table
            )));
        }

        let table_dir = self.table_dir(table)?;
        let tenant_dir = table_dir.join(tenant);

        for path in Self::index_files(&table_dir)? {
            ctx.check()?;
            let file = Self::open_logged(&path)?;
            match file.kind() {
                IndexKind::MultiTenant => callback(IndexInstance::MultiTenant(&file))?,
                // Single-tenant files belong in a tenant directory
                IndexKind::SingleTenant => {
                    tracing::warn!(path = %path.display(), "Ignoring single-tenant index at table level");
                }
            }
        }

        if !tenant_dir.is_dir() {
            tracing::debug!(table, tenant, "Tenant has no index directory");
            return Ok(());
        }

        for path in Self::index_files(&tenant_dir)? {
            ctx.check()?;
            let file = Self::open_logged(&path)?;
            let instance = match file.kind() {
                IndexKind::SingleTenant => IndexInstance::SingleTenant(&file),
                IndexKind::MultiTenant => IndexInstance::MultiTenant(&file),
            };
            callback(instance)?;
        }

        Ok(())
    }

    fn tenants(&self, table: &str) -> StorageResult<Vec<String>> {
        let table_dir = self.table_dir(table)?;

        let mut tenants = Vec::new();
        for entry in std::fs::read_dir(&table_dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                tenants.push(name.to_string());
            }
        }
        tenants.sort();
        Ok(tenants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::index_file::IndexFileWriter;
    use tempfile::tempdir;

    fn write_index(path: PathBuf, kind: IndexKind, series: usize) {
        let mut writer = IndexFileWriter::create(path, kind).unwrap();
        for i in 0..series {
            writer
                .append_series(
                    &Labels::from_pairs([("i", i.to_string())]),
                    &[ChunkMeta::new(0, 1000, 1, 1)],
                )
                .unwrap();
        }
        writer.finish().unwrap();
    }

    /// (is_multi_tenant, series count) per yielded instance
    fn traverse(shipper: &LocalIndexShipper, table: &str, tenant: &str) -> StorageResult<Vec<(bool, usize)>> {
        let ctx = ScanContext::new();
        let mut seen = Vec::new();
        shipper.for_each(&ctx, table, tenant, &mut |instance| {
            let (IndexInstance::SingleTenant(idx) | IndexInstance::MultiTenant(idx)) = instance;
            let mut buf = Vec::new();
            idx.series(&ctx, tenant, TimeRange::all(), &mut buf, None, &[])?;
            seen.push((instance.is_multi_tenant(), buf.len()));
            Ok(())
        })?;
        Ok(seen)
    }

    #[test]
    fn test_scan_context_cancel_is_shared() {
        let ctx = ScanContext::new();
        let clone = ctx.clone();
        assert!(ctx.check().is_ok());

        clone.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(StorageError::Cancelled)));
    }

    #[test]
    fn test_for_each_yields_table_files_then_tenant_files() {
        let dir = tempdir().unwrap();
        let table = dir.path().join("index_19700");
        write_index(table.join("compacted.idx"), IndexKind::MultiTenant, 0);
        write_index(table.join("fake").join("b.idx"), IndexKind::SingleTenant, 2);
        write_index(table.join("fake").join("a.idx"), IndexKind::SingleTenant, 1);
        std::fs::write(table.join("fake").join("notes.txt"), b"ignored").unwrap();

        let shipper = LocalIndexShipper::new(dir.path());
        let seen = traverse(&shipper, "index_19700", "fake").unwrap();
        assert_eq!(seen, vec![(true, 0), (false, 1), (false, 2)]);
    }

    #[test]
    fn test_missing_tenant_yields_nothing_from_tenant_dir() {
        let dir = tempdir().unwrap();
        write_index(
            dir.path().join("index_1").join("other").join("a.idx"),
            IndexKind::SingleTenant,
            1,
        );

        let shipper = LocalIndexShipper::new(dir.path());
        assert!(traverse(&shipper, "index_1", "fake").unwrap().is_empty());
    }

    #[test]
    fn test_missing_table_is_unavailable() {
        let dir = tempdir().unwrap();
        let shipper = LocalIndexShipper::new(dir.path());
        let err = traverse(&shipper, "index_1", "fake").unwrap_err();
        assert!(matches!(err, StorageError::IndexUnavailable(_)));
    }

    #[test]
    fn test_callback_error_stops_traversal() {
        let dir = tempdir().unwrap();
        let table = dir.path().join("index_1");
        write_index(table.join("fake").join("a.idx"), IndexKind::SingleTenant, 1);
        write_index(table.join("fake").join("b.idx"), IndexKind::SingleTenant, 1);

        let shipper = LocalIndexShipper::new(dir.path());
        let mut calls = 0;
        let err = shipper
            .for_each(&ScanContext::new(), "index_1", "fake", &mut |_| {
                calls += 1;
                Err(StorageError::IndexCorrupt("boom".into()))
            })
            .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(err, StorageError::IndexCorrupt(_)));
    }

    #[test]
    fn test_empty_tenant_is_rejected() {
        let dir = tempdir().unwrap();
        write_index(
            dir.path().join("index_1").join("compacted.idx"),
            IndexKind::MultiTenant,
            1,
        );

        let shipper = LocalIndexShipper::new(dir.path());
        let err = traverse(&shipper, "index_1", "").unwrap_err();
        assert!(matches!(err, StorageError::IndexUnavailable(_)));
    }

    #[test]
    fn test_table_level_single_tenant_file_is_skipped() {
        let dir = tempdir().unwrap();
        let table = dir.path().join("index_1");
        write_index(table.join("stray.idx"), IndexKind::SingleTenant, 3);
        write_index(table.join("fake").join("a.idx"), IndexKind::SingleTenant, 1);

        let shipper = LocalIndexShipper::new(dir.path());
        let seen = traverse(&shipper, "index_1", "fake").unwrap();
        assert_eq!(seen, vec![(false, 1)]);
    }

    #[test]
    fn test_tenants_lists_directories() {
        let dir = tempdir().unwrap();
        let table = dir.path().join("index_1");
        write_index(table.join("compacted.idx"), IndexKind::MultiTenant, 0);
        write_index(table.join("zeta").join("a.idx"), IndexKind::SingleTenant, 1);
        write_index(table.join("alpha").join("a.idx"), IndexKind::SingleTenant, 1);

        let shipper = LocalIndexShipper::new(dir.path());
        assert_eq!(shipper.tenants("index_1").unwrap(), vec!["alpha", "zeta"]);
    }
}
