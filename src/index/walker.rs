//! Per-series chunk walker
//!
//! Streams the chunk metadata of one index a series at a time. This is the
//! only traversal allowed to touch a whole table's chunk metadata, so it
//! never collects; callers accumulate whatever they need inside `visit`.

use crate::index::LabelMatcher;
use crate::storage::{ChunkMeta, Fingerprint, Labels, ScanContext, SeriesIndex, StorageResult, TimeRange};

/// Walks the series of one single-tenant index
pub struct ChunkWalker<'a> {
    index: &'a dyn SeriesIndex,
    ctx: &'a ScanContext,
}

impl<'a> ChunkWalker<'a> {
    pub fn new(index: &'a dyn SeriesIndex, ctx: &'a ScanContext) -> Self {
        Self { index, ctx }
    }

    /// Call `visit` for every series matching `matcher` until it returns true
    ///
    /// A record that fails to decode ends the walk with `IndexCorrupt`;
    /// series visited before it are not rolled back.
    pub fn for_each_series<F>(
        &self,
        tenant: &str,
        range: TimeRange,
        matcher: &LabelMatcher,
        mut visit: F,
    ) -> StorageResult<()>
    where
        F: FnMut(&Labels, Fingerprint, &[ChunkMeta]) -> bool,
    {
        tracing::trace!(tenant, matcher = %matcher, "Walking series");
        self.index.for_series(
            self.ctx,
            None,
            range,
            &mut visit,
            std::slice::from_ref(matcher),
        )
    }
}
