//! Series & chunk-ref accessor
//!
//! Thin adapter over one single-tenant index. Results are written into
//! caller-owned buffers whose length is reset before every fetch; the
//! returned slice borrows the buffer, so a second fetch into the same
//! buffer cannot overwrite results that are still being read.

use crate::index::LabelMatcher;
use crate::storage::{ChunkRef, ScanContext, SeriesDescriptor, SeriesIndex, StorageResult, TimeRange};

/// Fetches series and chunk references for one tenant of one index
pub struct SeriesAccessor<'a> {
    index: &'a dyn SeriesIndex,
    ctx: &'a ScanContext,
}

impl<'a> SeriesAccessor<'a> {
    pub fn new(index: &'a dyn SeriesIndex, ctx: &'a ScanContext) -> Self {
        Self { index, ctx }
    }

    /// Series matching `matcher` within `range`
    pub fn fetch_series<'b>(
        &self,
        tenant: &str,
        range: TimeRange,
        matcher: &LabelMatcher,
        buf: &'b mut Vec<SeriesDescriptor>,
    ) -> StorageResult<&'b [SeriesDescriptor]> {
        buf.clear();
        self.index.series(
            self.ctx,
            tenant,
            range,
            buf,
            None,
            std::slice::from_ref(matcher),
        )?;
        Ok(buf.as_slice())
    }

    /// Chunk references of the series matching `matcher` within `range`
    pub fn fetch_chunk_refs<'b>(
        &self,
        tenant: &str,
        range: TimeRange,
        matcher: &LabelMatcher,
        buf: &'b mut Vec<ChunkRef>,
    ) -> StorageResult<&'b [ChunkRef]> {
        buf.clear();
        self.index.chunk_refs(
            self.ctx,
            tenant,
            range,
            buf,
            None,
            std::slice::from_ref(matcher),
        )?;
        Ok(buf.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ChunkMeta, Labels, MemoryIndex};

    fn index_with(series: usize) -> MemoryIndex {
        (0..series).fold(MemoryIndex::new(), |idx, i| {
            idx.with_series(
                Labels::from_pairs([("stream", i.to_string())]),
                vec![ChunkMeta::new(0, 10, 1, 1), ChunkMeta::new(10, 20, 1, 1)],
            )
        })
    }

    #[test]
    fn test_fetch_series_reuses_buffer_without_stale_entries() {
        let ctx = ScanContext::new();
        let big = index_with(8);
        let small = index_with(3);
        let matcher = LabelMatcher::match_all();
        let mut buf = Vec::new();

        let first = SeriesAccessor::new(&big, &ctx)
            .fetch_series("fake", TimeRange::all(), &matcher, &mut buf)
            .unwrap()
            .len();
        assert_eq!(first, 8);
        let capacity = buf.capacity();

        let second = SeriesAccessor::new(&small, &ctx)
            .fetch_series("fake", TimeRange::all(), &matcher, &mut buf)
            .unwrap();
        assert_eq!(second.len(), 3);
        assert_eq!(second[2].labels.get("stream"), Some("2"));
        // Same backing storage, no reallocation
        assert_eq!(buf.capacity(), capacity);
    }

    #[test]
    fn test_fetch_chunk_refs_reuses_buffer() {
        let ctx = ScanContext::new();
        let matcher = LabelMatcher::match_all();
        let mut buf = Vec::new();

        let big = index_with(5);
        let refs = SeriesAccessor::new(&big, &ctx)
            .fetch_chunk_refs("fake", TimeRange::all(), &matcher, &mut buf)
            .unwrap();
        assert_eq!(refs.len(), 10);

        let small = index_with(1);
        let refs = SeriesAccessor::new(&small, &ctx)
            .fetch_chunk_refs("fake", TimeRange::all(), &matcher, &mut buf)
            .unwrap();
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn test_fetch_series_applies_matcher() {
        let ctx = ScanContext::new();
        let idx = index_with(4);
        let matcher = LabelMatcher::parse(r#"stream=~"[02]""#).unwrap();
        let mut buf = Vec::new();

        let series = SeriesAccessor::new(&idx, &ctx)
            .fetch_series("fake", TimeRange::all(), &matcher, &mut buf)
            .unwrap();
        assert_eq!(series.len(), 2);
    }
}
