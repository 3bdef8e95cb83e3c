//! Index access for the analyzer
//!
//! - **LabelMatcher**: Which series qualify for a scan
//! - **SeriesAccessor**: Top-line series and chunk-ref fetches into reused buffers
//! - **ChunkWalker**: Streaming per-series chunk metadata
//!
//! # Architecture
//!
//! ```text
//! Single-tenant index
//!        ↓
//! SeriesAccessor: series + chunk refs → counts
//!        ↓
//! ChunkWalker: (labels, fingerprint, [ChunkMeta]) one series at a time
//!        ↓
//! FragmentationAnalyzer
//! ```

mod accessor;
mod matcher;
mod walker;

pub use accessor::SeriesAccessor;
pub use matcher::{matches_all, LabelMatcher, MatchType};
pub use walker::ChunkWalker;
