//! # Index Analyzer
//!
//! Fragmentation and sizing diagnostics for a tenant-partitioned series
//! chunk index. For one table it walks every tenant's single-tenant
//! indexes, streams the chunk metadata of each series, and reports how many
//! series and chunks there are, how chunks are spread across series, and how
//! many series are fragmented into more chunks than a threshold.
//!
//! ## Modules
//!
//! - [`storage`]: Index collaborator (file format, traversal primitive)
//! - [`index`]: Label matchers, series accessor, per-series chunk walker
//! - [`analysis`]: Fragmentation analyzer, table driver, report
//! - [`config`]: Configuration loading and diffing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use index_analyzer::{AnalysisConfig, LocalIndexShipper, ScanContext, TableDriver};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let shipper = LocalIndexShipper::new("/var/lib/index-analyzer");
//!     let driver = TableDriver::new(&shipper, AnalysisConfig::default());
//!
//!     let tenants = driver.discover_tenants("index_19700")?;
//!     let report = driver.run(&ScanContext::new(), "index_19700", &tenants)?;
//!
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod index;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    ChunkMeta, ChunkRef, Fingerprint, IndexShipper, LocalIndexShipper, MemoryIndexShipper,
    ScanContext, SeriesIndex, StorageError, StorageResult, TimeRange,
};

pub use index::{ChunkWalker, LabelMatcher, MatchType, SeriesAccessor};

pub use analysis::{
    AnalysisError, AnalysisResult, FragmentationAnalyzer, Report, RunningAggregates, TableDriver,
};

pub use config::{AnalysisConfig, Config, ConfigError, IndexConfig, LoggingConfig};
