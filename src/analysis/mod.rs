//! Fragmentation analysis
//!
//! - **TableDriver**: Orchestrates one table scan over its tenants
//! - **FragmentationAnalyzer**: Folds the series stream into running aggregates
//! - **Report**: Final, immutable statistics

mod analyzer;
mod driver;
mod error;
mod report;

pub use analyzer::{
    format_millis, ChunkStats, FragmentationAnalyzer, RunningAggregates, CHUNK_TRACE_TARGET,
};
pub use driver::TableDriver;
pub use error::{AnalysisError, AnalysisResult};
pub use report::Report;
