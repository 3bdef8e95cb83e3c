//! Index storage collaborator
//!
//! Everything the analyzer reads comes through this module:
//!
//! - **types**: Series identity and chunk metadata (Labels, ChunkMeta, ChunkRef)
//! - **index_file**: On-disk index file format, read one series record at a time
//! - **shipper**: Traversal primitive over a table's indexes (`IndexShipper`)
//!   and the per-index query primitive (`SeriesIndex`)
//! - **memory**: In-memory implementations of both traits
//! - **error**: Error types
//!
//! # Read Path
//!
//! ```text
//!   IndexShipper::for_each(table, tenant)
//!     → IndexInstance::{SingleTenant, MultiTenant}
//!       → SeriesIndex::{series, chunk_refs, for_series}
//! ```
//!
//! Nothing in this module writes to an index during a scan; the only
//! writer is `IndexFileWriter`, used to produce files ahead of time.

pub mod error;
pub mod index_file;
pub mod memory;
pub mod shipper;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use index_file::{IndexFile, IndexFileWriter, IndexHeader, IndexKind, SeriesRecord, TENANT_LABEL};
pub use memory::{MemoryIndex, MemoryIndexShipper, MemoryInstance};
pub use shipper::{
    IndexCallback, IndexInstance, IndexShipper, LocalIndexShipper, ScanContext, SeriesIndex,
    SeriesVisitor, INDEX_FILE_EXTENSION,
};
pub use types::{
    ChunkMeta, ChunkRef, Fingerprint, Label, Labels, Sample, SeriesDescriptor, ShardHint,
    TimeRange,
};
