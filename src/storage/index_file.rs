//! Index file format
//!
//! An index file holds the chunk metadata of every series of one table,
//! either for a single tenant or merged across tenants.
//!
//! Layout:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ HEADER (64 bytes)                       │
//! │   magic: [u8; 4] = "CIDX"               │
//! │   version: u16                          │
//! │   kind: u8 (0 single, 1 multi)          │
//! │   series_count: u32                     │
//! │   chunk_count: u64                      │
//! │   min_time: i64                         │
//! │   max_time: i64                         │
//! │   reserved: [u8; 25]                    │
//! │   checksum: u32                         │
//! ├─────────────────────────────────────────┤
//! │ RECORDS (series_count times)            │
//! │   record_size: u32                      │
//! │   compressed_record: [u8; record_size]  │
//! │   record_checksum: u32                  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Records are read one at a time, so walking a file never holds more
//! than one series' chunk list in memory.

use crate::index::{matches_all, LabelMatcher};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::shipper::{ScanContext, SeriesIndex, SeriesVisitor};
use crate::storage::types::{
    ChunkMeta, ChunkRef, Fingerprint, Labels, SeriesDescriptor, ShardHint, TimeRange,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for index file identification
const INDEX_MAGIC: [u8; 4] = *b"CIDX";

/// Current index format version
const INDEX_VERSION: u16 = 1;

/// Header size in bytes
const HEADER_SIZE: usize = 64;

/// Upper bound on a single compressed record
const MAX_RECORD_SIZE: u32 = 64 * 1024 * 1024;

/// Label carrying the owning tenant in merged index files
pub const TENANT_LABEL: &str = "__tenant_id__";

/// Whether an index file belongs to one tenant or merges several
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndexKind {
    SingleTenant = 0,
    MultiTenant = 1,
}

impl TryFrom<u8> for IndexKind {
    type Error = StorageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(IndexKind::SingleTenant),
            1 => Ok(IndexKind::MultiTenant),
            _ => Err(StorageError::IndexCorrupt(format!(
                "Unknown index kind: {}",
                value
            ))),
        }
    }
}

/// Index file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    pub version: u16,
    pub kind: IndexKind,
    pub series_count: u32,
    pub chunk_count: u64,
    /// Earliest chunk start across the file
    pub min_time: i64,
    /// Latest chunk end across the file
    pub max_time: i64,
}

impl IndexHeader {
    pub fn new(kind: IndexKind) -> Self {
        Self {
            version: INDEX_VERSION,
            kind,
            series_count: 0,
            chunk_count: 0,
            min_time: i64::MAX,
            max_time: i64::MIN,
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..4].copy_from_slice(&INDEX_MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6] = self.kind as u8;
        buf[7..11].copy_from_slice(&self.series_count.to_le_bytes());
        buf[11..19].copy_from_slice(&self.chunk_count.to_le_bytes());
        buf[19..27].copy_from_slice(&self.min_time.to_le_bytes());
        buf[27..35].copy_from_slice(&self.max_time.to_le_bytes());
        // bytes 35-59 reserved

        let checksum = crc32fast::hash(&buf[0..60]);
        buf[60..64].copy_from_slice(&checksum.to_le_bytes());

        buf
    }

    /// Parse header from bytes
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> StorageResult<Self> {
        let stored_checksum = u32::from_le_bytes(le_array(&buf[60..64]));
        let computed_checksum = crc32fast::hash(&buf[0..60]);

        if stored_checksum != computed_checksum {
            return Err(StorageError::IndexCorrupt(format!(
                "Header checksum mismatch: stored={}, computed={}",
                stored_checksum, computed_checksum
            )));
        }

        if buf[0..4] != INDEX_MAGIC {
            return Err(StorageError::IndexCorrupt(format!(
                "Invalid magic: {:?}",
                &buf[0..4]
            )));
        }

        let version = u16::from_le_bytes(le_array(&buf[4..6]));
        if version > INDEX_VERSION {
            return Err(StorageError::IndexCorrupt(format!(
                "Unsupported version: {}",
                version
            )));
        }

        Ok(Self {
            version,
            kind: IndexKind::try_from(buf[6])?,
            series_count: u32::from_le_bytes(le_array(&buf[7..11])),
            chunk_count: u64::from_le_bytes(le_array(&buf[11..19])),
            min_time: i64::from_le_bytes(le_array(&buf[19..27])),
            max_time: i64::from_le_bytes(le_array(&buf[27..35])),
        })
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// One decoded series record
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeriesRecord {
    pub labels: Labels,
    pub fingerprint: Fingerprint,
    pub chunks: Vec<ChunkMeta>,
}

/// Borrowed mirror of `SeriesRecord` used on the write path
#[derive(Serialize)]
struct SeriesRecordRef<'a> {
    labels: &'a Labels,
    fingerprint: Fingerprint,
    chunks: &'a [ChunkMeta],
}

/// An index file opened for reading
#[derive(Debug, Clone)]
pub struct IndexFile {
    pub path: PathBuf,
    pub header: IndexHeader,
}

impl IndexFile {
    /// Open an existing index file and verify its header
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).map_err(|e| {
            StorageError::IndexUnavailable(format!("{}: {}", path.display(), e))
        })?;

        let mut header_buf = [0u8; HEADER_SIZE];
        read_exact_or_corrupt(&mut file, &mut header_buf, "header")?;
        let header = IndexHeader::from_bytes(&header_buf)?;

        Ok(Self { path, header })
    }

    pub fn kind(&self) -> IndexKind {
        self.header.kind
    }

    /// Stream the series records of this file in stored order
    pub fn records(&self) -> StorageResult<SeriesRecords> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.seek(SeekFrom::Start(HEADER_SIZE as u64))?;

        Ok(SeriesRecords {
            reader,
            remaining: self.header.series_count,
            position: 0,
        })
    }

    /// Visit every record accepted by the filters until `visit` returns true
    fn scan<F>(
        &self,
        ctx: &ScanContext,
        tenant: Option<&str>,
        shard: Option<ShardHint>,
        matchers: &[LabelMatcher],
        mut visit: F,
    ) -> StorageResult<()>
    where
        F: FnMut(SeriesRecord) -> bool,
    {
        for record in self.records()? {
            ctx.check()?;
            let record = record?;

            if let (IndexKind::MultiTenant, Some(tenant)) = (self.header.kind, tenant) {
                if record.labels.get(TENANT_LABEL) != Some(tenant) {
                    continue;
                }
            }
            if let Some(shard) = shard {
                if !shard.contains(record.fingerprint) {
                    continue;
                }
            }
            if !matches_all(matchers, &record.labels) {
                continue;
            }

            if visit(record) {
                break;
            }
        }
        Ok(())
    }
}

impl SeriesIndex for IndexFile {
    fn series(
        &self,
        ctx: &ScanContext,
        tenant: &str,
        range: TimeRange,
        buf: &mut Vec<SeriesDescriptor>,
        shard: Option<ShardHint>,
        matchers: &[LabelMatcher],
    ) -> StorageResult<()> {
        buf.clear();
        self.scan(ctx, Some(tenant), shard, matchers, |record| {
            if record.chunks.iter().any(|c| c.overlaps(&range)) {
                buf.push(SeriesDescriptor {
                    labels: record.labels,
                    fingerprint: record.fingerprint,
                });
            }
            false
        })
    }

    fn chunk_refs(
        &self,
        ctx: &ScanContext,
        tenant: &str,
        range: TimeRange,
        buf: &mut Vec<ChunkRef>,
        shard: Option<ShardHint>,
        matchers: &[LabelMatcher],
    ) -> StorageResult<()> {
        buf.clear();
        self.scan(ctx, Some(tenant), shard, matchers, |record| {
            buf.extend(
                record
                    .chunks
                    .iter()
                    .filter(|c| c.overlaps(&range))
                    .map(|c| ChunkRef::new(record.fingerprint, c)),
            );
            false
        })
    }

    fn for_series(
        &self,
        ctx: &ScanContext,
        shard: Option<ShardHint>,
        range: TimeRange,
        visit: &mut SeriesVisitor<'_>,
        matchers: &[LabelMatcher],
    ) -> StorageResult<()> {
        self.scan(ctx, None, shard, matchers, |mut record| {
            record.chunks.retain(|c| c.overlaps(&range));
            visit(&record.labels, record.fingerprint, &record.chunks)
        })
    }
}

/// Lazy iterator over the records of an index file
///
/// Stops after the first error.
pub struct SeriesRecords {
    reader: BufReader<File>,
    remaining: u32,
    position: u32,
}

impl SeriesRecords {
    fn read_record(&mut self) -> StorageResult<SeriesRecord> {
        let what = format!("record {}", self.position);

        let mut size_buf = [0u8; 4];
        read_exact_or_corrupt(&mut self.reader, &mut size_buf, &what)?;
        let size = u32::from_le_bytes(size_buf);
        if size > MAX_RECORD_SIZE {
            return Err(StorageError::IndexCorrupt(format!(
                "{} claims {} bytes",
                what, size
            )));
        }

        let mut data = vec![0u8; size as usize];
        read_exact_or_corrupt(&mut self.reader, &mut data, &what)?;

        let mut checksum_buf = [0u8; 4];
        read_exact_or_corrupt(&mut self.reader, &mut checksum_buf, &what)?;
        let stored_checksum = u32::from_le_bytes(checksum_buf);
        let computed_checksum = crc32fast::hash(&data);

        if stored_checksum != computed_checksum {
            return Err(StorageError::IndexCorrupt(format!(
                "{} checksum mismatch",
                what
            )));
        }

        let decompressed = lz4_flex::decompress_size_prepended(&data).map_err(|e| {
            StorageError::IndexCorrupt(format!("{} LZ4 decompression failed: {}", what, e))
        })?;

        let record: SeriesRecord = bincode::deserialize(&decompressed)?;
        for chunk in &record.chunks {
            chunk.validate()?;
        }

        Ok(record)
    }
}

impl Iterator for SeriesRecords {
    type Item = StorageResult<SeriesRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let result = self.read_record();
        match result {
            Ok(_) => {
                self.remaining -= 1;
                self.position += 1;
            }
            Err(_) => self.remaining = 0,
        }
        Some(result)
    }
}

/// Truncation inside a file is corruption, anything else is an I/O failure
fn read_exact_or_corrupt(reader: &mut impl Read, buf: &mut [u8], what: &str) -> StorageResult<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => StorageError::IndexCorrupt(format!("{} truncated", what)),
        _ => StorageError::IndexUnavailable(format!("reading {}: {}", what, e)),
    })
}

/// Writes index files in the format read by [`IndexFile`]
pub struct IndexFileWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    header: IndexHeader,
}

impl IndexFileWriter {
    /// Create a new index file, replacing any existing one
    pub fn create(path: impl AsRef<Path>, kind: IndexKind) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(&path)?);
        let header = IndexHeader::new(kind);
        writer.write_all(&header.to_bytes())?;

        Ok(Self {
            path,
            writer,
            header,
        })
    }

    /// Append one series with its chunk list
    pub fn append_series(
        &mut self,
        labels: &Labels,
        chunks: &[ChunkMeta],
    ) -> StorageResult<Fingerprint> {
        for chunk in chunks {
            chunk.validate()?;
        }

        let fingerprint = labels.fingerprint();
        let record = SeriesRecordRef {
            labels,
            fingerprint,
            chunks,
        };

        let serialized = bincode::serialize(&record).map_err(|e| {
            StorageError::IndexCorrupt(format!("Failed to encode series {}: {}", labels, e))
        })?;
        let compressed = lz4_flex::compress_prepend_size(&serialized);
        let checksum = crc32fast::hash(&compressed);

        self.writer
            .write_all(&(compressed.len() as u32).to_le_bytes())?;
        self.writer.write_all(&compressed)?;
        self.writer.write_all(&checksum.to_le_bytes())?;

        self.header.series_count += 1;
        self.header.chunk_count += chunks.len() as u64;
        for chunk in chunks {
            self.header.min_time = self.header.min_time.min(chunk.min_time);
            self.header.max_time = self.header.max_time.max(chunk.max_time);
        }

        Ok(fingerprint)
    }

    /// Rewrite the header with final counts and reopen for reading
    pub fn finish(mut self) -> StorageResult<IndexFile> {
        self.writer.seek(SeekFrom::Start(0))?;
        self.writer.write_all(&self.header.to_bytes())?;
        self.writer.flush()?;
        drop(self.writer);

        IndexFile::open(&self.path)
    }
}
