//! Core data types shared by the index collaborator and the analyzer
//!
//! - `Labels` / `Fingerprint`: series identity
//! - `ChunkMeta` / `Sample`: per-chunk metadata as stored in the index
//! - `ChunkRef` / `SeriesDescriptor`: query results
//! - `TimeRange` / `ShardHint`: query bounds

use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

/// Stable hash of a label set, used for fast equality and grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub u64);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A single label pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

/// Label set identifying a series
///
/// Pairs are kept sorted by name so that equal sets compare, hash and
/// render identically regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "LabelsRepr")]
pub struct Labels {
    labels: Vec<Label>,
}

/// Wire form of `Labels`; decoded pairs are re-sorted before use
#[derive(Deserialize)]
struct LabelsRepr {
    labels: Vec<Label>,
}

impl From<LabelsRepr> for Labels {
    fn from(repr: LabelsRepr) -> Self {
        repr.labels
            .into_iter()
            .fold(Labels::new(), |labels, l| labels.with(l.name, l.value))
    }
}

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from (name, value) pairs; later duplicates replace earlier ones
    pub fn from_pairs<N, V>(pairs: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        pairs
            .into_iter()
            .fold(Self::new(), |labels, (name, value)| labels.with(name, value))
    }

    /// Builder method: set a label
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.labels.binary_search_by(|l| l.name.as_str().cmp(&name)) {
            Ok(idx) => self.labels[idx].value = value,
            Err(idx) => self.labels.insert(idx, Label { name, value }),
        }
        self
    }

    /// Get the value of a label, if present
    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels
            .binary_search_by(|l| l.name.as_str().cmp(name))
            .ok()
            .map(|idx| self.labels[idx].value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Calculate the fingerprint of this label set
    ///
    /// xxh3 over `name 0xff value 0xff` for every pair in sorted order.
    /// Fingerprints are persisted, so this encoding must not change.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(xxh3_64(&self.fingerprint_bytes()))
    }

    fn fingerprint_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            self.labels
                .iter()
                .map(|l| l.name.len() + l.value.len() + 2)
                .sum(),
        );
        for label in &self.labels {
            buf.extend_from_slice(label.name.as_bytes());
            buf.push(0xff);
            buf.extend_from_slice(label.value.as_bytes());
            buf.push(0xff);
        }
        buf
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", label.name, label.value)?;
        }
        write!(f, "}}")
    }
}

/// Downsampled observation bucket within a chunk's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Bucket timestamp, in milliseconds
    pub timestamp: i64,
    /// Kilobytes observed in this bucket
    pub kb: u32,
    /// Entries observed in this bucket
    pub entries: u32,
}

impl Sample {
    pub fn new(timestamp: i64, kb: u32, entries: u32) -> Self {
        Self {
            timestamp,
            kb,
            entries,
        }
    }
}

/// Per-chunk metadata as stored in the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub checksum: u32,
    /// Earliest entry timestamp (ms, inclusive)
    pub min_time: i64,
    /// Latest entry timestamp (ms, inclusive)
    pub max_time: i64,
    /// Total size in kilobytes
    pub kb: u32,
    /// Total entry count
    pub entries: u32,
    /// Downsampled observations, ordered by timestamp
    #[serde(default)]
    pub samples: Vec<Sample>,
}

impl ChunkMeta {
    pub fn new(min_time: i64, max_time: i64, kb: u32, entries: u32) -> Self {
        Self {
            checksum: 0,
            min_time,
            max_time,
            kb,
            entries,
            samples: Vec::new(),
        }
    }

    /// Builder method: set the stored checksum
    pub fn checksum(mut self, checksum: u32) -> Self {
        self.checksum = checksum;
        self
    }

    /// Builder method: attach samples
    pub fn samples(mut self, samples: Vec<Sample>) -> Self {
        self.samples = samples;
        self
    }

    /// Check the invariants a decoded chunk must satisfy
    pub fn validate(&self) -> StorageResult<()> {
        if self.min_time > self.max_time {
            return Err(StorageError::IndexCorrupt(format!(
                "chunk {:08x} has min_time {} after max_time {}",
                self.checksum, self.min_time, self.max_time
            )));
        }
        if self
            .samples
            .windows(2)
            .any(|pair| pair[0].timestamp > pair[1].timestamp)
        {
            return Err(StorageError::IndexCorrupt(format!(
                "chunk {:08x} has samples out of order",
                self.checksum
            )));
        }
        Ok(())
    }

    /// Check if this chunk overlaps with a time range
    pub fn overlaps(&self, range: &TimeRange) -> bool {
        self.min_time <= range.to && self.max_time >= range.from
    }
}

/// Reference to a stored chunk (never the payload)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkRef {
    pub fingerprint: Fingerprint,
    pub checksum: u32,
    pub from: i64,
    pub through: i64,
    pub kb: u32,
    pub entries: u32,
}

impl ChunkRef {
    pub fn new(fingerprint: Fingerprint, chunk: &ChunkMeta) -> Self {
        Self {
            fingerprint,
            checksum: chunk.checksum,
            from: chunk.min_time,
            through: chunk.max_time,
            kb: chunk.kb,
            entries: chunk.entries,
        }
    }
}

/// A series returned by a series query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesDescriptor {
    pub labels: Labels,
    pub fingerprint: Fingerprint,
}

/// Closed time interval [from, to] in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: i64,
    pub to: i64,
}

impl TimeRange {
    /// Earliest representable timestamp
    pub const EARLIEST: i64 = i64::MIN;
    /// Latest representable timestamp
    pub const LATEST: i64 = i64::MAX;

    /// Create a time range, returning None if `from > to`
    pub fn try_new(from: i64, to: i64) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    /// The unbounded range used for full-table scans
    pub fn all() -> Self {
        Self {
            from: Self::EARLIEST,
            to: Self::LATEST,
        }
    }

    /// Check if a timestamp falls within this range
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.from && timestamp <= self.to
    }
}

/// Restricts a query to one shard of the fingerprint space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardHint {
    pub shard: u32,
    pub of: u32,
}

impl ShardHint {
    pub fn new(shard: u32, of: u32) -> StorageResult<Self> {
        if of == 0 || shard >= of {
            return Err(StorageError::InvalidShard { shard, of });
        }
        Ok(Self { shard, of })
    }

    /// Check if a fingerprint belongs to this shard
    pub fn contains(&self, fingerprint: Fingerprint) -> bool {
        fingerprint.0 % self.of as u64 == self.shard as u64
    }
}
