//! Client-side view of the range-partitioned store.

use rangeload_common::Result;
use rangeload_objectstore::url::ObjectUrl;
use serde::{Deserialize, Serialize};

use crate::{printable::to_printable, schema::TargetId, txn::TxnHandle};

/// Half-open key range `[start, end)` of one partition.
///
/// An empty `start` is the open low end of the key space and an empty `end`
/// the open high end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

impl KeyRange {
    pub fn new(start: Vec<u8>, end: Vec<u8>) -> KeyRange {
        KeyRange { start, end }
    }

    /// The whole key space.
    pub fn full() -> KeyRange {
        KeyRange::default()
    }

    pub fn is_open_start(&self) -> bool {
        self.start.is_empty()
    }

    pub fn is_open_end(&self) -> bool {
        self.end.is_empty()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && (self.is_open_end() || key < self.end.as_slice())
    }
}

impl std::fmt::Display for KeyRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let start = if self.is_open_start() {
            "-inf".to_string()
        } else {
            to_printable(&self.start)
        };
        let end = if self.is_open_end() {
            "+inf".to_string()
        } else {
            to_printable(&self.end)
        };
        write!(f, "[{start}, {end})")
    }
}

/// A sealed segment ready to be loaded into the partition `boundary`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRef {
    pub boundary: KeyRange,
    pub url: ObjectUrl,
    pub record_count: u64,
    pub sub_task: usize,
}

/// Store operations used by an import.
///
/// Implementations must be safe to call from several worker threads;
/// `load_segments` is invoked concurrently for different targets.
pub trait PartitionStore: Send + Sync {
    /// Splits the partitions of `target` at `keys` (strictly increasing).
    /// Keys that already coincide with a boundary may be ignored.
    fn split(&self, target: TargetId, keys: &[Vec<u8>]) -> Result<()>;

    /// Current partitions of `target`, in any order.
    fn list_partitions(&self, target: TargetId) -> Result<Vec<KeyRange>>;

    /// Makes the rows of `segments` committed data of `target`.
    fn load_segments(&self, target: TargetId, segments: &[SegmentRef], txn: &TxnHandle)
    -> Result<()>;
}

impl<T: PartitionStore + ?Sized> PartitionStore for std::sync::Arc<T> {
    fn split(&self, target: TargetId, keys: &[Vec<u8>]) -> Result<()> {
        self.as_ref().split(target, keys)
    }

    fn list_partitions(&self, target: TargetId) -> Result<Vec<KeyRange>> {
        self.as_ref().list_partitions(target)
    }

    fn load_segments(
        &self,
        target: TargetId,
        segments: &[SegmentRef],
        txn: &TxnHandle,
    ) -> Result<()> {
        self.as_ref().load_segments(target, segments, txn)
    }
}
