//! [`PartitionStore`] wrappers for tests.

use std::{
    path::Path,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use rangeload::{
    KeyRange, LocalRangeStore, PartitionStore, SegmentRef, TableSchema, TargetId, TxnHandle,
};
use rangeload_common::{Result, error::Error};

use crate::readback::read_segment_url;

/// Opens a [`LocalRangeStore`] under `root` with every target of `schema`
/// registered as a single unbounded partition.
pub fn local_store(root: &Path, schema: &TableSchema) -> anyhow::Result<LocalRangeStore> {
    let store = LocalRangeStore::open(root)?;
    for target in schema.targets()? {
        store.ensure_target(target.id)?;
    }
    Ok(store)
}

/// Pairs of one loaded segment, read before the store takes the file over.
#[derive(Debug, Clone)]
pub struct LoadedSegment {
    pub target: TargetId,
    pub boundary: KeyRange,
    pub sub_task: usize,
    pub records: Vec<(Vec<u8>, Vec<u8>)>,
}

/// Forwards every call to `inner` and records it.
pub struct RecordingStore<S> {
    inner: S,
    splits: Mutex<Vec<(TargetId, Vec<Vec<u8>>)>>,
    list_calls: AtomicUsize,
    loads: Mutex<Vec<(TargetId, Vec<SegmentRef>, u64)>>,
    loaded: Mutex<Vec<LoadedSegment>>,
}

impl<S: PartitionStore> RecordingStore<S> {
    pub fn new(inner: S) -> RecordingStore<S> {
        RecordingStore {
            inner,
            splits: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            loads: Mutex::new(Vec::new()),
            loaded: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Split calls in call order.
    pub fn splits(&self) -> Vec<(TargetId, Vec<Vec<u8>>)> {
        self.splits.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    /// Load calls as (target, segments, txn id), sorted by target.
    pub fn loads(&self) -> Vec<(TargetId, Vec<SegmentRef>, u64)> {
        let mut loads = self.loads.lock().unwrap().clone();
        loads.sort_by_key(|(target, _, _)| *target);
        loads
    }

    /// Contents of every segment passed to `load_segments`.
    pub fn loaded_segments(&self) -> Vec<LoadedSegment> {
        self.loaded.lock().unwrap().clone()
    }
}

impl<S: PartitionStore> PartitionStore for RecordingStore<S> {
    fn split(&self, target: TargetId, keys: &[Vec<u8>]) -> Result<()> {
        self.splits.lock().unwrap().push((target, keys.to_vec()));
        self.inner.split(target, keys)
    }

    fn list_partitions(&self, target: TargetId) -> Result<Vec<KeyRange>> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        self.inner.list_partitions(target)
    }

    fn load_segments(
        &self,
        target: TargetId,
        segments: &[SegmentRef],
        txn: &TxnHandle,
    ) -> Result<()> {
        self.loads
            .lock()
            .unwrap()
            .push((target, segments.to_vec(), txn.id()));
        for segment in segments {
            if let Ok((_, records)) = read_segment_url(&segment.url) {
                self.loaded.lock().unwrap().push(LoadedSegment {
                    target,
                    boundary: segment.boundary.clone(),
                    sub_task: segment.sub_task,
                    records,
                });
            }
        }
        self.inner.load_segments(target, segments, txn)
    }
}

/// Rejects `load_segments` for one target; forwards everything else.
pub struct FailingStore<S> {
    inner: S,
    fail_target: TargetId,
}

impl<S: PartitionStore> FailingStore<S> {
    pub fn new(inner: S, fail_target: TargetId) -> FailingStore<S> {
        FailingStore { inner, fail_target }
    }
}

impl<S: PartitionStore> PartitionStore for FailingStore<S> {
    fn split(&self, target: TargetId, keys: &[Vec<u8>]) -> Result<()> {
        self.inner.split(target, keys)
    }

    fn list_partitions(&self, target: TargetId) -> Result<Vec<KeyRange>> {
        self.inner.list_partitions(target)
    }

    fn load_segments(
        &self,
        target: TargetId,
        segments: &[SegmentRef],
        txn: &TxnHandle,
    ) -> Result<()> {
        if target == self.fail_target {
            let segment = segments.first().map_or("", |s| s.url.as_str());
            return Err(Error::load(target, segment, "injected failure"));
        }
        self.inner.load_segments(target, segments, txn)
    }
}
