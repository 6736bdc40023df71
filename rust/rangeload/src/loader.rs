//! Hand-off of sealed segments to the store.

use std::collections::BTreeMap;

use log::info;
use rangeload_common::Result;

use crate::{
    parallel::{CancellationToken, WorkerPool},
    schema::TargetId,
    store::{PartitionStore, SegmentRef},
    txn::TxnHandle,
};

pub struct BulkLoader<'a> {
    store: &'a dyn PartitionStore,
    pool: &'a WorkerPool,
}

impl<'a> BulkLoader<'a> {
    pub fn new(store: &'a dyn PartitionStore, pool: &'a WorkerPool) -> BulkLoader<'a> {
        BulkLoader { store, pool }
    }

    /// Loads every segment, one `load_segments` call per target, targets in
    /// parallel. A failure cancels the calls that have not started yet; the
    /// running ones are awaited, the first failure is returned and the others
    /// are logged. Returns the number of loaded records.
    pub fn load(
        &self,
        segments: Vec<(TargetId, SegmentRef)>,
        txn: &TxnHandle,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut by_target = BTreeMap::<TargetId, Vec<SegmentRef>>::new();
        for (target, segment) in segments {
            by_target.entry(target).or_default().push(segment);
        }
        let groups = by_target.into_iter().collect::<Vec<_>>();
        let loaded = self
            .pool
            .try_map("loading", groups, cancel, |(target, segments)| {
                self.store.load_segments(target, &segments, txn)?;
                let records = segments.iter().map(|s| s.record_count).sum::<u64>();
                info!(
                    "target {target}: loaded {} segment(s), {records} record(s)",
                    segments.len()
                );
                Ok(records)
            })?;
        Ok(loaded.into_iter().sum())
    }
}
