//! Routing of encoded rows to shuffle buckets.

use std::ops::Range;

use ahash::AHashMap;
use rangeload_common::{Result, error::Error};
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::{
    bad_records::{BadRecord, BadRecordTracker},
    encoder::RowEncoder,
    parallel::CancellationToken,
    printable::to_printable,
    resolver::PartitionBoundary,
    row::{EncodedRow, Row},
    schema::TargetId,
    txn::TxnHandle,
};

const SUB_TASK_SEED: u64 = 0x7375_6274_6173_6b73;

/// Immutable, sorted boundary list of every target, searched by binary search.
pub struct BoundaryIndex {
    boundaries: Vec<PartitionBoundary>,
    by_target: AHashMap<TargetId, Range<usize>>,
}

impl BoundaryIndex {
    /// Sorts `boundaries` by (target, start key); the position in that order
    /// numbers the partition tasks.
    pub fn new(mut boundaries: Vec<PartitionBoundary>) -> BoundaryIndex {
        boundaries.sort_by(|a, b| {
            a.target
                .cmp(&b.target)
                .then_with(|| a.range.start.cmp(&b.range.start))
        });
        let mut by_target = AHashMap::<TargetId, Range<usize>>::new();
        for (i, boundary) in boundaries.iter().enumerate() {
            by_target
                .entry(boundary.target)
                .and_modify(|r| r.end = i + 1)
                .or_insert(i..i + 1);
        }
        BoundaryIndex {
            boundaries,
            by_target,
        }
    }

    pub fn boundaries(&self) -> &[PartitionBoundary] {
        &self.boundaries
    }

    pub fn get(&self, index: usize) -> &PartitionBoundary {
        &self.boundaries[index]
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// Index of the boundary of `target` that contains `key`.
    pub fn find(&self, target: TargetId, key: &[u8]) -> Option<usize> {
        let range = self.by_target.get(&target)?.clone();
        let slice = &self.boundaries[range.clone()];
        let pos = slice.partition_point(|b| b.range.start.as_slice() <= key);
        let candidate = pos.checked_sub(1)?;
        slice[candidate]
            .contains(key)
            .then_some(range.start + candidate)
    }
}

/// Rows of one split grouped by bucket, in arrival order.
#[derive(Debug, Default)]
pub struct ShuffleOutput {
    pub buckets: AHashMap<usize, Vec<EncodedRow>>,
    pub rows_read: u64,
    pub rows_accepted: u64,
}

impl ShuffleOutput {
    /// Appends the buckets of `other` after those of `self`. Merging partial
    /// outputs in split order preserves the arrival order within each bucket.
    pub fn append(&mut self, other: ShuffleOutput) {
        for (bucket, rows) in other.buckets {
            self.buckets.entry(bucket).or_default().extend(rows);
        }
        self.rows_read += other.rows_read;
        self.rows_accepted += other.rows_accepted;
    }
}

/// Maps encoded rows to (boundary, sub-task) buckets.
///
/// Bucket `b * tasks_per_partition + s` is sub-task `s` of boundary `b`. The
/// sub-task is a seeded hash of the key, so equal keys always meet in the same
/// bucket.
pub struct ShufflePartitioner<'a> {
    index: &'a BoundaryIndex,
    tasks_per_partition: usize,
}

impl<'a> ShufflePartitioner<'a> {
    pub fn new(index: &'a BoundaryIndex, tasks_per_partition: usize) -> ShufflePartitioner<'a> {
        ShufflePartitioner {
            index,
            tasks_per_partition: tasks_per_partition.max(1),
        }
    }

    pub fn num_buckets(&self) -> usize {
        self.index.len() * self.tasks_per_partition
    }

    pub fn tasks_per_partition(&self) -> usize {
        self.tasks_per_partition
    }

    /// Boundary index and sub-task of `bucket`.
    pub fn split_bucket(&self, bucket: usize) -> (usize, usize) {
        (
            bucket / self.tasks_per_partition,
            bucket % self.tasks_per_partition,
        )
    }

    pub fn bucket_of(&self, row: &EncodedRow) -> Result<usize> {
        let boundary = self
            .index
            .find(row.target, &row.key)
            .ok_or_else(|| Error::key_out_of_range(row.target, to_printable(&row.key)))?;
        let sub_task = if self.tasks_per_partition == 1 {
            0
        } else {
            (xxh3_64_with_seed(&row.key, SUB_TASK_SEED) % self.tasks_per_partition as u64) as usize
        };
        Ok(boundary * self.tasks_per_partition + sub_task)
    }

    /// Encodes and routes the rows of one split.
    ///
    /// A row is accepted only if all of its pairs encode and route; otherwise
    /// none of its pairs is kept and the row is handed to `bad_records`.
    pub fn shuffle_split(
        &self,
        split: usize,
        rows: impl Iterator<Item = Result<Row>>,
        encoder: &RowEncoder,
        txn: &TxnHandle,
        bad_records: &BadRecordTracker,
        cancel: &CancellationToken,
    ) -> Result<ShuffleOutput> {
        let mut output = ShuffleOutput::default();
        let mut pairs = Vec::new();
        let mut routed = Vec::new();
        for row in rows {
            if output.rows_read % 1024 == 0 {
                cancel.check()?;
            }
            let row = row?;
            output.rows_read += 1;

            pairs.clear();
            let res = encoder
                .encode_into(&row, txn, &mut pairs)
                .map_err(|e| (None, e))
                .and_then(|()| {
                    routed.clear();
                    for pair in &pairs {
                        let bucket = self.bucket_of(pair).map_err(|e| (Some(pair.target), e))?;
                        routed.push(bucket);
                    }
                    Ok(())
                });
            match res {
                Ok(()) => {
                    for (pair, &bucket) in pairs.drain(..).zip(&routed) {
                        output.buckets.entry(bucket).or_default().push(pair);
                    }
                    output.rows_accepted += 1;
                }
                Err((target, error)) => {
                    let record = BadRecord {
                        split,
                        ordinal: row.ordinal,
                        target,
                        error: error.to_string(),
                    };
                    bad_records.record(record, error)?;
                }
            }
        }
        Ok(output)
    }
}
