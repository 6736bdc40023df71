//! Split execution and partition boundary resolution.

use log::{debug, warn};
use rangeload_common::{Result, error::Error};
use rangeload_objectstore::url::ObjectUrl;

use crate::{
    planner::CutPoints,
    schema::TargetId,
    store::{KeyRange, PartitionStore},
};

/// One partition of one target as reported by the store, with the output
/// directory that receives its segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionBoundary {
    pub target: TargetId,
    pub range: KeyRange,
    pub directory: ObjectUrl,
}

impl PartitionBoundary {
    pub fn contains(&self, key: &[u8]) -> bool {
        self.range.contains(key)
    }
}

pub struct PartitionResolver<'a> {
    store: &'a dyn PartitionStore,
    output_root: &'a ObjectUrl,
}

impl<'a> PartitionResolver<'a> {
    pub fn new(store: &'a dyn PartitionStore, output_root: &'a ObjectUrl) -> PartitionResolver<'a> {
        PartitionResolver { store, output_root }
    }

    /// Issues the splits of every target with cut points, one target at a time.
    /// Returns the number of targets that were split.
    pub fn split_all(&self, cut_points: &[CutPoints]) -> Result<usize> {
        let mut split = 0;
        for cp in cut_points.iter().filter(|cp| !cp.is_empty()) {
            debug!("target {}: splitting at {:?}", cp.target, cp.to_printable());
            self.store.split(cp.target, &cp.keys)?;
            split += 1;
        }
        Ok(split)
    }

    /// Reads the partitions of `targets` back from the store.
    ///
    /// The result is sorted by (target id, start key) and each boundary gets a
    /// fresh output directory `<root>/<target>/<uuid>/`. The partitions of a
    /// target must be contiguous; an ordered list with a gap or an overlap is
    /// rejected. Closed outer ends are tolerated: keys beyond them become bad
    /// records during the shuffle.
    pub fn resolve(&self, targets: &[TargetId]) -> Result<Vec<PartitionBoundary>> {
        let mut boundaries = Vec::new();
        let mut targets = targets.to_vec();
        targets.sort_unstable();
        targets.dedup();
        for target in targets {
            let mut ranges = self.store.list_partitions(target)?;
            check_layout(target, &mut ranges)?;
            for range in ranges {
                let target_dir = target.to_string();
                let task_dir = uuid::Uuid::new_v4().to_string();
                let directory = self
                    .output_root
                    .join_segments(&[target_dir.as_str(), task_dir.as_str(), ""])?;
                debug!("target {target}: partition {range} -> {directory}");
                boundaries.push(PartitionBoundary {
                    target,
                    range,
                    directory,
                });
            }
        }
        Ok(boundaries)
    }
}

/// Sorts `ranges` by start key and checks that they form a contiguous chain.
fn check_layout(target: TargetId, ranges: &mut [KeyRange]) -> Result<()> {
    if ranges.is_empty() {
        return Err(Error::partition_layout(target, "the store reports no partitions"));
    }
    ranges.sort_by(|a, b| a.start.cmp(&b.start));
    for pair in ranges.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.is_open_end() || prev.end != next.start {
            return Err(Error::partition_layout(
                target,
                format!("{prev} is not followed by a contiguous partition ({next})"),
            ));
        }
    }
    for range in ranges.iter() {
        if !range.is_open_end() && range.end <= range.start {
            return Err(Error::partition_layout(target, format!("empty partition {range}")));
        }
    }
    if let (Some(first), Some(last)) = (ranges.first(), ranges.last()) {
        if !first.is_open_start() || !last.is_open_end() {
            let covered = KeyRange::new(first.start.clone(), last.end.clone());
            warn!("target {target}: partitions cover {covered} only");
        }
    }
    Ok(())
}
