//! Cut-point planning.

use log::debug;
use rangeload_common::{Result, error::Error};
use serde::{Deserialize, Serialize};

use crate::{printable::to_printable, sampler::SampleStatistic, schema::TargetId};

/// Split keys of one target, strictly increasing.
///
/// `n` cut points define `n + 1` partitions; an empty set leaves the target
/// as a single partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutPoints {
    pub target: TargetId,
    pub keys: Vec<Vec<u8>>,
}

impl CutPoints {
    pub fn empty(target: TargetId) -> CutPoints {
        CutPoints {
            target,
            keys: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn num_partitions(&self) -> usize {
        self.keys.len() + 1
    }

    /// Keys in printable-binary form, one per entry.
    pub fn to_printable(&self) -> Vec<String> {
        self.keys.iter().map(|k| to_printable(k)).collect()
    }
}

/// Number of partitions a target of `estimated_size` bytes needs so that none
/// exceeds `max_partition_size`. Never less than one.
pub fn num_partitions(estimated_size: u64, max_partition_size: u64) -> u64 {
    estimated_size.div_ceil(max_partition_size.max(1)).max(1)
}

/// Plans the cut points of one target from its sampled statistic.
///
/// The sketch is queried at `i / n` for `i = 1 .. n - 1`. Keys that do not
/// strictly increase over the previous cut point are dropped, as is the empty
/// key (it is the open low end of the key space, not a usable split). Fewer
/// cut points than requested is therefore possible on skewed data.
pub fn plan_cut_points(
    target: TargetId,
    statistic: &SampleStatistic,
    max_partition_size: u64,
) -> Result<CutPoints> {
    let estimated_size = statistic.estimated_size();
    let n = num_partitions(estimated_size, max_partition_size);
    debug!(
        "target {target}: sampled {} rows, {} bytes, estimated size {estimated_size}, {n} partition(s)",
        statistic.sampled_rows(),
        statistic.sampled_bytes()
    );
    if n <= 1 {
        return Ok(CutPoints::empty(target));
    }
    let sketch = statistic.sketch();
    if sketch.is_empty() {
        return Err(Error::planning(
            target,
            format!("estimated size {estimated_size} with an empty key sketch"),
        ));
    }

    let fractions = (1..n).map(|i| i as f64 / n as f64).collect::<Vec<_>>();
    let mut keys: Vec<Vec<u8>> = Vec::with_capacity(fractions.len());
    for (fraction, key) in fractions.iter().zip(sketch.quantiles(&fractions)) {
        let key = key.ok_or_else(|| {
            Error::planning(target, format!("no quantile at {fraction}"))
        })?;
        if key.is_empty() || keys.last().is_some_and(|last| last.as_slice() >= key) {
            continue;
        }
        keys.push(key.to_vec());
    }
    if keys.len() + 1 < n as usize {
        debug!(
            "target {target}: {} of {} cut points left after deduplication",
            keys.len(),
            n - 1
        );
    }
    Ok(CutPoints { target, keys })
}

#[cfg(test)]
mod tests {
    use rangeload_sketch::QuantileSketchConfig;

    use super::*;
    use crate::row::EncodedRow;

    fn statistic(keys: impl IntoIterator<Item = Vec<u8>>, value_len: usize) -> SampleStatistic {
        let mut stat = SampleStatistic::new(1.0, QuantileSketchConfig::default());
        for key in keys {
            stat.add(&EncodedRow {
                target: 1,
                key,
                value: vec![0; value_len],
            });
        }
        stat
    }

    #[test]
    fn test_num_partitions() {
        assert_eq!(num_partitions(0, 100), 1);
        assert_eq!(num_partitions(100, 100), 1);
        assert_eq!(num_partitions(101, 100), 2);
        assert_eq!(num_partitions(400, 100), 4);
        let mut prev = 1;
        for size in (0..10_000).step_by(37) {
            let n = num_partitions(size, 250);
            assert!(n >= prev);
            prev = n;
        }
    }

    #[test]
    fn test_small_target_has_no_cut_points() {
        let stat = statistic((0u64..100).map(|i| i.to_be_bytes().to_vec()), 8);
        assert_eq!(stat.estimated_size(), 1600);
        assert!(plan_cut_points(1, &stat, 1600).unwrap().is_empty());
        assert!(plan_cut_points(1, &stat, u64::MAX).unwrap().is_empty());
        assert_eq!(plan_cut_points(1, &stat, 1599).unwrap().len(), 1);
    }

    #[test]
    fn test_uniform_cut_points() {
        let stat = statistic((0u64..1000).map(|i| i.to_be_bytes().to_vec()), 8);
        // 16 000 bytes into partitions of at most 4 000 bytes.
        let cut_points = plan_cut_points(1, &stat, 4000).unwrap();
        assert_eq!(cut_points.len(), 3);
        for (key, expected) in cut_points.keys.iter().zip([250u64, 500, 750]) {
            let actual = u64::from_be_bytes(key.as_slice().try_into().unwrap());
            assert!(actual.abs_diff(expected) <= 10, "{actual} vs {expected}");
        }
        assert!(cut_points.keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let keys = std::iter::repeat_n(b"same".to_vec(), 900)
            .chain((0..100u8).map(|i| vec![b'z', i]));
        let stat = statistic(keys, 0);
        let cut_points = plan_cut_points(1, &stat, 100).unwrap();
        assert!(!cut_points.is_empty());
        assert!(cut_points.len() < 9);
        assert!(cut_points.keys.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(cut_points.keys[0], b"same");
    }

    #[test]
    fn test_empty_key_is_not_a_cut_point() {
        let stat = statistic(std::iter::repeat_n(Vec::new(), 10).chain([b"a".to_vec()]), 100);
        let cut_points = plan_cut_points(1, &stat, 100).unwrap();
        assert!(cut_points.keys.iter().all(|k| !k.is_empty()));
    }

    #[test]
    fn test_printable_cut_points() {
        let cut_points = CutPoints {
            target: 3,
            keys: vec![vec![0x01, b'a'], b"k\\".to_vec()],
        };
        assert_eq!(cut_points.to_printable(), ["\\x01a", "k\\x5C"]);
        assert_eq!(cut_points.num_partitions(), 3);
    }
}
