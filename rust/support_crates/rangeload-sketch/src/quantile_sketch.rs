//! Mergeable quantile sketch over byte-string keys.
//!
//! The sketch retains the `capacity` distinct keys with the smallest
//! `(hash, key)` rank, each with an exact occurrence count. A key that is
//! evicted can never re-enter (the retention threshold only decreases), so a
//! retained key's count covers all of its occurrences. Merging is a union with
//! summed counts followed by the same trim, which makes the result independent
//! of how the input was partitioned and of the merge order.
//!
//! Quantiles are answered from the retained keys in byte order, weighted by
//! their counts. The total count, minimum and maximum are always exact. Below
//! `capacity` distinct keys the sketch is exact.

use std::collections::BTreeMap;

use crate::config::QuantileSketchConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantileSketch {
    config: QuantileSketchConfig,
    retained: BTreeMap<(u64, Vec<u8>), u64>,
    count: u64,
    min: Option<Vec<u8>>,
    max: Option<Vec<u8>>,
}

impl Default for QuantileSketch {
    fn default() -> Self {
        Self::new(QuantileSketchConfig::default())
    }
}

impl QuantileSketch {
    pub fn new(config: QuantileSketchConfig) -> QuantileSketch {
        QuantileSketch {
            config,
            retained: BTreeMap::new(),
            count: 0,
            min: None,
            max: None,
        }
    }

    pub fn config(&self) -> &QuantileSketchConfig {
        &self.config
    }

    /// Total number of inserted keys, duplicates included.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of distinct keys currently retained.
    pub fn retained_len(&self) -> usize {
        self.retained.len()
    }

    /// Returns `true` while no key has been evicted, i.e. quantiles are exact.
    pub fn is_exact(&self) -> bool {
        self.retained.len() < self.config.capacity
    }

    pub fn min(&self) -> Option<&[u8]> {
        self.min.as_deref()
    }

    pub fn max(&self) -> Option<&[u8]> {
        self.max.as_deref()
    }

    /// Adds a key to the sketch.
    #[inline]
    pub fn insert(&mut self, key: &[u8]) {
        let hash = xxhash_rust::xxh3::xxh3_64_with_seed(key, self.config.hash_seed);
        self.add_retained(hash, key, 1);
        self.count += 1;
        self.update_bounds(Some(key), Some(key));
    }

    /// Merges another sketch into this one.
    pub fn merge_from(&mut self, other: &QuantileSketch) -> std::io::Result<()> {
        if let Err(error_msg) = self.config.is_compatible_for_merge(&other.config) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                error_msg,
            ));
        }
        for ((hash, key), &weight) in &other.retained {
            self.add_retained(*hash, key, weight);
        }
        self.count += other.count;
        self.update_bounds(other.min(), other.max());
        Ok(())
    }

    /// Returns the key at quantile `q` (clamped to `[0, 1]`), or `None` for an
    /// empty sketch. `q = 0` yields the minimum and `q = 1` the maximum.
    pub fn quantile(&self, q: f64) -> Option<&[u8]> {
        self.quantiles(&[q]).pop().flatten()
    }

    /// Batch form of [`quantile`](Self::quantile); the retained keys are
    /// ordered once for all requested fractions.
    pub fn quantiles(&self, fractions: &[f64]) -> Vec<Option<&[u8]>> {
        if self.is_empty() {
            return vec![None; fractions.len()];
        }

        let mut sorted = self
            .retained
            .iter()
            .map(|((_, key), &weight)| (key.as_slice(), weight))
            .collect::<Vec<_>>();
        sorted.sort_unstable_by(|a, b| a.0.cmp(b.0));
        let total = sorted.iter().map(|&(_, weight)| weight).sum::<u64>() as f64;

        fractions
            .iter()
            .map(|&q| {
                if q.is_nan() || q <= 0.0 {
                    return self.min();
                }
                if q >= 1.0 {
                    return self.max();
                }
                let target = q * total;
                let mut cumulative = 0u64;
                for &(key, weight) in &sorted {
                    cumulative += weight;
                    if cumulative as f64 >= target {
                        return Some(key);
                    }
                }
                self.max()
            })
            .collect()
    }

    fn add_retained(&mut self, hash: u64, key: &[u8], weight: u64) {
        if self.retained.len() >= self.config.capacity {
            if let Some(((last_hash, last_key), _)) = self.retained.last_key_value() {
                if (hash, key) > (*last_hash, last_key.as_slice()) {
                    return;
                }
            }
        }
        *self.retained.entry((hash, key.to_vec())).or_insert(0) += weight;
        while self.retained.len() > self.config.capacity {
            self.retained.pop_last();
        }
    }

    fn update_bounds(&mut self, min: Option<&[u8]>, max: Option<&[u8]>) {
        if let Some(min) = min {
            if self.min.as_deref().is_none_or(|current| min < current) {
                self.min = Some(min.to_vec());
            }
        }
        if let Some(max) = max {
            if self.max.as_deref().is_none_or(|current| max > current) {
                self.max = Some(max.to_vec());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: u64) -> [u8; 8] {
        i.to_be_bytes()
    }

    #[test]
    fn test_empty_sketch() {
        let sketch = QuantileSketch::default();
        assert!(sketch.is_empty());
        assert_eq!(sketch.quantile(0.5), None);
        assert_eq!(sketch.quantiles(&[0.1, 0.9]), vec![None, None]);
    }

    #[test]
    fn test_exact_quantiles_below_capacity() {
        let mut sketch = QuantileSketch::default();
        for i in (0..1000u64).rev() {
            sketch.insert(&key(i));
        }
        assert!(sketch.is_exact());
        assert_eq!(sketch.count(), 1000);
        assert_eq!(sketch.quantile(0.0), Some(&key(0)[..]));
        assert_eq!(sketch.quantile(1.0), Some(&key(999)[..]));
        assert_eq!(sketch.quantile(0.25), Some(&key(249)[..]));
        assert_eq!(sketch.quantile(0.5), Some(&key(499)[..]));
        assert_eq!(sketch.quantile(0.75), Some(&key(749)[..]));
    }

    #[test]
    fn test_duplicates_are_weighted() {
        let mut sketch = QuantileSketch::default();
        for _ in 0..90 {
            sketch.insert(b"a");
        }
        for _ in 0..10 {
            sketch.insert(b"z");
        }
        assert_eq!(sketch.retained_len(), 2);
        assert_eq!(sketch.quantile(0.5), Some(&b"a"[..]));
        assert_eq!(sketch.quantile(0.95), Some(&b"z"[..]));
    }

    #[test]
    fn test_capacity_bound() {
        let config = QuantileSketchConfig::with_capacity(16).unwrap();
        let mut sketch = QuantileSketch::new(config);
        for i in 0..1000u64 {
            sketch.insert(&key(i));
        }
        assert_eq!(sketch.retained_len(), 16);
        assert!(!sketch.is_exact());
        assert_eq!(sketch.min(), Some(&key(0)[..]));
        assert_eq!(sketch.max(), Some(&key(999)[..]));
    }

    #[test]
    fn test_merge_incompatible() {
        let mut a = QuantileSketch::default();
        let b = QuantileSketch::new(QuantileSketchConfig::with_capacity(32).unwrap());
        let err = a.merge_from(&b).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }
}
