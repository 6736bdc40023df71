/// Default number of distinct keys retained by a sketch.
const DEFAULT_SKETCH_CAPACITY: usize = 4096;

const MIN_SKETCH_CAPACITY: usize = 16;

const MAX_SKETCH_CAPACITY: usize = 1 << 20;

/// Seed for the XXH3-64 hash that ranks keys for retention.
/// Represents "RngLdQS1" in hex.
const QUANTILE_SKETCH_HASH_SEED: u64 = 0x526e_674c_6451_5331;

/// Configuration of a [`QuantileSketch`](crate::QuantileSketch).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantileSketchConfig {
    /// Maximum number of distinct keys retained by the sketch.
    pub capacity: usize,

    /// Seed of the hash used to rank keys.
    pub hash_seed: u64,
}

impl Default for QuantileSketchConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_SKETCH_CAPACITY,
            hash_seed: QUANTILE_SKETCH_HASH_SEED,
        }
    }
}

impl QuantileSketchConfig {
    /// Creates a config with the default seed and the given capacity.
    pub fn with_capacity(capacity: usize) -> Result<Self, String> {
        Self::with_all_parameters(capacity, QUANTILE_SKETCH_HASH_SEED)
    }

    pub fn with_all_parameters(capacity: usize, hash_seed: u64) -> Result<Self, String> {
        let config = Self {
            capacity,
            hash_seed,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if !(MIN_SKETCH_CAPACITY..=MAX_SKETCH_CAPACITY).contains(&self.capacity) {
            return Err(format!(
                "capacity must be between {MIN_SKETCH_CAPACITY} and {MAX_SKETCH_CAPACITY}, got {}",
                self.capacity
            ));
        }
        Ok(())
    }

    /// Two sketches can be merged only when they rank keys identically.
    pub fn is_compatible_for_merge(&self, other: &QuantileSketchConfig) -> Result<(), String> {
        if self.capacity != other.capacity {
            return Err(format!(
                "Incompatible capacity: {} vs {}",
                self.capacity, other.capacity
            ));
        }
        if self.hash_seed != other.hash_seed {
            return Err(format!(
                "Incompatible hash_seed: {:#x} vs {:#x}",
                self.hash_seed, other.hash_seed
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::QuantileSketchConfig;

    #[test]
    fn test_config_validation() {
        assert!(QuantileSketchConfig::with_capacity(4).is_err());
        assert!(QuantileSketchConfig::with_capacity(1 << 21).is_err());
        let config = QuantileSketchConfig::with_capacity(64).unwrap();
        assert_eq!(config.hash_seed, QuantileSketchConfig::default().hash_seed);
    }

    #[test]
    fn test_merge_compatibility() {
        let a = QuantileSketchConfig::default();
        let b = QuantileSketchConfig::with_capacity(128).unwrap();
        let c = QuantileSketchConfig::with_all_parameters(a.capacity, 7).unwrap();
        assert!(a.is_compatible_for_merge(&a.clone()).is_ok());
        assert!(a.is_compatible_for_merge(&b).unwrap_err().contains("capacity"));
        assert!(a.is_compatible_for_merge(&c).unwrap_err().contains("hash_seed"));
    }
}
