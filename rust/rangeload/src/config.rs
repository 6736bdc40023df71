//! Import job configuration.

use std::path::Path;

use rangeload_common::{Result, error::Error, verify_arg};
use serde::{Deserialize, Serialize};

/// Default fraction of rows drawn by the sampling pass.
pub const DEFAULT_SAMPLE_FRACTION: f64 = 0.005;

/// Default maximum partition size: half of a 10 GiB region, leaving room for
/// growth after the initial load.
pub const DEFAULT_MAX_PARTITION_SIZE: u64 = 5 * 1024 * 1024 * 1024;

pub const DEFAULT_BAD_RECORDS_DIR: &str = "_bad_records";

/// What an import run does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Sample, plan, split, shuffle, write and load.
    #[default]
    Full,
    /// Stop after planning and report the cut points; the store is not touched.
    PlanOnly,
    /// Use the partitions that already exist in the store.
    SkipSampling,
    /// Write the keys of one target (an index by name, or the primary table)
    /// to key files, without splitting or loading.
    KeysOnly { index: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Per-row inclusion probability of the sampling pass, in `(0, 1]`.
    pub sample_fraction: f64,
    /// Upper bound for the estimated size of a planned partition, in bytes.
    pub max_partition_size: u64,
    /// Number of sort/write tasks per partition.
    pub tasks_per_partition: usize,
    /// Permissive mode threshold. `None` fails the job on the first bad record.
    pub max_bad_records: Option<u64>,
    /// Directory or URL that receives segments, cut points and bad records.
    pub output_root: String,
    pub mode: ImportMode,
    /// Worker threads; `None` uses all available cores.
    pub parallelism: Option<usize>,
    /// Seed of the sampling pass; `None` draws one from the OS.
    pub sample_seed: Option<u64>,
    /// Name of the bad-record directory under `output_root`.
    pub bad_records_dir: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            sample_fraction: DEFAULT_SAMPLE_FRACTION,
            max_partition_size: DEFAULT_MAX_PARTITION_SIZE,
            tasks_per_partition: 1,
            max_bad_records: None,
            output_root: String::new(),
            mode: ImportMode::Full,
            parallelism: None,
            sample_seed: None,
            bad_records_dir: DEFAULT_BAD_RECORDS_DIR.to_string(),
        }
    }
}

impl ImportConfig {
    pub fn new(output_root: impl Into<String>) -> ImportConfig {
        ImportConfig {
            output_root: output_root.into(),
            ..Default::default()
        }
    }

    /// Parses a configuration. Missing fields take their defaults; the result
    /// is not validated, so callers may still override fields (typically
    /// `output_root`) before [`validate`](Self::validate) runs.
    pub fn from_json(json: &str) -> Result<ImportConfig> {
        serde_json::from_str(json).map_err(|e| Error::serialization("import config", e))
    }

    pub fn load(path: &Path) -> Result<ImportConfig> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::io(path.display().to_string(), e))?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        verify_arg!(
            sample_fraction,
            self.sample_fraction > 0.0 && self.sample_fraction <= 1.0
        );
        verify_arg!(max_partition_size, self.max_partition_size > 0);
        verify_arg!(tasks_per_partition, self.tasks_per_partition >= 1);
        verify_arg!(output_root, !self.output_root.trim().is_empty());
        verify_arg!(parallelism, self.parallelism.is_none_or(|p| p >= 1));
        verify_arg!(
            bad_records_dir,
            !self.bad_records_dir.is_empty() && !self.bad_records_dir.contains('/')
        );
        Ok(())
    }
}
