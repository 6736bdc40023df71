//! Sampling pass and per-target statistics.

use std::collections::BTreeMap;

use log::debug;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rangeload_common::{Result, error::Error};
use rangeload_sketch::{QuantileSketch, QuantileSketchConfig};

use crate::{
    encoder::RowEncoder,
    parallel::CancellationToken,
    row::{EncodedRow, Row},
    schema::TargetId,
    txn::TxnHandle,
};

/// Size estimate and key distribution of one target, built from a sample.
///
/// Partial statistics produced by independent sampling tasks are combined with
/// [`merge_from`](Self::merge_from), which is associative and commutative; an
/// empty statistic is its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleStatistic {
    sample_fraction: f64,
    sampled_rows: u64,
    sampled_bytes: u64,
    sketch: QuantileSketch,
}

impl SampleStatistic {
    pub fn new(sample_fraction: f64, sketch_config: QuantileSketchConfig) -> SampleStatistic {
        SampleStatistic {
            sample_fraction,
            sampled_rows: 0,
            sampled_bytes: 0,
            sketch: QuantileSketch::new(sketch_config),
        }
    }

    pub fn add(&mut self, row: &EncodedRow) {
        self.sampled_rows += 1;
        self.sampled_bytes += row.byte_size();
        self.sketch.insert(&row.key);
    }

    pub fn merge_from(&mut self, other: &SampleStatistic) -> Result<()> {
        if self.sample_fraction != other.sample_fraction {
            return Err(Error::invalid_arg(
                "sample_fraction",
                format!(
                    "cannot merge statistics sampled at {} and {}",
                    self.sample_fraction, other.sample_fraction
                ),
            ));
        }
        self.sketch
            .merge_from(&other.sketch)
            .map_err(|e| Error::io("merge quantile sketch", e))?;
        self.sampled_rows += other.sampled_rows;
        self.sampled_bytes += other.sampled_bytes;
        Ok(())
    }

    pub fn sampled_rows(&self) -> u64 {
        self.sampled_rows
    }

    pub fn sampled_bytes(&self) -> u64 {
        self.sampled_bytes
    }

    pub fn sample_fraction(&self) -> f64 {
        self.sample_fraction
    }

    /// Extrapolated total size of the target: `sampled_bytes / sample_fraction`.
    ///
    /// This is the only place where the sample fraction is applied.
    pub fn estimated_size(&self) -> u64 {
        (self.sampled_bytes as f64 / self.sample_fraction).ceil() as u64
    }

    pub fn sketch(&self) -> &QuantileSketch {
        &self.sketch
    }
}

/// Statistics of every target, keyed by target id.
pub type TargetStatistics = BTreeMap<TargetId, SampleStatistic>;

/// Merges `other` into `into`, target by target.
pub fn merge_statistics(into: &mut TargetStatistics, other: &TargetStatistics) -> Result<()> {
    for (target, stat) in other {
        match into.get_mut(target) {
            Some(existing) => existing.merge_from(stat)?,
            None => {
                into.insert(*target, stat.clone());
            }
        }
    }
    Ok(())
}

/// Draws a Bernoulli sample of rows and collects per-target statistics.
///
/// Rows that fail to encode are skipped; the sampling pass does not count bad
/// records, the full pass does.
pub struct Sampler<'a> {
    encoder: &'a RowEncoder,
    sample_fraction: f64,
    seed: Option<u64>,
    sketch_config: QuantileSketchConfig,
}

impl<'a> Sampler<'a> {
    pub fn new(encoder: &'a RowEncoder, sample_fraction: f64, seed: Option<u64>) -> Sampler<'a> {
        Sampler {
            encoder,
            sample_fraction,
            seed,
            sketch_config: QuantileSketchConfig::default(),
        }
    }

    pub fn with_sketch_config(mut self, config: QuantileSketchConfig) -> Sampler<'a> {
        self.sketch_config = config;
        self
    }

    /// Empty statistics for every target.
    pub fn empty_statistics(&self) -> TargetStatistics {
        self.encoder
            .targets()
            .iter()
            .map(|t| {
                (
                    t.id,
                    SampleStatistic::new(self.sample_fraction, self.sketch_config.clone()),
                )
            })
            .collect()
    }

    /// Samples the rows of one split. With a fixed seed, the selection of each
    /// split is deterministic.
    pub fn sample_split(
        &self,
        split: usize,
        rows: impl Iterator<Item = Result<Row>>,
        txn: &TxnHandle,
        cancel: &CancellationToken,
    ) -> Result<TargetStatistics> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(split as u64)),
            None => StdRng::from_os_rng(),
        };
        let mut stats = self.empty_statistics();
        let mut pairs = Vec::new();
        for (i, row) in rows.enumerate() {
            if i % 1024 == 0 {
                cancel.check()?;
            }
            let row = row?;
            if !rng.random_bool(self.sample_fraction) {
                continue;
            }
            pairs.clear();
            if let Err(e) = self.encoder.encode_into(&row, txn, &mut pairs) {
                debug!("sampling: skipping row {} of split {split}: {e}", row.ordinal);
                continue;
            }
            for pair in &pairs {
                if let Some(stat) = stats.get_mut(&pair.target) {
                    stat.add(pair);
                }
            }
        }
        Ok(stats)
    }
}
