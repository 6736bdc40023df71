//! Import orchestration.
//!
//! An import walks through the states
//!
//! ```text
//! Sampling -> Planning -> Splitting -> Shuffling -> SortingWriting -> Loading -> Done
//! ```
//!
//! with a barrier between consecutive states. Any failure moves the job to
//! `Failed`. `SkipSampling` enters at `Shuffling` with the partitions the store
//! already has; `PlanOnly` stops after `Planning`; `KeysOnly` encodes the rows
//! and writes key files without touching the store.

use std::{collections::BTreeMap, sync::Arc};

use log::{debug, error, info};
use rangeload_common::{Result, error::Error};
use rangeload_objectstore::{ObjectStore, local_store::LocalFsObjectStore, url::ObjectUrl};

use crate::{
    bad_records::{BadRecord, BadRecordTracker},
    codec::{DefaultValueCodec, ValueCodec},
    config::{ImportConfig, ImportMode},
    encoder::RowEncoder,
    loader::BulkLoader,
    output::{KeyFileWriter, key_file_url, write_cut_points},
    parallel::{CancellationToken, WorkerPool},
    planner::{CutPoints, plan_cut_points},
    resolver::PartitionResolver,
    row::EncodedRow,
    sampler::{Sampler, TargetStatistics, merge_statistics},
    schema::{TableSchema, Target, TargetId, TargetKind},
    shuffle::{BoundaryIndex, ShuffleOutput, ShufflePartitioner},
    sorter::sort_and_write,
    source::RowSource,
    store::{PartitionStore, SegmentRef},
    txn::TxnHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Sampling,
    Planning,
    Splitting,
    Shuffling,
    SortingWriting,
    Loading,
    Done,
    Failed,
}

impl std::fmt::Display for ImportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ImportState::Sampling => "SAMPLING",
            ImportState::Planning => "PLANNING",
            ImportState::Splitting => "SPLITTING",
            ImportState::Shuffling => "SHUFFLING",
            ImportState::SortingWriting => "SORTING_WRITING",
            ImportState::Loading => "LOADING",
            ImportState::Done => "DONE",
            ImportState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Result of a completed import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResult {
    /// Rows of the dataset committed to the primary table.
    pub rows_written: u64,
    pub bad_records: u64,
    /// Bad-record detail file, in permissive mode when bad records occurred.
    pub bad_records_location: Option<ObjectUrl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported(ImportResult),
    /// Plan-only mode: the cut points of every target, in target order.
    Planned(Vec<CutPoints>),
    /// Keys-only mode: the key files, in split order.
    KeysWritten(Vec<ObjectUrl>),
}

/// Counters of one run, for logging and inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// States visited, in order.
    pub states: Vec<ImportState>,
    pub sampled_rows: u64,
    /// Number of cut points per target.
    pub cut_points: BTreeMap<TargetId, usize>,
    pub split_targets: usize,
    pub boundaries: usize,
    pub buckets: usize,
    pub segments: usize,
    pub rows_read: u64,
    pub pairs_loaded: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub outcome: ImportOutcome,
    pub summary: ImportSummary,
}

impl ImportReport {
    pub fn result(&self) -> Option<&ImportResult> {
        match &self.outcome {
            ImportOutcome::Imported(result) => Some(result),
            _ => None,
        }
    }
}

/// Bulk importer of one table into a [`PartitionStore`].
pub struct Importer {
    config: ImportConfig,
    schema: TableSchema,
    codec: Arc<dyn ValueCodec>,
    store: Arc<dyn PartitionStore>,
    object_store: Arc<dyn ObjectStore>,
    output_root: ObjectUrl,
}

impl Importer {
    /// Creates an importer writing through the local file system.
    pub fn new(
        config: ImportConfig,
        schema: TableSchema,
        store: Arc<dyn PartitionStore>,
    ) -> Result<Importer> {
        config.validate()?;
        schema.validate()?;
        let output_root = ObjectUrl::container_from_location(&config.output_root)?;
        if output_root.scheme() != "file" {
            return Err(Error::invalid_arg(
                "output_root",
                format!("unsupported location {output_root}"),
            ));
        }
        Ok(Importer {
            config,
            schema,
            codec: Arc::new(DefaultValueCodec),
            store,
            object_store: Arc::new(LocalFsObjectStore::new_unscoped()?),
            output_root,
        })
    }

    pub fn with_codec(mut self, codec: Arc<dyn ValueCodec>) -> Importer {
        self.codec = codec;
        self
    }

    pub fn with_object_store(mut self, object_store: Arc<dyn ObjectStore>) -> Importer {
        self.object_store = object_store;
        self
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn output_root(&self) -> &ObjectUrl {
        &self.output_root
    }

    /// Runs the import of `source` under `txn`.
    pub fn run(&self, source: &dyn RowSource, txn: &TxnHandle) -> Result<ImportReport> {
        let encoder = RowEncoder::new(&self.schema, self.codec.clone())?;
        let mut job = ImportJob {
            importer: self,
            source,
            txn,
            encoder,
            pool: WorkerPool::new(self.config.parallelism)?,
            cancel: CancellationToken::new(),
            summary: ImportSummary::default(),
        };
        info!(
            "import of '{}' into {} target(s), mode {:?}, {} split(s) on {} worker(s), {txn}",
            self.schema.name,
            job.encoder.targets().len(),
            self.config.mode,
            source.num_splits(),
            job.pool.max_degree()
        );
        match job.execute() {
            Ok(outcome) => {
                job.transition(ImportState::Done);
                let summary = job.summary;
                info!("import done: {summary:?}");
                Ok(ImportReport { outcome, summary })
            }
            Err(e) => {
                let state = job.summary.states.last().copied();
                job.cancel.cancel();
                job.transition(ImportState::Failed);
                error!(
                    "import failed in state {}: {e}",
                    state.map_or_else(|| "INIT".to_string(), |s| s.to_string())
                );
                Err(e)
            }
        }
    }
}

struct ImportJob<'a> {
    importer: &'a Importer,
    source: &'a dyn RowSource,
    txn: &'a TxnHandle,
    encoder: RowEncoder,
    pool: WorkerPool,
    cancel: CancellationToken,
    summary: ImportSummary,
}

impl ImportJob<'_> {
    fn config(&self) -> &ImportConfig {
        &self.importer.config
    }

    fn transition(&mut self, state: ImportState) {
        match self.summary.states.last() {
            Some(prev) => info!("import: {prev} -> {state}"),
            None => info!("import: {state}"),
        }
        self.summary.states.push(state);
    }

    fn splits(&self) -> Vec<usize> {
        (0..self.source.num_splits()).collect()
    }

    fn execute(&mut self) -> Result<ImportOutcome> {
        match self.config().mode.clone() {
            ImportMode::KeysOnly { index } => return self.write_keys(index.as_deref()),
            ImportMode::SkipSampling => {}
            ImportMode::Full | ImportMode::PlanOnly => {
                self.transition(ImportState::Sampling);
                let statistics = self.sample()?;

                self.transition(ImportState::Planning);
                let cut_points = self.plan(&statistics)?;
                if self.config().mode == ImportMode::PlanOnly {
                    return Ok(ImportOutcome::Planned(cut_points));
                }

                self.transition(ImportState::Splitting);
                let resolver = PartitionResolver::new(
                    self.importer.store.as_ref(),
                    &self.importer.output_root,
                );
                self.summary.split_targets = resolver.split_all(&cut_points)?;
            }
        }
        let index = self.resolve_boundaries()?;

        self.transition(ImportState::Shuffling);
        let bad_records = self.bad_record_tracker()?;
        let partitioner = ShufflePartitioner::new(&index, self.config().tasks_per_partition);
        let shuffled = self.shuffle(&partitioner, &bad_records)?;
        bad_records.check_threshold()?;
        let bad_summary = bad_records.finish()?;

        self.transition(ImportState::SortingWriting);
        let segments = self.sort_and_write(&partitioner, &index, shuffled.buckets)?;

        self.transition(ImportState::Loading);
        let loader = BulkLoader::new(self.importer.store.as_ref(), &self.pool);
        self.summary.pairs_loaded = loader.load(segments, self.txn, &self.cancel)?;

        Ok(ImportOutcome::Imported(ImportResult {
            rows_written: shuffled.rows_accepted,
            bad_records: bad_summary.count,
            bad_records_location: bad_summary.location,
        }))
    }

    fn sample(&mut self) -> Result<TargetStatistics> {
        let sampler = Sampler::new(
            &self.encoder,
            self.config().sample_fraction,
            self.config().sample_seed,
        );
        let (source, txn, cancel) = (self.source, self.txn, &self.cancel);
        let partials = self
            .pool
            .try_map("sampling", self.splits(), cancel, |split| {
                sampler.sample_split(split, source.scan_split(split)?, txn, cancel)
            })?;
        let mut statistics = sampler.empty_statistics();
        for partial in &partials {
            merge_statistics(&mut statistics, partial)?;
        }
        self.summary.sampled_rows = statistics
            .get(&self.encoder.targets()[0].id)
            .map_or(0, |s| s.sampled_rows());
        Ok(statistics)
    }

    fn plan(&mut self, statistics: &TargetStatistics) -> Result<Vec<CutPoints>> {
        let mut all = Vec::with_capacity(self.encoder.targets().len());
        for target in self.encoder.targets() {
            let statistic = statistics
                .get(&target.id)
                .ok_or_else(|| Error::planning(target.id, "no statistics"))?;
            let cut_points = plan_cut_points(target.id, statistic, self.config().max_partition_size)?;
            let dump = write_cut_points(
                self.importer.object_store.as_ref(),
                &self.importer.output_root,
                &cut_points,
            )?;
            info!(
                "target {} ({}): estimated {} bytes, {} cut point(s) in {dump}",
                target.id,
                target.name,
                statistic.estimated_size(),
                cut_points.len()
            );
            self.summary.cut_points.insert(target.id, cut_points.len());
            all.push(cut_points);
        }
        Ok(all)
    }

    fn resolve_boundaries(&mut self) -> Result<BoundaryIndex> {
        let resolver =
            PartitionResolver::new(self.importer.store.as_ref(), &self.importer.output_root);
        let targets = self.encoder.targets().iter().map(|t| t.id).collect::<Vec<_>>();
        let boundaries = resolver.resolve(&targets)?;
        self.summary.boundaries = boundaries.len();
        debug!("{} partition boundaries", boundaries.len());
        Ok(BoundaryIndex::new(boundaries))
    }

    fn bad_record_tracker(&self) -> Result<BadRecordTracker> {
        match self.config().max_bad_records {
            None => Ok(BadRecordTracker::strict()),
            Some(threshold) => {
                let directory = self
                    .importer
                    .output_root
                    .join_segments(&[self.config().bad_records_dir.as_str(), ""])?;
                BadRecordTracker::permissive(
                    threshold,
                    self.importer.object_store.clone(),
                    &directory,
                )
            }
        }
    }

    fn shuffle(
        &mut self,
        partitioner: &ShufflePartitioner,
        bad_records: &BadRecordTracker,
    ) -> Result<ShuffleOutput> {
        let (source, txn, cancel, encoder) = (self.source, self.txn, &self.cancel, &self.encoder);
        let partials = self
            .pool
            .try_map("shuffling", self.splits(), cancel, |split| {
                partitioner.shuffle_split(
                    split,
                    source.scan_split(split)?,
                    encoder,
                    txn,
                    bad_records,
                    cancel,
                )
            })?;
        let mut merged = ShuffleOutput::default();
        for partial in partials {
            merged.append(partial);
        }
        self.summary.rows_read = merged.rows_read;
        self.summary.buckets = merged.buckets.len();
        info!(
            "shuffled {} row(s) into {} of {} bucket(s)",
            merged.rows_read,
            merged.buckets.len(),
            partitioner.num_buckets()
        );
        Ok(merged)
    }

    fn sort_and_write(
        &mut self,
        partitioner: &ShufflePartitioner,
        index: &BoundaryIndex,
        buckets: impl IntoIterator<Item = (usize, Vec<EncodedRow>)>,
    ) -> Result<Vec<(TargetId, SegmentRef)>> {
        let mut buckets = buckets.into_iter().collect::<Vec<_>>();
        buckets.sort_unstable_by_key(|(bucket, _)| *bucket);
        let (object_store, txn, cancel) =
            (self.importer.object_store.as_ref(), self.txn, &self.cancel);
        let segments = self
            .pool
            .try_map("sorting", buckets, cancel, |(bucket, rows)| {
                let (boundary, sub_task) = partitioner.split_bucket(bucket);
                let boundary = index.get(boundary);
                let segment = sort_and_write(object_store, boundary, sub_task, rows, txn)?;
                Ok((boundary.target, segment))
            })?;
        self.summary.segments = segments.len();
        Ok(segments)
    }

    /// Encodes every row and writes the keys of one target, one file per split.
    fn write_keys(&mut self, index_name: Option<&str>) -> Result<ImportOutcome> {
        let target = self.keys_target(index_name)?.clone();
        self.transition(ImportState::Shuffling);
        let bad_records = self.bad_record_tracker()?;
        let (source, txn, cancel, encoder) = (self.source, self.txn, &self.cancel, &self.encoder);
        let (object_store, root) = (
            self.importer.object_store.as_ref(),
            &self.importer.output_root,
        );
        let files = self
            .pool
            .try_map("writing keys", self.splits(), cancel, |split| {
                let url = key_file_url(root, target.id, split)?;
                let mut writer = KeyFileWriter::create(object_store, url)?;
                let mut pairs = Vec::new();
                for (i, row) in source.scan_split(split)?.enumerate() {
                    if i % 1024 == 0 {
                        cancel.check()?;
                    }
                    let row = row?;
                    pairs.clear();
                    if let Err(e) = encoder.encode_into(&row, txn, &mut pairs) {
                        let record = BadRecord {
                            split,
                            ordinal: row.ordinal,
                            target: None,
                            error: e.to_string(),
                        };
                        bad_records.record(record, e)?;
                        continue;
                    }
                    for pair in pairs.iter().filter(|p| p.target == target.id) {
                        writer.write_key(&pair.key)?;
                    }
                }
                let lines = writer.lines();
                let url = writer.finish()?;
                Ok((url, lines))
            })?;
        bad_records.check_threshold()?;
        bad_records.finish()?;
        let lines = files.iter().map(|(_, lines)| lines).sum::<u64>();
        info!(
            "wrote {lines} key(s) of target {} ({}) into {} file(s)",
            target.id,
            target.name,
            files.len()
        );
        Ok(ImportOutcome::KeysWritten(
            files.into_iter().map(|(url, _)| url).collect(),
        ))
    }

    fn keys_target(&self, index_name: Option<&str>) -> Result<&Target> {
        let targets = self.encoder.targets();
        match index_name {
            None => Ok(&targets[0]),
            Some(name) => targets
                .iter()
                .find(|t| t.kind == TargetKind::Index && t.name == name)
                .ok_or_else(|| {
                    Error::invalid_arg("index", format!("table has no index named '{name}'"))
                }),
        }
    }
}
