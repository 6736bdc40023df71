//! Directory-backed [`PartitionStore`].
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<target_id>/catalog.json    partitions and committed segments
//! <root>/<target_id>/data/<id>.seg   committed segment files
//! ```
//!
//! A target exists once [`LocalRangeStore::ensure_target`] created its catalog
//! with a single partition covering the whole key space.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use log::{debug, info, warn};
use rangeload_common::{Result, error::Error};
use rangeload_io::file::FileReader;
use rangeload_segment::SegmentReader;
use serde::{Deserialize, Serialize};

use crate::{
    schema::TargetId,
    store::{KeyRange, PartitionStore, SegmentRef},
    txn::TxnHandle,
};

const CATALOG_FILE: &str = "catalog.json";
const DATA_DIR: &str = "data";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Catalog {
    /// Sorted by start key, contiguous, covering the key space.
    partitions: Vec<KeyRange>,
    segments: Vec<CommittedSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommittedSegment {
    file: String,
    boundary: KeyRange,
    record_count: u64,
    txn_id: u64,
}

pub struct LocalRangeStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl LocalRangeStore {
    pub fn open(root: &Path) -> Result<LocalRangeStore> {
        std::fs::create_dir_all(root).map_err(|e| Error::io(root.display().to_string(), e))?;
        Ok(LocalRangeStore {
            root: root.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the catalog of `target` unless it exists.
    pub fn ensure_target(&self, target: TargetId) -> Result<()> {
        let _guard = self.lock()?;
        if self.catalog_path(target).exists() {
            return Ok(());
        }
        let catalog = Catalog {
            partitions: vec![KeyRange::full()],
            segments: Vec::new(),
        };
        self.save_catalog(target, &catalog)
    }

    pub fn has_target(&self, target: TargetId) -> bool {
        self.catalog_path(target).exists()
    }

    /// Every committed row of `target`, sorted by key. Rows with equal keys
    /// keep the order in which their segments were committed.
    pub fn scan(&self, target: TargetId) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let catalog = {
            let _guard = self.lock()?;
            self.load_catalog(target)?
        };
        let mut rows = Vec::new();
        for segment in &catalog.segments {
            let path = self.data_dir(target).join(&segment.file);
            let reader = open_segment(&path)?;
            for record in reader.records()? {
                let (key, value) = record?;
                rows.push((key.to_vec(), value.to_vec()));
            }
        }
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }

    /// Number of committed rows of `target`.
    pub fn row_count(&self, target: TargetId) -> Result<u64> {
        let _guard = self.lock()?;
        let catalog = self.load_catalog(target)?;
        Ok(catalog.segments.iter().map(|s| s.record_count).sum())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| Error::invalid_operation("local store lock poisoned"))
    }

    fn target_dir(&self, target: TargetId) -> PathBuf {
        self.root.join(target.to_string())
    }

    fn data_dir(&self, target: TargetId) -> PathBuf {
        self.target_dir(target).join(DATA_DIR)
    }

    fn catalog_path(&self, target: TargetId) -> PathBuf {
        self.target_dir(target).join(CATALOG_FILE)
    }

    fn load_catalog(&self, target: TargetId) -> Result<Catalog> {
        let path = self.catalog_path(target);
        let json = match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::store("catalog", target, "unknown target"));
            }
            Err(e) => return Err(Error::io(path.display().to_string(), e)),
        };
        serde_json::from_str(&json).map_err(|e| Error::serialization("partition catalog", e))
    }

    fn save_catalog(&self, target: TargetId, catalog: &Catalog) -> Result<()> {
        let dir = self.target_dir(target);
        std::fs::create_dir_all(&dir).map_err(|e| Error::io(dir.display().to_string(), e))?;
        let json = serde_json::to_vec_pretty(catalog)
            .map_err(|e| Error::serialization("partition catalog", e))?;
        let path = self.catalog_path(target);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| Error::io(tmp.display().to_string(), e))?;
        std::fs::rename(&tmp, &path).map_err(|e| Error::io(path.display().to_string(), e))
    }

    fn check_segment(
        &self,
        target: TargetId,
        catalog: &Catalog,
        segment: &SegmentRef,
        txn: &TxnHandle,
    ) -> Result<PathBuf> {
        let url = segment.url.as_str();
        let fail = |message: String| Error::load(target, url, message);
        let path = segment
            .url
            .to_file_path()
            .map_err(|()| fail("not a local file url".to_string()))?;
        if !catalog.partitions.contains(&segment.boundary) {
            return Err(fail(format!(
                "{} is not a partition of the target",
                segment.boundary
            )));
        }
        let reader = open_segment(&path).map_err(|e| fail(e.to_string()))?;
        reader.verify().map_err(|e| fail(e.to_string()))?;
        let footer = reader.footer();
        if footer.target_id != target {
            return Err(fail(format!("segment belongs to target {}", footer.target_id)));
        }
        if footer.txn_id != txn.id() {
            return Err(fail(format!(
                "segment was written by txn-{}, loading {txn}",
                footer.txn_id
            )));
        }
        if footer.record_count != segment.record_count {
            return Err(fail(format!(
                "segment holds {} records, {} expected",
                footer.record_count, segment.record_count
            )));
        }
        if !footer.is_empty()
            && !(segment.boundary.contains(&footer.first_key)
                && segment.boundary.contains(&footer.last_key))
        {
            return Err(fail(format!(
                "segment keys fall outside of {}",
                segment.boundary
            )));
        }
        Ok(path)
    }
}

impl PartitionStore for LocalRangeStore {
    fn split(&self, target: TargetId, keys: &[Vec<u8>]) -> Result<()> {
        let _guard = self.lock()?;
        let mut catalog = self.load_catalog(target)?;
        let mut added = 0usize;
        for key in keys {
            if key.is_empty() {
                continue;
            }
            let pos = catalog
                .partitions
                .iter()
                .position(|p| p.contains(key))
                .ok_or_else(|| Error::store("split", target, "catalog does not cover the key"))?;
            let partition = &mut catalog.partitions[pos];
            if partition.start == *key {
                continue;
            }
            let upper = KeyRange::new(key.clone(), std::mem::replace(&mut partition.end, key.clone()));
            catalog.partitions.insert(pos + 1, upper);
            added += 1;
        }
        debug!(
            "target {target}: split at {} key(s), {added} new partition(s), {} total",
            keys.len(),
            catalog.partitions.len()
        );
        self.save_catalog(target, &catalog)
    }

    fn list_partitions(&self, target: TargetId) -> Result<Vec<KeyRange>> {
        let _guard = self.lock()?;
        Ok(self.load_catalog(target)?.partitions)
    }

    /// All segments are verified before any of them is committed; a single
    /// invalid segment rejects the whole call.
    fn load_segments(
        &self,
        target: TargetId,
        segments: &[SegmentRef],
        txn: &TxnHandle,
    ) -> Result<()> {
        let _guard = self.lock()?;
        let mut catalog = self.load_catalog(target)?;
        let paths = segments
            .iter()
            .map(|segment| self.check_segment(target, &catalog, segment, txn))
            .collect::<Result<Vec<_>>>()?;

        let mut moved = Vec::with_capacity(segments.len());
        if let Err(e) = self.commit_segments(target, &mut catalog, segments, paths, txn, &mut moved)
        {
            restore_segments(target, &moved);
            return Err(e);
        }
        let partitions = segments
            .iter()
            .map(|s| s.boundary.start.as_slice())
            .collect::<BTreeSet<_>>();
        info!(
            "target {target}: committed {} segment(s) into {} partition(s) under {txn}",
            segments.len(),
            partitions.len()
        );
        Ok(())
    }
}

impl LocalRangeStore {
    /// Moves the segment files into the data directory and saves the catalog.
    /// Every completed move is recorded in `moved` as `(source, destination)`.
    fn commit_segments(
        &self,
        target: TargetId,
        catalog: &mut Catalog,
        segments: &[SegmentRef],
        paths: Vec<PathBuf>,
        txn: &TxnHandle,
        moved: &mut Vec<(PathBuf, PathBuf)>,
    ) -> Result<()> {
        let data_dir = self.data_dir(target);
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| Error::io(data_dir.display().to_string(), e))?;
        for (segment, path) in segments.iter().zip(paths) {
            let file = format!("{}.seg", uuid::Uuid::new_v4());
            let dest = data_dir.join(&file);
            std::fs::rename(&path, &dest)
                .map_err(|e| Error::load(target, segment.url.as_str(), e.to_string()))?;
            moved.push((path, dest));
            catalog.segments.push(CommittedSegment {
                file,
                boundary: segment.boundary.clone(),
                record_count: segment.record_count,
                txn_id: txn.id(),
            });
        }
        self.save_catalog(target, catalog)
    }
}

/// Moves the files of a failed load back to where the caller left them.
fn restore_segments(target: TargetId, moved: &[(PathBuf, PathBuf)]) {
    for (source, dest) in moved.iter().rev() {
        if let Err(e) = std::fs::rename(dest, source) {
            warn!(
                "target {target}: failed to move {} back to {}: {e}",
                dest.display(),
                source.display()
            );
        }
    }
}

fn open_segment(path: &Path) -> Result<SegmentReader> {
    let file = FileReader::open(path).map_err(|e| Error::io(path.display().to_string(), e))?;
    SegmentReader::open(Arc::new(file))
}
