//! Bad-record accounting.
//!
//! Rows that fail to encode, or whose key falls outside every partition of
//! their target, are bad records. In permissive mode they are counted with one
//! atomic counter and their descriptors are sent over a bounded channel to a
//! dedicated writer thread, which appends them as JSON lines to
//! `<root>/<bad_records_dir>/bad-<uuid>.ndjson`. Without a threshold the first
//! bad record fails the job with its original error.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::JoinHandle,
};

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{info, warn};
use rangeload_common::{Result, error::Error};
use rangeload_io::{BufferedSealingWrite, SealingWrite};
use rangeload_objectstore::{ObjectStore, url::ObjectUrl};
use serde::{Deserialize, Serialize};

use crate::schema::TargetId;

const CHANNEL_CAPACITY: usize = 1024;

/// Descriptor of one rejected row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadRecord {
    pub split: usize,
    pub ordinal: u64,
    /// Target whose key could not be routed, for out-of-range keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetId>,
    pub error: String,
}

/// Final state of the bad-record accounting of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadRecordSummary {
    pub count: u64,
    /// Detail file, present when at least one bad record was written.
    pub location: Option<ObjectUrl>,
}

pub struct BadRecordTracker {
    count: AtomicU64,
    threshold: Option<u64>,
    location: Option<ObjectUrl>,
    sender: Option<Sender<BadRecord>>,
    writer: Option<JoinHandle<Result<u64>>>,
}

impl BadRecordTracker {
    /// Tracker that fails on the first bad record.
    pub fn strict() -> BadRecordTracker {
        BadRecordTracker {
            count: AtomicU64::new(0),
            threshold: None,
            location: None,
            sender: None,
            writer: None,
        }
    }

    /// Tracker that tolerates up to `threshold` bad records and writes their
    /// descriptors into `directory`.
    pub fn permissive(
        threshold: u64,
        object_store: Arc<dyn ObjectStore>,
        directory: &ObjectUrl,
    ) -> Result<BadRecordTracker> {
        let file = format!("bad-{}.ndjson", uuid::Uuid::new_v4());
        let location = directory.join_segments(&[file.as_str()])?;
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        let writer_url = location.clone();
        let writer = std::thread::Builder::new()
            .name("rangeload-bad-records".to_string())
            .spawn(move || write_bad_records(object_store.as_ref(), &writer_url, receiver))
            .map_err(|e| Error::io("spawn bad record writer", e))?;
        Ok(BadRecordTracker {
            count: AtomicU64::new(0),
            threshold: Some(threshold),
            location: Some(location),
            sender: Some(sender),
            writer: Some(writer),
        })
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Accounts for one bad record. In strict mode `error` is returned as is.
    pub fn record(&self, record: BadRecord, error: Error) -> Result<()> {
        let Some(sender) = &self.sender else {
            return Err(error);
        };
        self.count.fetch_add(1, Ordering::AcqRel);
        if sender.send(record).is_err() {
            warn!("bad record writer stopped, descriptor dropped: {error}");
        }
        Ok(())
    }

    /// Fails once the count exceeds the threshold.
    pub fn check_threshold(&self) -> Result<()> {
        match self.threshold {
            Some(threshold) if self.count() > threshold => Err(Error::too_many_bad_records(
                self.count(),
                threshold,
                self.location.as_ref().map(|l| l.to_string()),
            )),
            _ => Ok(()),
        }
    }

    /// Closes the channel and waits for the writer thread.
    pub fn finish(mut self) -> Result<BadRecordSummary> {
        drop(self.sender.take());
        let written = match self.writer.take() {
            Some(writer) => writer
                .join()
                .map_err(|_| Error::invalid_operation("bad record writer panicked"))??,
            None => 0,
        };
        let count = self.count();
        if written != count {
            warn!("{count} bad record(s) counted, {written} written");
        }
        if count > 0 {
            info!("{count} bad record(s)");
        }
        Ok(BadRecordSummary {
            count,
            location: self.location.take().filter(|_| written > 0),
        })
    }
}

impl Drop for BadRecordTracker {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}

/// Writer thread body: drains `receiver` until every sender is gone. The file
/// is created with the first descriptor.
fn write_bad_records(
    object_store: &dyn ObjectStore,
    url: &ObjectUrl,
    receiver: Receiver<BadRecord>,
) -> Result<u64> {
    let io_err = |e: std::io::Error| Error::io(url.to_string(), e);
    let mut out: Option<BufferedSealingWrite<Box<dyn SealingWrite>>> = None;
    let mut written = 0u64;
    let mut line = Vec::new();
    for record in receiver {
        line.clear();
        serde_json::to_writer(&mut line, &record)
            .map_err(|e| Error::serialization("bad record", e))?;
        line.push(b'\n');
        if out.is_none() {
            let file = object_store.create(url).map_err(io_err)?;
            out = Some(BufferedSealingWrite::new(file));
        }
        if let Some(writer) = &mut out {
            writer.write_all(&line).map_err(io_err)?;
        }
        written += 1;
    }
    if let Some(mut writer) = out {
        writer.seal().map_err(io_err)?;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use rangeload_common::error::ErrorKind;
    use rangeload_objectstore::local_store::{LocalFsMode, LocalFsObjectStore};
    use tempfile::TempDir;

    use super::*;

    fn bad(ordinal: u64) -> BadRecord {
        BadRecord {
            split: 0,
            ordinal,
            target: None,
            error: "failed to encode column 'id'".to_string(),
        }
    }

    fn local_store(dir: &TempDir) -> (Arc<dyn ObjectStore>, ObjectUrl) {
        let store = LocalFsObjectStore::new(dir.path(), LocalFsMode::Passthrough).unwrap();
        let url = store.container_url().join_segments(&["_bad_records", ""]).unwrap();
        (Arc::new(store), url)
    }

    #[test]
    fn test_strict_returns_original_error() {
        let tracker = BadRecordTracker::strict();
        let err = tracker
            .record(bad(1), Error::encoding("id", "not a number"))
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Encoding { .. }));
        assert_eq!(tracker.count(), 0);
        assert_eq!(
            tracker.finish().unwrap(),
            BadRecordSummary {
                count: 0,
                location: None
            }
        );
    }

    #[test]
    fn test_permissive_writes_descriptors() {
        let dir = TempDir::new().unwrap();
        let (store, url) = local_store(&dir);
        let tracker = BadRecordTracker::permissive(2, store, &url).unwrap();
        std::thread::scope(|s| {
            for t in 0..3u64 {
                let tracker = &tracker;
                s.spawn(move || {
                    tracker
                        .record(bad(t), Error::encoding("id", "not a number"))
                        .unwrap()
                });
            }
        });
        assert_eq!(tracker.count(), 3);
        match tracker.check_threshold().unwrap_err().into_kind() {
            ErrorKind::TooManyBadRecords {
                count,
                threshold,
                location,
            } => {
                assert_eq!((count, threshold), (3, 2));
                assert!(location.unwrap().ends_with(".ndjson"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let summary = tracker.finish().unwrap();
        assert_eq!(summary.count, 3);
        let path = summary.location.unwrap().to_file_path().unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        let mut ordinals = content
            .lines()
            .map(|l| serde_json::from_str::<BadRecord>(l).unwrap().ordinal)
            .collect::<Vec<_>>();
        ordinals.sort_unstable();
        assert_eq!(ordinals, [0, 1, 2]);
    }

    #[test]
    fn test_no_file_without_bad_records() {
        let dir = TempDir::new().unwrap();
        let (store, url) = local_store(&dir);
        let tracker = BadRecordTracker::permissive(0, store, &url).unwrap();
        tracker.check_threshold().unwrap();
        let summary = tracker.finish().unwrap();
        assert_eq!(summary.count, 0);
        assert!(summary.location.is_none());
        assert!(!dir.path().join("_bad_records").exists());
    }
}
