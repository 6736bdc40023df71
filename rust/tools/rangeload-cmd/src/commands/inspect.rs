//! Inspect-segment command implementation

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use rangeload::printable::to_printable;
use rangeload_io::file::FileReader;
use rangeload_segment::{SegmentFooter, SegmentReader};
use serde::Serialize;

#[derive(Serialize)]
struct SegmentInfo {
    path: String,
    target_id: u64,
    txn_id: u64,
    record_count: u64,
    first_key: String,
    last_key: String,
    data_len: u64,
    data_checksum: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    records: Vec<RecordInfo>,
}

#[derive(Serialize)]
struct RecordInfo {
    key: String,
    value: String,
}

/// Run the inspect-segment command
pub fn run(verbose: u8, path: PathBuf) -> Result<()> {
    let file = FileReader::open(&path)
        .with_context(|| format!("Failed to open segment {}", path.display()))?;
    let reader = SegmentReader::open(Arc::new(file)).context("Failed to read segment footer")?;
    reader.verify().context("Segment verification failed")?;

    let mut records = Vec::new();
    if verbose > 0 {
        for record in reader.records()? {
            let (key, value) = record?;
            records.push(RecordInfo {
                key: to_printable(&key),
                value: to_printable(&value),
            });
        }
    }
    let info = segment_info(&path, reader.footer(), records);
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn segment_info(path: &std::path::Path, footer: &SegmentFooter, records: Vec<RecordInfo>) -> SegmentInfo {
    SegmentInfo {
        path: path.display().to_string(),
        target_id: footer.target_id,
        txn_id: footer.txn_id,
        record_count: footer.record_count,
        first_key: to_printable(&footer.first_key),
        last_key: to_printable(&footer.last_key),
        data_len: footer.data_len,
        data_checksum: format!("{:016x}", footer.data_checksum),
        records,
    }
}
