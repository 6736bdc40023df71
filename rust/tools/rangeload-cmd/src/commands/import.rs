//! Import command implementation

use anyhow::{Context, Result};
use rangeload::{ImportMode, ImportReport, PartitionStore, TxnHandle, schema::TargetId};
use serde::Serialize;

use crate::{JobArgs, commands::prepare_job};

#[derive(Serialize)]
struct ImportInfo {
    txn: u64,
    rows_written: u64,
    bad_records: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    bad_records_location: Option<String>,
    states: Vec<String>,
    rows_read: u64,
    boundaries: usize,
    segments: usize,
    pairs_loaded: u64,
    targets: Vec<TargetInfo>,
}

#[derive(Serialize)]
struct TargetInfo {
    id: TargetId,
    partitions: usize,
    rows: u64,
}

/// Run the import command
pub fn run(args: JobArgs, txn: Option<u64>, skip_sampling: bool) -> Result<()> {
    let mode = if skip_sampling {
        ImportMode::SkipSampling
    } else {
        ImportMode::Full
    };
    let job = prepare_job(args, mode)?;
    let txn = TxnHandle::new(txn.unwrap_or_else(|| uuid::Uuid::new_v4().as_u64_pair().0));

    let report = job
        .importer
        .run(&job.source, &txn)
        .context("Import failed")?;

    let mut targets = Vec::new();
    for target in job.schema.targets()? {
        targets.push(TargetInfo {
            id: target.id,
            partitions: job.store.list_partitions(target.id)?.len(),
            rows: job.store.row_count(target.id)?,
        });
    }
    let info = import_info(&report, txn.id(), targets)?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn import_info(report: &ImportReport, txn: u64, targets: Vec<TargetInfo>) -> Result<ImportInfo> {
    let result = report
        .result()
        .context("The import did not produce a result")?;
    let summary = &report.summary;
    Ok(ImportInfo {
        txn,
        rows_written: result.rows_written,
        bad_records: result.bad_records,
        bad_records_location: result.bad_records_location.as_ref().map(|u| u.to_string()),
        states: summary.states.iter().map(|s| s.to_string()).collect(),
        rows_read: summary.rows_read,
        boundaries: summary.boundaries,
        segments: summary.segments,
        pairs_loaded: summary.pairs_loaded,
        targets,
    })
}
