//! Synthetic schemas and rows.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use rangeload::{ColumnDef, ColumnType, IndexDef, TableSchema, TargetId, Value};

pub const USERS_TABLE: TargetId = 10;
pub const USERS_BY_NAME: TargetId = 11;
pub const USERS_BY_AGE: TargetId = 12;

/// `users(id INT64 NOT NULL PRIMARY KEY, name UTF8, age INT64)` with a
/// non-unique `by_name` index and a descending `by_age` index.
pub fn users_schema() -> TableSchema {
    TableSchema::new(
        USERS_TABLE,
        "users",
        vec![
            ColumnDef::new("id", ColumnType::Int64).not_null(),
            ColumnDef::new("name", ColumnType::Utf8),
            ColumnDef::new("age", ColumnType::Int64),
        ],
    )
    .with_primary_key(&["id"])
    .with_index(IndexDef::new(USERS_BY_NAME, "by_name", &["name"]))
    .with_index(IndexDef::new(USERS_BY_AGE, "by_age", &["age"]).descending("age"))
}

pub const EVENTS_TABLE: TargetId = 20;

/// `events(payload UTF8)` without a primary key: the keys are the 8-byte
/// big-endian row ordinals.
pub fn events_schema() -> TableSchema {
    TableSchema::new(
        EVENTS_TABLE,
        "events",
        vec![ColumnDef::new("payload", ColumnType::Utf8)],
    )
}

/// Rows of [`users_schema`] with ids `0..count` in random order, random names
/// and ages. Deterministic for a given seed.
pub fn generate_users(count: usize, seed: u64) -> Vec<Vec<Value>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ids = (0..count as i64).collect::<Vec<_>>();
    for i in (1..ids.len()).rev() {
        let j = rng.random_range(0..=i);
        ids.swap(i, j);
    }
    ids.into_iter()
        .map(|id| {
            let name = format!("user{:04}", rng.random_range(0..count.max(1) * 2));
            let age = if rng.random_bool(0.05) {
                Value::Null
            } else {
                Value::Int(rng.random_range(18..90))
            };
            vec![Value::Int(id), Value::Str(name), age]
        })
        .collect()
}

/// Rows of [`events_schema`] with a fixed-size payload.
pub fn generate_events(count: usize, payload_len: usize) -> Vec<Vec<Value>> {
    (0..count)
        .map(|i| vec![Value::Str(format!("{i:0>width$}", width = payload_len))])
        .collect()
}

/// Replaces the age of every `nth` row (starting with row `nth - 1`) with text
/// that does not parse as an integer. Returns the number of corrupted rows.
pub fn corrupt_every_nth(rows: &mut [Vec<Value>], nth: usize) -> usize {
    let mut corrupted = 0;
    for row in rows.iter_mut().skip(nth - 1).step_by(nth) {
        row[2] = Value::Str("not a number".to_string());
        corrupted += 1;
    }
    corrupted
}

/// Writes `rows` as a CSV file with a header line. Nulls become empty fields.
pub fn write_csv(
    dir: &Path,
    name: &str,
    header: &[&str],
    rows: &[Vec<Value>],
) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    let mut file = std::io::BufWriter::new(std::fs::File::create(&path)?);
    writeln!(file, "{}", header.join(","))?;
    for row in rows {
        let fields = row
            .iter()
            .map(|v| match v {
                Value::Null => String::new(),
                Value::Int(i) => i.to_string(),
                Value::Str(s) => s.clone(),
                Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            })
            .collect::<Vec<_>>();
        writeln!(file, "{}", fields.join(","))?;
    }
    file.flush()?;
    Ok(path)
}

/// Writes `rows` into `num_files` CSV files of about equal size in a new
/// temporary directory, which the caller keeps alive for as long as the files
/// are needed.
pub fn write_csv_splits(
    header: &[&str],
    rows: &[Vec<Value>],
    num_files: usize,
) -> anyhow::Result<(tempfile::TempDir, Vec<PathBuf>)> {
    let dir = tempfile::tempdir()?;
    let chunk = rows.len().div_ceil(num_files.max(1)).max(1);
    let files = rows
        .chunks(chunk)
        .enumerate()
        .map(|(i, chunk)| write_csv(dir.path(), &format!("split-{i}.csv"), header, chunk))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok((dir, files))
}
