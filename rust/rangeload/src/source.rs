//! Row sources: the dataset to import, divided into independently scannable
//! splits.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use rangeload_common::{Result, error::Error};

use crate::row::{Row, Value};

pub type RowIter<'a> = Box<dyn Iterator<Item = Result<Row>> + Send + 'a>;

/// A finite dataset split into independently scannable parts.
///
/// Scanning the same split twice yields the same rows in the same order (the
/// sampling and the full pass both scan every split). Row ordinals are unique
/// across all splits.
pub trait RowSource: Send + Sync {
    fn num_splits(&self) -> usize;

    fn scan_split(&self, split: usize) -> Result<RowIter<'_>>;
}

impl<T: RowSource + ?Sized> RowSource for Arc<T> {
    fn num_splits(&self) -> usize {
        self.as_ref().num_splits()
    }

    fn scan_split(&self, split: usize) -> Result<RowIter<'_>> {
        self.as_ref().scan_split(split)
    }
}

/// In-memory rows, divided into splits of fixed size. Ordinals are the row
/// positions.
pub struct VecRowSource {
    rows: Vec<Vec<Value>>,
    split_size: usize,
}

impl VecRowSource {
    pub fn new(rows: Vec<Vec<Value>>, num_splits: usize) -> VecRowSource {
        let split_size = rows.len().div_ceil(num_splits.max(1)).max(1);
        VecRowSource { rows, split_size }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RowSource for VecRowSource {
    fn num_splits(&self) -> usize {
        self.rows.len().div_ceil(self.split_size).max(1)
    }

    fn scan_split(&self, split: usize) -> Result<RowIter<'_>> {
        if split >= self.num_splits() {
            return Err(Error::invalid_arg("split", format!("no split {split}")));
        }
        let start = (split * self.split_size).min(self.rows.len());
        let end = (start + self.split_size).min(self.rows.len());
        Ok(Box::new(
            self.rows[start..end]
                .iter()
                .enumerate()
                .map(move |(i, values)| Ok(Row::new((start + i) as u64, values.clone()))),
        ))
    }
}

/// Bits of a CSV row ordinal reserved for the line number within a file.
const CSV_LINE_BITS: u32 = 40;

/// CSV files, one split per file.
///
/// Every field becomes a `Str` value (or `Bytes` when it is not valid UTF-8)
/// and an empty field a null; the value codec coerces the text into the
/// column type. Records with a wrong field count are passed on as they are and
/// rejected by the encoder. The ordinal of a row is `split << 40 | line`.
pub struct CsvRowSource {
    files: Vec<PathBuf>,
    has_headers: bool,
    delimiter: u8,
}

impl CsvRowSource {
    pub fn new(files: Vec<PathBuf>) -> CsvRowSource {
        CsvRowSource {
            files,
            has_headers: true,
            delimiter: b',',
        }
    }

    pub fn with_headers(mut self, has_headers: bool) -> CsvRowSource {
        self.has_headers = has_headers;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> CsvRowSource {
        self.delimiter = delimiter;
        self
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl RowSource for CsvRowSource {
    fn num_splits(&self) -> usize {
        self.files.len()
    }

    fn scan_split(&self, split: usize) -> Result<RowIter<'_>> {
        let path = self
            .files
            .get(split)
            .ok_or_else(|| Error::invalid_arg("split", format!("no split {split}")))?;
        let reader = csv::ReaderBuilder::new()
            .has_headers(self.has_headers)
            .delimiter(self.delimiter)
            .flexible(true)
            .from_path(path)
            .map_err(|e| csv_error(path, e))?;
        let base = (split as u64) << CSV_LINE_BITS;
        let path = path.clone();
        Ok(Box::new(reader.into_byte_records().enumerate().map(
            move |(line, record)| {
                let record = record.map_err(|e| csv_error(&path, e))?;
                let values = record.iter().map(field_value).collect();
                Ok(Row::new(base | line as u64, values))
            },
        )))
    }
}

fn field_value(field: &[u8]) -> Value {
    if field.is_empty() {
        return Value::Null;
    }
    match std::str::from_utf8(field) {
        Ok(s) => Value::Str(s.to_string()),
        Err(_) => Value::Bytes(field.to_vec()),
    }
}

fn csv_error(path: &Path, e: csv::Error) -> Error {
    Error::serialization(format!("csv file {}", path.display()), e)
}
