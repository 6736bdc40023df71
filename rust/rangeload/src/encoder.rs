//! Row/index encoder: one logical row into one pair per target.

use std::sync::Arc;

use rangeload_common::{Result, error::Error};

use crate::{
    codec::ValueCodec,
    row::{EncodedRow, Row, Value},
    schema::{ColumnDef, TableSchema, Target, TargetKind},
    txn::TxnHandle,
};

/// Encodes rows of one table into primary and secondary-index pairs.
///
/// The primary key is built from the declared primary-key columns, or from the
/// row ordinal (big-endian `u64`) when the table has none. The primary value
/// holds every non-key column. An index key is built from the indexed columns,
/// followed by the primary key when the index is non-unique or when the
/// indexed columns contain a null; the index value is the primary key.
///
/// Encoding is all-or-nothing per row: a failure in any column of any target
/// rejects the whole row.
pub struct RowEncoder {
    columns: Vec<ColumnDef>,
    targets: Vec<Target>,
    value_columns: Vec<usize>,
    codec: Arc<dyn ValueCodec>,
}

impl RowEncoder {
    pub fn new(schema: &TableSchema, codec: Arc<dyn ValueCodec>) -> Result<RowEncoder> {
        let targets = schema.targets()?;
        let value_columns = (0..schema.columns.len())
            .filter(|i| !targets[0].key_columns.iter().any(|k| k.column == *i))
            .collect();
        Ok(RowEncoder {
            columns: schema.columns.clone(),
            targets,
            value_columns,
            codec,
        })
    }

    /// Targets in encoding order: the primary table first.
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn encode(&self, row: &Row, txn: &TxnHandle) -> Result<Vec<EncodedRow>> {
        let mut out = Vec::with_capacity(self.targets.len());
        self.encode_into(row, txn, &mut out)?;
        Ok(out)
    }

    /// Appends the pairs of `row` to `out`. On error `out` is left unchanged.
    pub fn encode_into(&self, row: &Row, txn: &TxnHandle, out: &mut Vec<EncodedRow>) -> Result<()> {
        let start = out.len();
        let res = self.encode_row(row, txn, out);
        if res.is_err() {
            out.truncate(start);
        }
        res
    }

    fn encode_row(&self, row: &Row, txn: &TxnHandle, out: &mut Vec<EncodedRow>) -> Result<()> {
        self.check_row(row)?;
        let primary = self.encode_primary(row, txn)?;
        let primary_idx = out.len();
        out.push(primary);
        for target in &self.targets[1..] {
            let pair = self.encode_index(target, row, &out[primary_idx].key, txn)?;
            out.push(pair);
        }
        Ok(())
    }

    fn check_row(&self, row: &Row) -> Result<()> {
        if row.values.len() != self.columns.len() {
            return Err(Error::encoding(
                "<row>",
                format!(
                    "row {} has {} values, expected {}",
                    row.ordinal,
                    row.values.len(),
                    self.columns.len()
                ),
            ));
        }
        for (column, value) in self.columns.iter().zip(&row.values) {
            if !column.nullable && value.is_null() {
                return Err(Error::encoding(&column.name, "null in a non-nullable column"));
            }
        }
        Ok(())
    }

    fn encode_primary(&self, row: &Row, txn: &TxnHandle) -> Result<EncodedRow> {
        let table = &self.targets[0];
        debug_assert_eq!(table.kind, TargetKind::Table);

        let mut key = Vec::new();
        if table.key_columns.is_empty() {
            key.extend_from_slice(&row.ordinal.to_be_bytes());
        }
        for key_column in &table.key_columns {
            let column = &self.columns[key_column.column];
            let value = &row.values[key_column.column];
            if value.is_null() {
                return Err(Error::encoding(&column.name, "null in a primary key column"));
            }
            self.codec.encode_key(column, value, txn, &mut key)?;
        }

        let mut value = Vec::new();
        for &i in &self.value_columns {
            self.codec
                .encode_value(&self.columns[i], &row.values[i], txn, &mut value)?;
        }
        Ok(EncodedRow {
            target: table.id,
            key,
            value,
        })
    }

    fn encode_index(
        &self,
        target: &Target,
        row: &Row,
        primary_key: &[u8],
        txn: &TxnHandle,
    ) -> Result<EncodedRow> {
        let mut key = Vec::new();
        let mut has_null = false;
        for key_column in &target.key_columns {
            let value = &row.values[key_column.column];
            has_null |= matches!(value, Value::Null);
            let start = key.len();
            self.codec
                .encode_key(&self.columns[key_column.column], value, txn, &mut key)?;
            if key_column.descending {
                key[start..].iter_mut().for_each(|b| *b = !*b);
            }
        }
        if !target.unique || has_null {
            key.extend_from_slice(primary_key);
        }
        Ok(EncodedRow {
            target: target.id,
            key,
            value: primary_key.to_vec(),
        })
    }
}
