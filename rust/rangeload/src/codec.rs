//! Column value encoding.
//!
//! [`ValueCodec`] turns individual column values into bytes, both for keys
//! (where the encoding must preserve value order under unsigned byte
//! comparison) and for the value part of a pair. The import pipeline treats the
//! codec as a black box; [`DefaultValueCodec`] is the built-in implementation.

use rangeload_common::{Result, error::Error};

use crate::{
    row::Value,
    schema::{ColumnDef, ColumnType},
    txn::TxnHandle,
};

const NULL_TAG: u8 = 0x00;
const PRESENT_TAG: u8 = 0x01;
const ESCAPE: u8 = 0xFF;

pub trait ValueCodec: Send + Sync {
    /// Appends the order-preserving key encoding of `value` to `out`.
    ///
    /// The encoding of a single column must be prefix-free, so that
    /// concatenated column encodings compare column by column.
    fn encode_key(
        &self,
        column: &ColumnDef,
        value: &Value,
        txn: &TxnHandle,
        out: &mut Vec<u8>,
    ) -> Result<()>;

    /// Appends the encoding of a non-key column to `out`.
    fn encode_value(
        &self,
        column: &ColumnDef,
        value: &Value,
        txn: &TxnHandle,
        out: &mut Vec<u8>,
    ) -> Result<()>;
}

/// Built-in codec.
///
/// Values are first coerced into the declared column type (`"42"` into an
/// `Int64` column, for instance); a failed coercion is an encoding error.
///
/// Key layout: a tag byte (`0x00` null, `0x01` present) followed by a
/// sign-flipped big-endian `i64`, or by the raw bytes with `0x00` escaped as
/// `0x00 0xFF` and terminated with `0x00 0x00`. Nulls sort first.
///
/// Value layout: the same tag byte followed by a little-endian `i64`, or by a
/// `u32` little-endian length and the raw bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultValueCodec;

impl DefaultValueCodec {
    /// Coerces `value` into the type of `column`.
    pub fn coerce(&self, column: &ColumnDef, value: &Value) -> Result<Value> {
        let mismatch = |what: &str| {
            Error::encoding(
                &column.name,
                format!("cannot convert {what} to {:?}", column.data_type),
            )
        };
        let coerced = match (column.data_type, value) {
            (_, Value::Null) => Value::Null,
            (ColumnType::Int64, Value::Int(v)) => Value::Int(*v),
            (ColumnType::Int64, Value::Str(s)) => Value::Int(
                s.trim()
                    .parse::<i64>()
                    .map_err(|e| Error::encoding(&column.name, format!("'{s}': {e}")))?,
            ),
            (ColumnType::Int64, Value::Bytes(_)) => return Err(mismatch("bytes")),
            (ColumnType::Utf8, Value::Str(s)) => Value::Str(s.clone()),
            (ColumnType::Utf8, Value::Int(v)) => Value::Str(v.to_string()),
            (ColumnType::Utf8, Value::Bytes(b)) => Value::Str(
                String::from_utf8(b.clone()).map_err(|_| mismatch("non-utf8 bytes"))?,
            ),
            (ColumnType::Binary, Value::Bytes(b)) => Value::Bytes(b.clone()),
            (ColumnType::Binary, Value::Str(s)) => Value::Bytes(s.as_bytes().to_vec()),
            (ColumnType::Binary, Value::Int(_)) => return Err(mismatch("integer")),
        };
        Ok(coerced)
    }
}

impl ValueCodec for DefaultValueCodec {
    fn encode_key(
        &self,
        column: &ColumnDef,
        value: &Value,
        _txn: &TxnHandle,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        match self.coerce(column, value)? {
            Value::Null => out.push(NULL_TAG),
            Value::Int(v) => {
                out.push(PRESENT_TAG);
                encode_int_key(v, out);
            }
            Value::Str(s) => {
                out.push(PRESENT_TAG);
                encode_bytes_key(s.as_bytes(), out);
            }
            Value::Bytes(b) => {
                out.push(PRESENT_TAG);
                encode_bytes_key(&b, out);
            }
        }
        Ok(())
    }

    fn encode_value(
        &self,
        column: &ColumnDef,
        value: &Value,
        _txn: &TxnHandle,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let bytes = match self.coerce(column, value)? {
            Value::Null => {
                out.push(NULL_TAG);
                return Ok(());
            }
            Value::Int(v) => {
                out.push(PRESENT_TAG);
                out.extend_from_slice(&v.to_le_bytes());
                return Ok(());
            }
            Value::Str(s) => s.into_bytes(),
            Value::Bytes(b) => b,
        };
        let len = u32::try_from(bytes.len())
            .map_err(|_| Error::encoding(&column.name, "value is too large"))?;
        out.push(PRESENT_TAG);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&bytes);
        Ok(())
    }
}

/// Order-preserving encoding of a signed integer.
pub fn encode_int_key(v: i64, out: &mut Vec<u8>) {
    out.extend_from_slice(&((v as u64) ^ (1 << 63)).to_be_bytes());
}

/// Order-preserving, prefix-free encoding of a byte string.
pub fn encode_bytes_key(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        out.push(b);
        if b == 0 {
            out.push(ESCAPE);
        }
    }
    out.extend_from_slice(&[0, 0]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(column: &ColumnDef, value: Value) -> Vec<u8> {
        let mut out = Vec::new();
        DefaultValueCodec
            .encode_key(column, &value, &TxnHandle::new(1), &mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_int_keys_preserve_order() {
        let column = ColumnDef::new("n", ColumnType::Int64);
        let values = [i64::MIN, -1000, -1, 0, 1, 255, 256, i64::MAX];
        let keys = values.iter().map(|&v| key(&column, Value::Int(v))).collect::<Vec<_>>();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert!(key(&column, Value::Null) < keys[0]);
    }

    #[test]
    fn test_string_keys_are_prefix_free() {
        let column = ColumnDef::new("s", ColumnType::Utf8);
        let mut strings = vec!["", "a", "a\0", "a\0b", "ab", "b"];
        strings.sort_unstable();
        let keys = strings
            .iter()
            .map(|&s| key(&column, Value::from(s)))
            .collect::<Vec<_>>();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "{keys:?}");

        // ("a", "z") must sort before ("ab", "a") once columns are concatenated.
        let mut first = key(&column, "a".into());
        first.extend(key(&column, "z".into()));
        let mut second = key(&column, "ab".into());
        second.extend(key(&column, "a".into()));
        assert!(first < second);
    }

    #[test]
    fn test_coercion() {
        let codec = DefaultValueCodec;
        let int_col = ColumnDef::new("n", ColumnType::Int64);
        assert_eq!(codec.coerce(&int_col, &" 42 ".into()).unwrap(), Value::Int(42));
        let err = codec.coerce(&int_col, &"4x2".into()).unwrap_err();
        assert!(err.is_bad_record());
        assert!(codec.coerce(&int_col, &Value::Bytes(vec![1])).is_err());

        let str_col = ColumnDef::new("s", ColumnType::Utf8);
        assert_eq!(codec.coerce(&str_col, &Value::Int(7)).unwrap(), Value::from("7"));
        assert!(codec.coerce(&str_col, &Value::Bytes(vec![0xFF])).is_err());

        let bin_col = ColumnDef::new("b", ColumnType::Binary);
        assert_eq!(
            codec.coerce(&bin_col, &"hi".into()).unwrap(),
            Value::Bytes(b"hi".to_vec())
        );
    }

    #[test]
    fn test_value_encoding() {
        let codec = DefaultValueCodec;
        let txn = TxnHandle::new(1);
        let mut out = Vec::new();
        codec
            .encode_value(&ColumnDef::new("n", ColumnType::Int64), &"5".into(), &txn, &mut out)
            .unwrap();
        codec
            .encode_value(&ColumnDef::new("s", ColumnType::Utf8), &Value::Null, &txn, &mut out)
            .unwrap();
        codec
            .encode_value(&ColumnDef::new("s", ColumnType::Utf8), &"ab".into(), &txn, &mut out)
            .unwrap();
        assert_eq!(
            out,
            [
                &[1][..],
                &5i64.to_le_bytes(),
                &[0],
                &[1],
                &2u32.to_le_bytes(),
                b"ab"
            ]
            .concat()
        );
    }
}
