use crate::schema::TargetId;

/// A single column value of a logical input row.
///
/// Textual sources produce `Str` values that the value codec coerces into the
/// declared column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A logical row of the input dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Position of the row in the dataset, unique across all splits of a source.
    /// Tables without a primary key derive their surrogate key from it.
    pub ordinal: u64,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(ordinal: u64, values: Vec<Value>) -> Row {
        Row { ordinal, values }
    }
}

/// Key/value pair destined for one target. Keys compare as unsigned bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRow {
    pub target: TargetId,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl EncodedRow {
    /// Bytes this pair contributes to its target's size.
    pub fn byte_size(&self) -> u64 {
        (self.key.len() + self.value.len()) as u64
    }
}
