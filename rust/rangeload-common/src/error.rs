use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

pub type StdErrorBoxed = Box<dyn std::error::Error + Send + Sync + 'static>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// Returns `true` for per-row failures that are counted as bad records
    /// instead of failing the import outright.
    pub fn is_bad_record(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Encoding { .. } | ErrorKind::KeyOutOfRange { .. }
        )
    }

    pub fn invalid_format(element: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidFormat {
                element: element.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    pub fn serialization<E>(context: impl Into<String>, source: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error(
            ErrorKind::Serialization {
                context: context.into(),
                source: Box::new(source),
            }
            .into(),
        )
    }

    pub fn encoding(column: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Encoding {
                column: column.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn key_out_of_range(target: u64, key: impl Into<String>) -> Error {
        Error(
            ErrorKind::KeyOutOfRange {
                target,
                key: key.into(),
            }
            .into(),
        )
    }

    pub fn planning(target: u64, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Planning {
                target,
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn partition_layout(target: u64, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::PartitionLayout {
                target,
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn store(operation: impl Into<String>, target: u64, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Store {
                operation: operation.into(),
                target,
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn load(target: u64, segment: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Load {
                target,
                segment: segment.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn too_many_bad_records(count: u64, threshold: u64, location: Option<String>) -> Error {
        Error(
            ErrorKind::TooManyBadRecords {
                count,
                threshold,
                location,
            }
            .into(),
        )
    }

    pub fn cancelled() -> Error {
        Error(ErrorKind::Cancelled.into())
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error(
        "failed to resolve url '{url}' (relative: {}), reason: {reason}",
        relative.as_deref().unwrap_or_default())]
    ResolveUrl {
        url: String,
        relative: Option<String>,
        reason: String,
    },

    #[error("checksum mismatch for '{element}'")]
    ChecksumMismatch { element: String },

    #[error("invalid storage format for '{element}': {message}")]
    InvalidFormat { element: String, message: String },

    #[error("IO error for '{context}': {source}'")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("serialization error: {context}: {source}")]
    Serialization {
        context: String,
        source: StdErrorBoxed,
    },

    #[error("failed to encode column '{column}': {message}")]
    Encoding { column: String, message: String },

    #[error("key {key} of target {target} is outside of all known partitions")]
    KeyOutOfRange { target: u64, key: String },

    #[error("failed to plan cut points for target {target}: {message}")]
    Planning { target: u64, message: String },

    #[error("invalid partition layout of target {target}: {message}")]
    PartitionLayout { target: u64, message: String },

    #[error("store operation '{operation}' failed for target {target}: {message}")]
    Store {
        operation: String,
        target: u64,
        message: String,
    },

    #[error("failed to load segment '{segment}' into target {target}: {message}")]
    Load {
        target: u64,
        segment: String,
        message: String,
    },

    #[error(
        "too many bad records: {count} (allowed: {threshold}), details: {}",
        location.as_deref().unwrap_or("n/a"))]
    TooManyBadRecords {
        count: u64,
        threshold: u64,
        location: Option<String>,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("", e)
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(_: std::convert::Infallible) -> Self {
        Error::invalid_operation("conversion")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_record_classification() {
        assert!(Error::encoding("id", "not a number").is_bad_record());
        assert!(Error::key_out_of_range(7, "\\x00").is_bad_record());
        assert!(!Error::planning(7, "empty sketch").is_bad_record());
        assert!(!Error::load(7, "file:///a/b", "rejected").is_bad_record());
        assert!(!Error::cancelled().is_bad_record());
    }

    #[test]
    fn test_display() {
        let e = Error::too_many_bad_records(12, 10, Some("file:///out/bad.ndjson".into()));
        assert_eq!(
            e.to_string(),
            "too many bad records: 12 (allowed: 10), details: file:///out/bad.ndjson"
        );
        let e = Error::too_many_bad_records(1, 0, None);
        assert!(e.to_string().ends_with("details: n/a"));
    }
}
