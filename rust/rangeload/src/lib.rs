//! Bulk import of a table and its secondary indexes into a range-partitioned
//! key-value store.
//!
//! The import samples the encoded rows to estimate the size and the key
//! distribution of every target (the table and each index), pre-splits the
//! store so that no partition exceeds the configured size, routes every pair to
//! the partition that owns its key, sorts each partition's pairs into
//! immutable segment files and finally hands the segments to the store.
//!
//! [`Importer`] is the entry point; [`PartitionStore`] is the store seam, with
//! [`LocalRangeStore`] as a directory-backed implementation.

pub mod bad_records;
pub mod codec;
pub mod config;
pub mod encoder;
pub mod loader;
pub mod local_store;
pub mod orchestrator;
pub mod output;
pub mod parallel;
pub mod planner;
pub mod printable;
pub mod resolver;
pub mod row;
pub mod sampler;
pub mod schema;
pub mod shuffle;
pub mod sorter;
pub mod source;
pub mod store;
pub mod txn;

pub use codec::{DefaultValueCodec, ValueCodec};
pub use config::{ImportConfig, ImportMode};
pub use local_store::LocalRangeStore;
pub use orchestrator::{
    ImportOutcome, ImportReport, ImportResult, ImportState, ImportSummary, Importer,
};
pub use planner::CutPoints;
pub use row::{EncodedRow, Row, Value};
pub use schema::{ColumnDef, ColumnType, IndexDef, TableSchema, TargetId};
pub use source::{CsvRowSource, RowSource, VecRowSource};
pub use store::{KeyRange, PartitionStore, SegmentRef};
pub use txn::TxnHandle;
