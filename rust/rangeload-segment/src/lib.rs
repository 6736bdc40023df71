//! Immutable sorted segment files.
//!
//! A segment holds the key/value pairs of one shuffle bucket in ascending
//! unsigned-byte key order. Layout:
//!
//! ```text
//! [magic: 8 bytes]
//! [record]*            record = [key_len: u32 LE][key][value_len: u32 LE][value]
//! [footer message]     [len: u32 LE][bincode SegmentFooter][checksum: u32 LE]
//! [footer_offset: u64 LE]
//! [magic: 8 bytes]
//! ```
//!
//! The footer carries the owning target id, the transaction id, the record
//! count, the first and last key, and an XXH3 checksum of the record region.

pub mod checksum;
pub mod format;
pub mod reader;
pub mod writer;

pub use format::SegmentFooter;
pub use reader::SegmentReader;
pub use writer::SegmentWriter;
