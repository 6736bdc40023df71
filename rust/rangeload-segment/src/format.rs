use std::ops::Range;

use bincode::{Decode, Encode};
use rangeload_common::error::Error;

/// Leading and trailing magic of a segment file.
pub const SEGMENT_MAGIC: [u8; 8] = *b"rlseg001";

pub const HEADER_SIZE: usize = SEGMENT_MAGIC.len();

/// `[footer_offset: u64][magic]`
pub const TRAILER_SIZE: usize = 8 + SEGMENT_MAGIC.len();

pub const MESSAGE_LEN_SIZE: usize = 4;

pub const CHECKSUM_SIZE: usize = 4;

/// Size of a record length prefix (applies to both key and value).
pub const RECORD_LEN_SIZE: usize = 4;

/// Smallest possible segment: header, empty footer message and trailer.
pub const MIN_SEGMENT_SIZE: usize = HEADER_SIZE + MESSAGE_LEN_SIZE + CHECKSUM_SIZE + TRAILER_SIZE;

/// Segment metadata stored at the end of the file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SegmentFooter {
    pub target_id: u64,
    pub txn_id: u64,
    pub record_count: u64,
    /// Smallest key in the segment; empty when the segment holds no records.
    pub first_key: Vec<u8>,
    /// Largest key in the segment; empty when the segment holds no records.
    pub last_key: Vec<u8>,
    /// Length of the record region that follows the header.
    pub data_len: u64,
    /// XXH3-64 of the record region.
    pub data_checksum: u64,
}

impl SegmentFooter {
    pub fn to_vec(&self) -> rangeload_common::Result<Vec<u8>> {
        bincode::encode_to_vec(self, Self::binc_config())
            .map_err(|e| Error::serialization("encode segment footer", e))
    }

    pub fn from_slice(slice: &[u8]) -> rangeload_common::Result<SegmentFooter> {
        bincode::decode_from_slice(slice, Self::binc_config())
            .map_err(|e| Error::serialization("decode segment footer", e))
            .map(|(footer, _)| footer)
    }

    /// Byte range of the record region within the segment file.
    pub fn data_range(&self) -> Range<u64> {
        HEADER_SIZE as u64..HEADER_SIZE as u64 + self.data_len
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    fn binc_config() -> impl bincode::config::Config {
        bincode::config::standard().with_fixed_int_encoding()
    }
}

#[cfg(test)]
mod tests {
    use super::SegmentFooter;

    #[test]
    fn test_footer_encoding() {
        let footer = SegmentFooter {
            target_id: 1200,
            txn_id: 7,
            record_count: 3,
            first_key: b"a".to_vec(),
            last_key: b"c".to_vec(),
            data_len: 30,
            data_checksum: 0xDEAD_BEEF,
        };
        let encoded = footer.to_vec().unwrap();
        // Fixed-width integers: five u64 fields and two u64 length prefixes.
        assert_eq!(encoded.len(), 7 * 8 + 2);
        assert_eq!(SegmentFooter::from_slice(&encoded).unwrap(), footer);
        assert_eq!(footer.data_range(), 8..38);
    }

    #[test]
    fn test_truncated_footer() {
        let encoded = SegmentFooter::default().to_vec().unwrap();
        assert!(SegmentFooter::from_slice(&encoded[..10]).is_err());
    }
}
