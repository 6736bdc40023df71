use rangeload_common::{error::ErrorKind, verify_arg};

use crate::format::{CHECKSUM_SIZE, MESSAGE_LEN_SIZE};

/// Validates a `[len][payload][checksum]` message and returns its payload.
pub fn validate_message(message: &[u8]) -> rangeload_common::Result<&[u8]> {
    verify_arg!(message, message.len() >= MESSAGE_LEN_SIZE + CHECKSUM_SIZE);
    let size = read_u32(&message[0..MESSAGE_LEN_SIZE]) as usize;
    verify_arg!(size, size + MESSAGE_LEN_SIZE + CHECKSUM_SIZE <= message.len());
    let message = &message[MESSAGE_LEN_SIZE..];
    let payload = &message[..size];
    let checksum = read_u32(&message[size..size + CHECKSUM_SIZE]);
    validate_buffer(payload, checksum, Some("message"))?;
    Ok(payload)
}

/// Compares the checksum of `buf` with the expected one.
pub fn validate_buffer(buf: &[u8], checksum: u32, name: Option<&str>) -> rangeload_common::Result<()> {
    if compute(buf) == checksum {
        Ok(())
    } else {
        Err(ErrorKind::ChecksumMismatch {
            element: name.unwrap_or_default().to_string(),
        }
        .into())
    }
}

/// 32-bit checksum of a buffer: XXH3-64 folded onto itself.
pub fn compute(buf: &[u8]) -> u32 {
    fold(xxhash_rust::xxh3::xxh3_64(buf))
}

/// Frames `payload` as a message.
pub fn create_message_vec(payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(MESSAGE_LEN_SIZE + payload.len() + CHECKSUM_SIZE);
    message.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    message.extend_from_slice(payload);
    message.extend_from_slice(&compute(payload).to_le_bytes());
    message
}

/// Incremental XXH3-64 over the record region of a segment.
#[derive(Clone)]
pub struct StreamingChecksum(xxhash_rust::xxh3::Xxh3);

impl StreamingChecksum {
    pub fn new() -> StreamingChecksum {
        StreamingChecksum(xxhash_rust::xxh3::Xxh3::new())
    }

    pub fn update(&mut self, buf: &[u8]) {
        self.0.update(buf);
    }

    pub fn digest(&self) -> u64 {
        self.0.digest()
    }
}

impl Default for StreamingChecksum {
    fn default() -> Self {
        Self::new()
    }
}

fn fold(h: u64) -> u32 {
    (h as u32) ^ ((h >> 32) as u32)
}

fn read_u32(buf: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[..4]);
    u32::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use rangeload_common::error::ErrorKind;

    use super::*;

    #[test]
    fn test_message_framing() {
        let message = create_message_vec(b"footer");
        assert_eq!(message.len(), 4 + 6 + 4);
        assert_eq!(validate_message(&message).unwrap(), b"footer");
    }

    #[test]
    fn test_corrupted_message() {
        let mut message = create_message_vec(b"footer");
        message[5] ^= 0xFF;
        let err = validate_message(&message).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ChecksumMismatch { .. }));

        assert!(validate_message(&message[..6]).is_err());
    }

    #[test]
    fn test_streaming_checksum_matches_one_shot() {
        let data = (0..10_000u32).flat_map(|i| i.to_le_bytes()).collect::<Vec<_>>();
        let mut streaming = StreamingChecksum::new();
        for chunk in data.chunks(777) {
            streaming.update(chunk);
        }
        assert_eq!(streaming.digest(), xxhash_rust::xxh3::xxh3_64(&data));
    }
}
