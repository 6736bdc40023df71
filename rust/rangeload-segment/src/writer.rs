use rangeload_common::error::Error;
use rangeload_io::{BufferedSealingWrite, SealingWrite};

use crate::{
    checksum::{StreamingChecksum, create_message_vec},
    format::{HEADER_SIZE, SEGMENT_MAGIC, SegmentFooter},
};

/// Appends sorted key/value records to a new segment.
///
/// Keys must arrive in non-decreasing unsigned-byte order; an out-of-order key
/// fails the append and leaves the segment unfinished. The segment becomes
/// valid only after [`finish`](Self::finish) writes the footer and seals the
/// underlying writer.
pub struct SegmentWriter<W: SealingWrite> {
    inner: BufferedSealingWrite<W>,
    target_id: u64,
    txn_id: u64,
    record_count: u64,
    first_key: Option<Vec<u8>>,
    last_key: Vec<u8>,
    checksum: StreamingChecksum,
}

impl<W: SealingWrite> SegmentWriter<W> {
    pub fn new(inner: W, target_id: u64, txn_id: u64) -> rangeload_common::Result<SegmentWriter<W>> {
        let mut inner = BufferedSealingWrite::new(inner);
        inner
            .write_all(&SEGMENT_MAGIC)
            .map_err(|e| Error::io("write segment header", e))?;
        Ok(SegmentWriter {
            inner,
            target_id,
            txn_id,
            record_count: 0,
            first_key: None,
            last_key: Vec::new(),
            checksum: StreamingChecksum::new(),
        })
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn append(&mut self, key: &[u8], value: &[u8]) -> rangeload_common::Result<()> {
        if self.first_key.is_some() && key < self.last_key.as_slice() {
            return Err(Error::invalid_arg(
                "key",
                format!(
                    "segment keys must be sorted: {:02x?} follows {:02x?}",
                    key, self.last_key
                ),
            ));
        }
        let key_len = record_len(key.len())?;
        let value_len = record_len(value.len())?;

        self.write_chunk(&key_len)?;
        self.write_chunk(key)?;
        self.write_chunk(&value_len)?;
        self.write_chunk(value)?;

        if self.first_key.is_none() {
            self.first_key = Some(key.to_vec());
        }
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.record_count += 1;
        Ok(())
    }

    /// Writes the footer and the trailer, then seals the segment.
    pub fn finish(mut self) -> rangeload_common::Result<SegmentFooter> {
        let footer_offset = self.inner.position();
        let footer = SegmentFooter {
            target_id: self.target_id,
            txn_id: self.txn_id,
            record_count: self.record_count,
            first_key: self.first_key.take().unwrap_or_default(),
            last_key: std::mem::take(&mut self.last_key),
            data_len: footer_offset - HEADER_SIZE as u64,
            data_checksum: self.checksum.digest(),
        };
        let message = create_message_vec(&footer.to_vec()?);
        let write_tail = |inner: &mut BufferedSealingWrite<W>| -> std::io::Result<()> {
            inner.write_all(&message)?;
            inner.write_all(&footer_offset.to_le_bytes())?;
            inner.write_all(&SEGMENT_MAGIC)?;
            inner.seal()
        };
        write_tail(&mut self.inner).map_err(|e| Error::io("seal segment", e))?;
        Ok(footer)
    }

    fn write_chunk(&mut self, buf: &[u8]) -> rangeload_common::Result<()> {
        self.checksum.update(buf);
        self.inner
            .write_all(buf)
            .map_err(|e| Error::io("write segment record", e))
    }
}

fn record_len(len: usize) -> rangeload_common::Result<[u8; 4]> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| Error::invalid_arg("record", format!("record part of {len} bytes is too large")))
}
