use std::{ops::Range, sync::Arc};

use bytes::Bytes;
use rangeload_common::{
    error::{Error, ErrorKind},
    verify_data,
};
use rangeload_io::ReadAt;

use crate::{
    checksum::{StreamingChecksum, validate_message},
    format::{
        HEADER_SIZE, MIN_SEGMENT_SIZE, RECORD_LEN_SIZE, SEGMENT_MAGIC, SegmentFooter, TRAILER_SIZE,
    },
};

/// Reads a sealed segment: validates the framing on open, then exposes the
/// footer and an iterator over the records.
pub struct SegmentReader {
    reader: Arc<dyn ReadAt>,
    footer: SegmentFooter,
}

impl SegmentReader {
    pub fn open(reader: Arc<dyn ReadAt>) -> rangeload_common::Result<SegmentReader> {
        let size = reader.size().map_err(|e| Error::io("segment size", e))?;
        verify_data!(size, size >= MIN_SEGMENT_SIZE as u64);

        let header = read_exact(reader.as_ref(), 0..HEADER_SIZE as u64)?;
        verify_data!(header, header.as_ref() == SEGMENT_MAGIC);

        let trailer = read_exact(reader.as_ref(), size - TRAILER_SIZE as u64..size)?;
        verify_data!(trailer, trailer[8..] == SEGMENT_MAGIC);
        let footer_offset = u64::from_le_bytes(le_bytes(&trailer[..8]));
        let footer_end = size - TRAILER_SIZE as u64;
        verify_data!(
            footer_offset,
            footer_offset >= HEADER_SIZE as u64 && footer_offset < footer_end
        );

        let message = read_exact(reader.as_ref(), footer_offset..footer_end)?;
        let footer = SegmentFooter::from_slice(validate_message(&message)?)?;
        verify_data!(
            footer.data_len,
            footer.data_len == footer_offset - HEADER_SIZE as u64
        );
        Ok(SegmentReader { reader, footer })
    }

    pub fn footer(&self) -> &SegmentFooter {
        &self.footer
    }

    /// Reads the record region and returns an iterator over its records.
    pub fn records(&self) -> rangeload_common::Result<SegmentRecords> {
        let data = read_exact(self.reader.as_ref(), self.footer.data_range())?;
        Ok(SegmentRecords {
            data,
            pos: 0,
            remaining: self.footer.record_count,
        })
    }

    /// Full consistency check: record region checksum, record count, key order
    /// and the first/last keys recorded in the footer.
    pub fn verify(&self) -> rangeload_common::Result<()> {
        let range = self.footer.data_range();
        let chunk = self
            .reader
            .storage_profile()
            .clamp_io_size(1024 * 1024) as u64;
        let mut checksum = StreamingChecksum::new();
        let mut pos = range.start;
        while pos < range.end {
            let end = (pos + chunk).min(range.end);
            checksum.update(&read_exact(self.reader.as_ref(), pos..end)?);
            pos = end;
        }
        if checksum.digest() != self.footer.data_checksum {
            return Err(ErrorKind::ChecksumMismatch {
                element: "segment data".to_string(),
            }
            .into());
        }

        let mut count = 0u64;
        let mut prev: Option<Bytes> = None;
        for record in self.records()? {
            let (key, _) = record?;
            match &prev {
                None => verify_data!(first_key, key.as_ref() == self.footer.first_key),
                Some(prev) => verify_data!(key_order, prev <= &key),
            }
            prev = Some(key);
            count += 1;
        }
        verify_data!(record_count, count == self.footer.record_count);
        if let Some(last) = prev {
            verify_data!(last_key, last.as_ref() == self.footer.last_key);
        }
        Ok(())
    }
}

/// Iterator over the records of a segment, yielding zero-copy key/value slices.
pub struct SegmentRecords {
    data: Bytes,
    pos: usize,
    remaining: u64,
}

impl SegmentRecords {
    fn next_part(&mut self) -> rangeload_common::Result<Bytes> {
        let len_end = self.pos + RECORD_LEN_SIZE;
        verify_data!(record, len_end <= self.data.len());
        let len = u32::from_le_bytes(le_bytes(&self.data[self.pos..len_end])) as usize;
        let end = len_end + len;
        verify_data!(record, end <= self.data.len());
        self.pos = end;
        Ok(self.data.slice(len_end..end))
    }

    fn next_record(&mut self) -> rangeload_common::Result<(Bytes, Bytes)> {
        let key = self.next_part()?;
        let value = self.next_part()?;
        Ok((key, value))
    }
}

impl Iterator for SegmentRecords {
    type Item = rangeload_common::Result<(Bytes, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            if self.pos < self.data.len() {
                self.pos = self.data.len();
                return Some(Err(Error::invalid_format(
                    "segment data",
                    "trailing bytes after the last record",
                )));
            }
            return None;
        }
        self.remaining -= 1;
        let record = self.next_record();
        if record.is_err() {
            self.remaining = 0;
            self.pos = self.data.len();
        }
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining as usize;
        (0, Some(remaining.saturating_add(1)))
    }
}

fn read_exact(reader: &dyn ReadAt, range: Range<u64>) -> rangeload_common::Result<Bytes> {
    let expected = range.end - range.start;
    let buf = reader
        .read_at(range)
        .map_err(|e| Error::io("read segment", e))?;
    if buf.len() as u64 != expected {
        return Err(Error::invalid_format("segment", "unexpected end of data"));
    }
    Ok(buf)
}

fn le_bytes<const N: usize>(buf: &[u8]) -> [u8; N] {
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(&buf[..N]);
    bytes
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use rangeload_common::error::ErrorKind;
    use rangeload_io::{
        ReadAt,
        file::{FileReader, FileWriter},
    };

    use crate::{SegmentReader, SegmentWriter};

    fn build_segment(records: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = SegmentWriter::new(&mut buf, 42, 5).unwrap();
        for (key, value) in records {
            writer.append(key.as_bytes(), value.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        buf
    }

    fn open(buf: Vec<u8>) -> rangeload_common::Result<SegmentReader> {
        SegmentReader::open(Arc::new(Bytes::from(buf)) as Arc<dyn ReadAt>)
    }

    #[test]
    fn test_read_back() {
        let records = [("a", "1"), ("b", ""), ("b", "2"), ("zz", "3")];
        let reader = open(build_segment(&records)).unwrap();
        reader.verify().unwrap();

        let footer = reader.footer();
        assert_eq!(footer.target_id, 42);
        assert_eq!(footer.txn_id, 5);
        assert_eq!(footer.record_count, 4);

        let read = reader
            .records()
            .unwrap()
            .map(|r| r.map(|(k, v)| (k.to_vec(), v.to_vec())))
            .collect::<rangeload_common::Result<Vec<_>>>()
            .unwrap();
        let expected = records
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect::<Vec<_>>();
        assert_eq!(read, expected);
    }

    #[test]
    fn test_empty_segment() {
        let reader = open(build_segment(&[])).unwrap();
        reader.verify().unwrap();
        assert!(reader.footer().is_empty());
        assert_eq!(reader.records().unwrap().count(), 0);
    }

    #[test]
    fn test_corrupted_data_detected() {
        let mut buf = build_segment(&[("key", "value")]);
        buf[13] ^= 0x01;
        let reader = open(buf).unwrap();
        let err = reader.verify().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_corrupted_framing_detected() {
        let good = build_segment(&[("key", "value")]);

        let mut bad_magic = good.clone();
        bad_magic[0] = b'X';
        assert!(open(bad_magic).is_err());

        let truncated = good[..good.len() - 3].to_vec();
        assert!(open(truncated).is_err());

        let mut bad_footer = good.clone();
        let footer_pos = good.len() - 16 - 6;
        bad_footer[footer_pos] ^= 0xFF;
        assert!(open(bad_footer).is_err());

        assert!(open(b"rlseg001".to_vec()).is_err());
    }

    #[test]
    fn test_file_segment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.seg");
        let mut writer = SegmentWriter::new(FileWriter::create(&path).unwrap(), 1, 1).unwrap();
        for i in 0..10_000u32 {
            writer.append(&i.to_be_bytes(), &[0u8; 16]).unwrap();
        }
        let footer = writer.finish().unwrap();

        let reader = SegmentReader::open(Arc::new(FileReader::open(&path).unwrap())).unwrap();
        assert_eq!(reader.footer(), &footer);
        reader.verify().unwrap();
        let last = reader.records().unwrap().last().unwrap().unwrap();
        assert_eq!(last.0.as_ref(), &9_999u32.to_be_bytes());
    }
}
