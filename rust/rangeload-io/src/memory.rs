use std::ops::Range;

use bytes::Bytes;

use crate::{ReadAt, SealingWrite, StorageProfile, verify};

impl<T> ReadAt for T
where
    T: details::SliceBytes + Send + Sync + 'static,
{
    fn size(&self) -> std::io::Result<u64> {
        Ok(self.len() as u64)
    }

    fn read_at(&self, range: Range<u64>) -> std::io::Result<Bytes> {
        verify!(range.end >= range.start);
        let pos = range.start as usize;
        let len = (range.end - range.start) as usize;
        let content_len = self.len();
        if pos > content_len {
            return Ok(Bytes::new());
        }
        let len = std::cmp::min(len, content_len - pos);
        Ok(self.slice(pos..pos + len))
    }

    fn storage_profile(&self) -> StorageProfile {
        StorageProfile {
            min_io_size: 1,
            max_io_size: self.len().min(StorageProfile::default().max_io_size),
        }
    }
}

impl SealingWrite for Vec<u8> {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.extend_from_slice(buf);
        Ok(())
    }

    fn seal(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn storage_profile(&self) -> StorageProfile {
        StorageProfile {
            min_io_size: 1,
            ..Default::default()
        }
    }
}

mod details {
    use std::ops::Range;

    use bytes::Bytes;

    pub trait SliceBytes {
        fn len(&self) -> usize;
        fn slice(&self, range: Range<usize>) -> Bytes;
    }

    impl SliceBytes for Bytes {
        fn len(&self) -> usize {
            Bytes::len(self)
        }

        fn slice(&self, range: Range<usize>) -> Bytes {
            Bytes::slice(self, range)
        }
    }

    impl SliceBytes for Vec<u8> {
        fn len(&self) -> usize {
            Vec::len(self)
        }

        fn slice(&self, range: Range<usize>) -> Bytes {
            Bytes::copy_from_slice(&self[range])
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use crate::{ReadAt, SealingWrite};

    #[test]
    fn test_mem_writer() {
        let mut buffer = Vec::<u8>::new();
        buffer.write_all(b"k1").unwrap();
        buffer.write_all(b"v1").unwrap();
        buffer.seal().unwrap();
        assert_eq!(buffer, b"k1v1");
    }

    #[test]
    fn test_mem_reader() {
        let blob = Bytes::from_static(b"abcd123");
        assert_eq!(blob.size().unwrap(), 7);
        assert_eq!(blob.read_at(1..3).unwrap().as_ref(), b"bc");
        assert_eq!(blob.read_at(4..200).unwrap().as_ref(), b"123");
        assert!(blob.read_at(9..10).unwrap().is_empty());

        let blob = Arc::new(b"abcd123".to_vec()) as Arc<dyn ReadAt>;
        assert_eq!(blob.read_at(1..3).unwrap().as_ref(), b"bc");
    }
}
