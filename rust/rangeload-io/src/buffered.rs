//! Buffering adapter for [`SealingWrite`].

use crate::{SealingWrite, StorageProfile};

/// Accumulates small appends into blocks sized according to the storage profile
/// of the wrapped writer, and forwards them as a single `write_all` call.
///
/// `seal()` flushes the pending block before sealing the inner writer. Dropping
/// a `BufferedSealingWrite` without sealing discards the pending block.
pub struct BufferedSealingWrite<W: SealingWrite> {
    inner: W,
    buf: Vec<u8>,
    block_size: usize,
    written: u64,
}

impl<W: SealingWrite> BufferedSealingWrite<W> {
    pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

    pub fn new(inner: W) -> BufferedSealingWrite<W> {
        let block_size = inner
            .storage_profile()
            .clamp_io_size(Self::DEFAULT_BLOCK_SIZE);
        Self::with_block_size(inner, block_size)
    }

    pub fn with_block_size(inner: W, block_size: usize) -> BufferedSealingWrite<W> {
        let block_size = block_size.max(1);
        BufferedSealingWrite {
            inner,
            buf: Vec::with_capacity(block_size),
            block_size,
            written: 0,
        }
    }

    /// Total number of bytes appended so far, including the pending block.
    pub fn position(&self) -> u64 {
        self.written
    }

    fn flush_block(&mut self) -> std::io::Result<()> {
        if !self.buf.is_empty() {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }
}

impl<W: SealingWrite> SealingWrite for BufferedSealingWrite<W> {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        if self.buf.len() + buf.len() > self.block_size {
            self.flush_block()?;
        }
        if buf.len() >= self.block_size {
            self.inner.write_all(buf)?;
        } else {
            self.buf.extend_from_slice(buf);
        }
        self.written += buf.len() as u64;
        Ok(())
    }

    fn seal(&mut self) -> std::io::Result<()> {
        self.flush_block()?;
        self.inner.seal()
    }

    fn storage_profile(&self) -> StorageProfile {
        self.inner.storage_profile()
    }
}

#[cfg(test)]
mod tests {
    use super::BufferedSealingWrite;
    use crate::{SealingWrite, StorageProfile};

    struct CountingWriter {
        data: Vec<u8>,
        calls: usize,
        sealed: bool,
    }

    impl SealingWrite for CountingWriter {
        fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
            self.calls += 1;
            self.data.extend_from_slice(buf);
            Ok(())
        }

        fn seal(&mut self) -> std::io::Result<()> {
            self.sealed = true;
            Ok(())
        }

        fn storage_profile(&self) -> StorageProfile {
            Default::default()
        }
    }

    #[test]
    fn test_buffered_appends() {
        let inner = CountingWriter {
            data: Vec::new(),
            calls: 0,
            sealed: false,
        };
        let mut writer = BufferedSealingWrite::with_block_size(inner, 16);
        for i in 0..20u8 {
            writer.write_all(&[i, i]).unwrap();
        }
        writer.write_all(&[0xAA; 40]).unwrap();
        assert_eq!(writer.position(), 80);
        writer.seal().unwrap();

        let inner = writer.inner;
        assert!(inner.sealed);
        assert_eq!(inner.data.len(), 80);
        assert_eq!(&inner.data[..4], &[0, 0, 1, 1]);
        assert_eq!(&inner.data[40..], &[0xAA; 40]);
        assert!(inner.calls < 10);
    }
}
