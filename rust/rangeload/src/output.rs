//! Text artifacts written next to the segments: cut-point dumps and key files.
//! Both hold one printable-binary key per line and have fixed names, so a
//! later run into the same output root replaces them.

use rangeload_common::{Result, error::Error};
use rangeload_io::{BufferedSealingWrite, SealingWrite};
use rangeload_objectstore::{ObjectStore, url::ObjectUrl};

use crate::{planner::CutPoints, printable::to_printable, schema::TargetId};

/// Line-oriented writer of printable keys. The file replaces any previous one
/// at the same location when [`finish`](Self::finish) seals it.
pub struct KeyFileWriter {
    url: ObjectUrl,
    inner: BufferedSealingWrite<Box<dyn SealingWrite>>,
    lines: u64,
}

impl KeyFileWriter {
    pub fn create(object_store: &dyn ObjectStore, url: ObjectUrl) -> Result<KeyFileWriter> {
        let file = object_store
            .replace(&url)
            .map_err(|e| Error::io(url.to_string(), e))?;
        Ok(KeyFileWriter {
            url,
            inner: BufferedSealingWrite::new(file),
            lines: 0,
        })
    }

    pub fn write_key(&mut self, key: &[u8]) -> Result<()> {
        let mut line = to_printable(key);
        line.push('\n');
        self.inner
            .write_all(line.as_bytes())
            .map_err(|e| Error::io(self.url.to_string(), e))?;
        self.lines += 1;
        Ok(())
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Seals the file and returns its location.
    pub fn finish(mut self) -> Result<ObjectUrl> {
        self.inner
            .seal()
            .map_err(|e| Error::io(self.url.to_string(), e))?;
        Ok(self.url)
    }
}

/// Writes `<root>/<target>/cutpoints`.
pub fn write_cut_points(
    object_store: &dyn ObjectStore,
    root: &ObjectUrl,
    cut_points: &CutPoints,
) -> Result<ObjectUrl> {
    let target = cut_points.target.to_string();
    let url = root.join_segments(&[target.as_str(), "cutpoints"])?;
    let mut writer = KeyFileWriter::create(object_store, url)?;
    for key in &cut_points.keys {
        writer.write_key(key)?;
    }
    writer.finish()
}

/// Location of the key file of one split: `<root>/<target>/keys/<split>.keys`.
pub fn key_file_url(root: &ObjectUrl, target: TargetId, split: usize) -> Result<ObjectUrl> {
    let target = target.to_string();
    let file = format!("{split}.keys");
    root.join_segments(&[target.as_str(), "keys", file.as_str()])
}

#[cfg(test)]
mod tests {
    use rangeload_objectstore::local_store::{LocalFsMode, LocalFsObjectStore};
    use tempfile::TempDir;

    use super::*;
    use crate::printable::from_printable;

    #[test]
    fn test_cut_point_dump() {
        let dir = TempDir::new().unwrap();
        let store = LocalFsObjectStore::new(dir.path(), LocalFsMode::Passthrough).unwrap();
        let cut_points = CutPoints {
            target: 5,
            keys: vec![vec![1, 0, 0xFF], b"plain".to_vec()],
        };
        let url = write_cut_points(&store, store.container_url(), &cut_points).unwrap();
        let content = std::fs::read_to_string(dir.path().join("5").join("cutpoints")).unwrap();
        assert_eq!(content, "\\x01\\x00\\xFF\nplain\n");
        let keys = content
            .lines()
            .map(|l| from_printable(l).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(keys, cut_points.keys);
        assert!(url.as_str().ends_with("/5/cutpoints"));

        let empty = write_cut_points(&store, store.container_url(), &CutPoints::empty(6)).unwrap();
        assert_eq!(std::fs::read(empty.to_file_path().unwrap()).unwrap(), b"");
    }

    #[test]
    fn test_key_file() {
        let dir = TempDir::new().unwrap();
        let store = LocalFsObjectStore::new(dir.path(), LocalFsMode::Passthrough).unwrap();
        let url = key_file_url(store.container_url(), 2, 7).unwrap();
        assert!(url.as_str().ends_with("/2/keys/7.keys"));
        let mut writer = KeyFileWriter::create(&store, url).unwrap();
        writer.write_key(b"a").unwrap();
        writer.write_key(b"b\n").unwrap();
        assert_eq!(writer.lines(), 2);
        let url = writer.finish().unwrap();
        let content = std::fs::read_to_string(url.to_file_path().unwrap()).unwrap();
        assert_eq!(content, "a\nb\\x0A\n");
    }

    #[test]
    fn test_cut_point_dump_is_replaced() {
        let dir = TempDir::new().unwrap();
        let store = LocalFsObjectStore::new(dir.path(), LocalFsMode::Passthrough).unwrap();
        let first = CutPoints {
            target: 9,
            keys: vec![b"m".to_vec()],
        };
        write_cut_points(&store, store.container_url(), &first).unwrap();
        let second = CutPoints {
            target: 9,
            keys: vec![b"f".to_vec(), b"p".to_vec()],
        };
        let url = write_cut_points(&store, store.container_url(), &second).unwrap();
        let content = std::fs::read_to_string(url.to_file_path().unwrap()).unwrap();
        assert_eq!(content, "f\np\n");
    }
}
