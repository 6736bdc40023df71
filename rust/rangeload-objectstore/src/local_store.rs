use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use rangeload_common::error::Error;
use rangeload_io::{
    ReadAt, SealingWrite,
    file::{FileReader, FileWriter, ReplacingFileWriter},
};
use url::Url;

use crate::{ObjectStore, url::ObjectUrl};

/// An `ObjectStore` over the local filesystem, confined to a container directory.
///
/// In `Passthrough` mode object URLs are absolute `file://` URLs on the host,
/// and access outside the container is rejected. In `VirtualRoot` mode the URL
/// path is interpreted relative to the container.
pub struct LocalFsObjectStore {
    container_path: PathBuf,
    container_url: ObjectUrl,
    mode: LocalFsMode,
}

impl LocalFsObjectStore {
    /// Creates a new `LocalFsObjectStore` rooted at `container_path`, creating
    /// the directory if needed.
    pub fn new(
        container_path: &Path,
        mode: LocalFsMode,
    ) -> rangeload_common::Result<LocalFsObjectStore> {
        let url = Url::from_directory_path(container_path).map_err(|()| {
            Error::invalid_arg(
                "container",
                format!("invalid path {container_path:?} for local object store"),
            )
        })?;
        let container_url = ObjectUrl::new(url)?;
        std::fs::create_dir_all(container_path)
            .map_err(|e| Error::io(container_path.display().to_string(), e))?;
        Ok(LocalFsObjectStore {
            container_path: container_path.to_path_buf(),
            container_url,
            mode,
        })
    }

    /// Creates a passthrough store that accepts any absolute `file://` URL.
    pub fn new_unscoped() -> rangeload_common::Result<LocalFsObjectStore> {
        Ok(LocalFsObjectStore {
            container_path: PathBuf::from("/"),
            container_url: ObjectUrl::parse("file:///")?,
            mode: LocalFsMode::Passthrough,
        })
    }

    pub fn container_path(&self) -> &Path {
        &self.container_path
    }

    pub fn container_url(&self) -> &ObjectUrl {
        &self.container_url
    }

    /// Converts an [`ObjectUrl`] within this store's container to a local path.
    pub fn url_to_path(&self, url: &ObjectUrl) -> rangeload_common::Result<PathBuf> {
        match self.mode {
            LocalFsMode::Passthrough => {
                let relative_path = self.container_url.make_relative(url).ok_or_else(|| {
                    Error::invalid_arg(
                        "url",
                        format!(
                            "object url '{}' is outside of the local fs container",
                            url.as_str()
                        ),
                    )
                })?;
                Ok(self.container_path.join(relative_path))
            }
            LocalFsMode::VirtualRoot => {
                let relative_path = url.path().trim_start_matches('/');
                Ok(self.container_path.join(relative_path))
            }
        }
    }

    fn resolve_io_path(&self, operation: &str, url: &ObjectUrl) -> std::io::Result<PathBuf> {
        self.url_to_path(url).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{operation}: invalid url: {e}"),
            )
        })
    }
}

impl ObjectStore for LocalFsObjectStore {
    fn open(&self, url: &ObjectUrl) -> std::io::Result<Arc<dyn ReadAt>> {
        let path = self.resolve_io_path("open", url)?;
        Ok(Arc::new(FileReader::open(path)?))
    }

    fn create(&self, url: &ObjectUrl) -> std::io::Result<Box<dyn SealingWrite>> {
        let path = self.resolve_io_path("create", url)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Box::new(FileWriter::create(path)?))
    }

    fn replace(&self, url: &ObjectUrl) -> std::io::Result<Box<dyn SealingWrite>> {
        let path = self.resolve_io_path("replace", url)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Box::new(ReplacingFileWriter::create(path)?))
    }
}

/// Defines how [`LocalFsObjectStore`] interprets object URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalFsMode {
    /// URLs are physical paths on the host and must reside within the container.
    Passthrough,
    /// The container acts as a virtual root; URL paths are relative to it.
    VirtualRoot,
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use rangeload_io::{ReadAt, SealingWrite};
    use tempfile::TempDir;

    use super::{LocalFsMode, LocalFsObjectStore};
    use crate::{ObjectStore, url::ObjectUrl};

    fn create_temp_fs(mode: LocalFsMode) -> (TempDir, LocalFsObjectStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let fs = LocalFsObjectStore::new(temp_dir.path(), mode).unwrap();
        (temp_dir, fs)
    }

    fn write_object(fs: &LocalFsObjectStore, url: &ObjectUrl, data: &[u8]) {
        let mut writer = fs.create(url).unwrap();
        writer.write_all(data).unwrap();
        writer.seal().unwrap();
    }

    #[test]
    fn test_passthrough_create_and_open() {
        let (temp_dir, fs) = create_temp_fs(LocalFsMode::Passthrough);
        let url = fs
            .container_url()
            .join_segments(&["1200", "0a1b", "0.seg"])
            .unwrap();
        write_object(&fs, &url, b"segment-bytes");

        assert!(temp_dir.path().join("1200/0a1b/0.seg").is_file());
        let reader = fs.open(&url).unwrap();
        assert_eq!(reader.size().unwrap(), 13);
        assert_eq!(reader.read_at(0..7).unwrap().as_ref(), b"segment");
    }

    #[test]
    fn test_passthrough_rejects_outside_container() {
        let (_temp_dir, fs) = create_temp_fs(LocalFsMode::Passthrough);
        let outside = ObjectUrl::parse("file:///etc/passwd").unwrap();
        let err = fs.open(&outside).err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        assert!(fs.create(&outside).is_err());
    }

    #[test]
    fn test_virtual_root() {
        let (temp_dir, fs) = create_temp_fs(LocalFsMode::VirtualRoot);
        let url = ObjectUrl::parse("file:///7/cutpoints").unwrap();
        write_object(&fs, &url, b"\\x00\n");
        assert_eq!(
            std::fs::read(temp_dir.path().join("7").join("cutpoints")).unwrap(),
            b"\\x00\n"
        );
        assert_eq!(
            fs.url_to_path(&url).unwrap(),
            temp_dir.path().join(Path::new("7/cutpoints"))
        );
    }

    #[test]
    fn test_create_existing_fails() {
        let (_temp_dir, fs) = create_temp_fs(LocalFsMode::Passthrough);
        let url = fs.container_url().join_segments(&["a.seg"]).unwrap();
        write_object(&fs, &url, b"1");
        let err = fs.create(&url).err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_replace_existing() {
        let (temp_dir, fs) = create_temp_fs(LocalFsMode::Passthrough);
        let url = fs.container_url().join_segments(&["3", "cutpoints"]).unwrap();
        write_object(&fs, &url, b"a\n");
        let mut writer = fs.replace(&url).unwrap();
        writer.write_all(b"b\n").unwrap();
        writer.seal().unwrap();
        assert_eq!(
            std::fs::read(temp_dir.path().join("3").join("cutpoints")).unwrap(),
            b"b\n"
        );

        let fresh = fs.container_url().join_segments(&["4", "cutpoints"]).unwrap();
        let mut writer = fs.replace(&fresh).unwrap();
        writer.write_all(b"c\n").unwrap();
        writer.seal().unwrap();
        assert!(temp_dir.path().join("4").join("cutpoints").is_file());
        assert!(fs.replace(&ObjectUrl::parse("file:///etc/x").unwrap()).is_err());
    }

    #[test]
    fn test_open_missing_fails() {
        let (_temp_dir, fs) = create_temp_fs(LocalFsMode::Passthrough);
        let url = fs.container_url().join_segments(&["missing.seg"]).unwrap();
        let err = fs.open(&url).err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_unscoped_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let container = ObjectUrl::from_directory_path(temp_dir.path()).unwrap();
        let url = container.join_segments(&["bad-1.ndjson"]).unwrap();

        let fs = LocalFsObjectStore::new_unscoped().unwrap();
        write_object(&fs, &url, b"{}\n");
        assert_eq!(
            std::fs::read(temp_dir.path().join("bad-1.ndjson")).unwrap(),
            b"{}\n"
        );
    }
}
