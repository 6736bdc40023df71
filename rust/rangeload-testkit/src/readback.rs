//! Reading segment files back.

use std::{path::Path, sync::Arc};

use rangeload_io::file::FileReader;
use rangeload_objectstore::url::ObjectUrl;
use rangeload_segment::{SegmentFooter, SegmentReader};

/// Verifies the segment at `path` and returns its footer and records.
pub fn read_segment(path: &Path) -> anyhow::Result<(SegmentFooter, Vec<(Vec<u8>, Vec<u8>)>)> {
    let reader = SegmentReader::open(Arc::new(FileReader::open(path)?))?;
    reader.verify()?;
    let records = reader
        .records()?
        .map(|r| r.map(|(k, v)| (k.to_vec(), v.to_vec())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((reader.footer().clone(), records))
}

pub fn read_segment_url(url: &ObjectUrl) -> anyhow::Result<(SegmentFooter, Vec<(Vec<u8>, Vec<u8>)>)> {
    let path = url
        .to_file_path()
        .map_err(|()| anyhow::anyhow!("{url} is not a file url"))?;
    read_segment(&path)
}

/// Every `*.seg` file under `dir`, recursively, in path order.
pub fn find_segments(dir: &Path) -> anyhow::Result<Vec<std::path::PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "seg") {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

pub fn is_sorted_by_key(records: &[(Vec<u8>, Vec<u8>)]) -> bool {
    records.windows(2).all(|w| w[0].0 <= w[1].0)
}
