//! Local sort and segment write of one shuffle bucket.

use rangeload_common::{Result, error::Error};
use rangeload_objectstore::ObjectStore;
use rangeload_segment::SegmentWriter;

use crate::{resolver::PartitionBoundary, row::EncodedRow, store::SegmentRef, txn::TxnHandle};

/// Sorts `rows` by key and writes them to `<boundary dir>/<sub_task>.seg`.
///
/// The sort is stable: rows with equal keys keep their arrival order. The
/// segment is sealed before its reference is returned.
pub fn sort_and_write(
    object_store: &dyn ObjectStore,
    boundary: &PartitionBoundary,
    sub_task: usize,
    mut rows: Vec<EncodedRow>,
    txn: &TxnHandle,
) -> Result<SegmentRef> {
    rows.sort_by(|a, b| a.key.cmp(&b.key));

    let file = format!("{sub_task}.seg");
    let url = boundary.directory.join_segments(&[file.as_str()])?;
    let out = object_store
        .create(&url)
        .map_err(|e| Error::io(url.to_string(), e))?;
    let mut writer = SegmentWriter::new(out, boundary.target, txn.id())?;
    for row in &rows {
        debug_assert_eq!(row.target, boundary.target);
        writer.append(&row.key, &row.value)?;
    }
    let footer = writer.finish()?;
    Ok(SegmentRef {
        boundary: boundary.range.clone(),
        url,
        record_count: footer.record_count,
        sub_task,
    })
}
