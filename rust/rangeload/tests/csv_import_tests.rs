use std::sync::Arc;

use rangeload::{CsvRowSource, ImportConfig, Importer, RowSource, TxnHandle};
use rangeload_testkit::{
    data_gen::{
        USERS_BY_AGE, USERS_BY_NAME, USERS_TABLE, generate_users, users_schema, write_csv_splits,
    },
    stores::local_store,
};

#[test]
fn test_csv_files_import_end_to_end() {
    let rows = generate_users(1500, 21);
    let (dir, files) = write_csv_splits(&["id", "name", "age"], &rows, 3).unwrap();
    let source = CsvRowSource::new(files);
    assert_eq!(source.num_splits(), 3);

    let schema = users_schema();
    let store = Arc::new(local_store(&dir.path().join("store"), &schema).unwrap());
    let mut config = ImportConfig::new(dir.path().join("out").to_str().unwrap());
    config.sample_fraction = 0.5;
    config.sample_seed = Some(99);
    config.max_partition_size = 16 * 1024;
    config.tasks_per_partition = 2;

    let report = Importer::new(config, schema, store.clone())
        .unwrap()
        .run(&source, &TxnHandle::new(77))
        .unwrap();

    let result = report.result().unwrap();
    assert_eq!(result.rows_written, 1500);
    assert_eq!(result.bad_records, 0);
    for target in [USERS_TABLE, USERS_BY_NAME, USERS_BY_AGE] {
        assert_eq!(store.row_count(target).unwrap(), 1500);
    }

    // Primary keys are the ids 0..1500 in order.
    let table = store.scan(USERS_TABLE).unwrap();
    let ids = table
        .iter()
        .map(|(key, _)| (u64::from_be_bytes(key[1..9].try_into().unwrap()) ^ (1 << 63)) as i64)
        .collect::<Vec<_>>();
    assert_eq!(ids, (0..1500).collect::<Vec<_>>());
}

#[test]
fn test_csv_short_rows_are_bad_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.csv");
    std::fs::write(&path, "id,name,age\n1,ann,30\n2,bob\n3,cid,41\n").unwrap();

    let schema = users_schema();
    let store = Arc::new(local_store(&dir.path().join("store"), &schema).unwrap());
    let mut config = ImportConfig::new(dir.path().join("out").to_str().unwrap());
    config.max_bad_records = Some(1);

    let report = Importer::new(config, schema, store.clone())
        .unwrap()
        .run(&CsvRowSource::new(vec![path]), &TxnHandle::new(1))
        .unwrap();

    let result = report.result().unwrap();
    assert_eq!(result.rows_written, 2);
    assert_eq!(result.bad_records, 1);
    assert!(result.bad_records_location.is_some());
    assert_eq!(store.row_count(USERS_TABLE).unwrap(), 2);
}
