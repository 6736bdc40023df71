//! Command implementations for rangeload-cmd

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use rangeload::{
    CsvRowSource, ImportConfig, ImportMode, Importer, LocalRangeStore, TableSchema,
};

use crate::JobArgs;

pub mod import;
pub mod inspect;
pub mod plan;

/// Everything an import or a plan run needs.
pub struct Job {
    pub importer: Importer,
    pub source: CsvRowSource,
    pub store: Arc<LocalRangeStore>,
    pub schema: TableSchema,
}

/// Loads the schema and the configuration, opens the store with every target
/// of the schema registered and prepares the CSV source. Command-line options
/// override the configuration file; the merged configuration is validated by
/// [`Importer::new`].
pub fn prepare_job(args: JobArgs, mode: ImportMode) -> Result<Job> {
    let schema_json = std::fs::read_to_string(&args.schema)
        .with_context(|| format!("Failed to read schema {}", args.schema.display()))?;
    let schema = TableSchema::from_json(&schema_json).context("Invalid table schema")?;

    let mut config = match &args.config {
        Some(path) => ImportConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => ImportConfig::default(),
    };
    if let Some(output) = args.output {
        config.output_root = output;
    }
    config.mode = mode;

    if !args.delimiter.is_ascii() {
        bail!("The delimiter must be an ASCII character: {:?}", args.delimiter);
    }
    for file in &args.file {
        if !file.is_file() {
            bail!("Source file not found: {}", file.display());
        }
    }

    let store = Arc::new(
        LocalRangeStore::open(&args.store)
            .with_context(|| format!("Failed to open store {}", args.store.display()))?,
    );
    for target in schema.targets()? {
        store.ensure_target(target.id)?;
    }

    let importer = Importer::new(config, schema.clone(), store.clone())
        .context("Invalid import configuration")?;
    let source = CsvRowSource::new(args.file)
        .with_headers(!args.no_headers)
        .with_delimiter(args.delimiter as u8);
    Ok(Job {
        importer,
        source,
        store,
        schema,
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use rangeload::{ImportOutcome, PartitionStore, TxnHandle};

    use super::*;

    const SCHEMA: &str = r#"{
        "table_id": 1,
        "name": "users",
        "columns": [
            {"name": "id", "data_type": "int64", "nullable": false},
            {"name": "name", "data_type": "utf8"}
        ],
        "primary_key": ["id"],
        "indexes": [{"id": 2, "name": "by_name", "columns": [{"name": "name"}]}]
    }"#;

    fn job_args(dir: &Path) -> JobArgs {
        let schema = dir.join("schema.json");
        std::fs::write(&schema, SCHEMA).unwrap();
        let file = dir.join("users.csv");
        std::fs::write(&file, "id;name\n1;ann\n2;bob\n3;\n").unwrap();
        JobArgs {
            schema,
            config: None,
            output: Some(dir.join("out").to_str().unwrap().to_string()),
            store: dir.join("store"),
            file: vec![file],
            no_headers: false,
            delimiter: ';',
        }
    }

    #[test]
    fn test_prepare_and_import() {
        let dir = tempfile::tempdir().unwrap();
        let job = prepare_job(job_args(dir.path()), ImportMode::Full).unwrap();
        assert_eq!(job.store.list_partitions(1).unwrap().len(), 1);
        assert_eq!(job.store.list_partitions(2).unwrap().len(), 1);

        let report = job.importer.run(&job.source, &TxnHandle::new(1)).unwrap();
        assert_eq!(report.result().unwrap().rows_written, 3);
        assert_eq!(job.store.row_count(1).unwrap(), 3);
        assert_eq!(job.store.row_count(2).unwrap(), 3);
    }

    #[test]
    fn test_prepare_plan_only() {
        let dir = tempfile::tempdir().unwrap();
        let job = prepare_job(job_args(dir.path()), ImportMode::PlanOnly).unwrap();
        let report = job.importer.run(&job.source, &TxnHandle::new(1)).unwrap();
        assert!(matches!(report.outcome, ImportOutcome::Planned(ref plans) if plans.len() == 2));
        assert_eq!(job.store.row_count(1).unwrap(), 0);
    }

    #[test]
    fn test_prepare_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = job_args(dir.path());
        args.file.push(dir.path().join("missing.csv"));
        let err = prepare_job(args, ImportMode::Full).err().unwrap();
        assert!(err.to_string().contains("missing.csv"));
    }

    #[test]
    fn test_output_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = job_args(dir.path());
        let config = dir.path().join("config.json");
        std::fs::write(&config, r#"{"sample_fraction": 0.5, "tasks_per_partition": 2}"#).unwrap();
        args.config = Some(config);

        let job = prepare_job(args, ImportMode::Full).unwrap();
        assert_eq!(job.importer.config().sample_fraction, 0.5);
        assert_eq!(job.importer.config().tasks_per_partition, 2);
        assert!(job.importer.output_root().as_str().ends_with("/out/"));

        let report = job.importer.run(&job.source, &TxnHandle::new(1)).unwrap();
        assert_eq!(report.result().unwrap().rows_written, 3);
    }

    #[test]
    fn test_invalid_config_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = job_args(dir.path());
        let config = dir.path().join("config.json");
        std::fs::write(&config, r#"{"sample_fraction": 2.0}"#).unwrap();
        args.config = Some(config);
        let err = prepare_job(args, ImportMode::Full).err().unwrap();
        assert!(format!("{err:#}").contains("sample_fraction"));
    }

    #[test]
    fn test_prepare_requires_output_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = job_args(dir.path());
        args.output = None;
        assert!(prepare_job(args, ImportMode::Full).is_err());
    }
}
