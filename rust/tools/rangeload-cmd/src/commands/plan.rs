//! Plan command implementation

use anyhow::{Result, bail};
use rangeload::{ImportMode, ImportOutcome, TxnHandle, schema::TargetId};
use serde::Serialize;

use crate::{JobArgs, commands::prepare_job};

#[derive(Serialize)]
struct PlanInfo {
    sampled_rows: u64,
    targets: Vec<TargetPlanInfo>,
}

#[derive(Serialize)]
struct TargetPlanInfo {
    id: TargetId,
    partitions: usize,
    cut_points: Vec<String>,
}

/// Run the plan command
pub fn run(args: JobArgs) -> Result<()> {
    let job = prepare_job(args, ImportMode::PlanOnly)?;
    let report = job.importer.run(&job.source, &TxnHandle::new(0))?;
    let ImportOutcome::Planned(plans) = report.outcome else {
        bail!("Unexpected outcome {:?}", report.outcome);
    };
    let info = PlanInfo {
        sampled_rows: report.summary.sampled_rows,
        targets: plans
            .iter()
            .map(|plan| TargetPlanInfo {
                id: plan.target,
                partitions: plan.num_partitions(),
                cut_points: plan.to_printable(),
            })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
