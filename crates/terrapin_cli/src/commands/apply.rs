//! Apply command - Plan, then apply exactly what was planned.

use anyhow::Result;
use tracing::info;

use terrapin_recovery::TerraformOp;

use crate::commands::{plan, OpArgs};
use crate::driver::Driver;
use crate::ExitCodes;

pub async fn execute(args: OpArgs) -> Result<u8> {
    info!("Applying changes in {}", args.dir.display());

    // Stage 1: plan and save the artifact.
    let planner = Driver::new(&args.dir, args.max_attempts);
    let report = planner.run(TerraformOp::Plan).await?;
    if report.outcome.cancelled {
        return Ok(ExitCodes::INTERRUPTED);
    }
    if !report.outcome.success {
        return Ok(ExitCodes::TERRAFORM_FAILURE);
    }

    if let Some(summary) = planner.save_plan_summary().await? {
        plan::print_counts(&summary.summary);
        if summary.summary.total == 0 {
            println!("✅ No changes. Infrastructure is up-to-date.");
            return Ok(ExitCodes::SUCCESS);
        }
    }

    // Stage 2: apply the saved artifact with the JSON event stream.
    let applier = Driver::new(&args.dir, args.max_attempts);
    let report = applier.run(TerraformOp::Apply).await?;
    if report.outcome.cancelled {
        return Ok(ExitCodes::INTERRUPTED);
    }
    if !report.outcome.success {
        return Ok(ExitCodes::TERRAFORM_FAILURE);
    }
    Ok(ExitCodes::SUCCESS)
}
