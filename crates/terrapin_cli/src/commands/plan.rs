//! Plan command - Plan changes and save the artifact.

use anyhow::Result;
use tracing::info;

use terrapin_engine::PlanCounts;
use terrapin_recovery::TerraformOp;

use crate::commands::OpArgs;
use crate::driver::Driver;
use crate::ExitCodes;

pub async fn execute(args: OpArgs) -> Result<u8> {
    info!("Planning changes in {}", args.dir.display());

    let driver = Driver::new(&args.dir, args.max_attempts);
    let report = driver.run(TerraformOp::Plan).await?;

    if report.outcome.cancelled {
        return Ok(ExitCodes::INTERRUPTED);
    }
    if !report.outcome.success {
        return Ok(ExitCodes::TERRAFORM_FAILURE);
    }

    if let Some(summary) = driver.save_plan_summary().await? {
        print_counts(&summary.summary);
    }
    Ok(ExitCodes::SUCCESS)
}

pub(crate) fn print_counts(counts: &PlanCounts) {
    println!(
        "📋 Plan: {} to add, {} to change, {} to destroy ({} replacements, {} changes total)",
        counts.create, counts.update, counts.delete, counts.replace, counts.total
    );
}
