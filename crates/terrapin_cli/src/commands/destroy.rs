//! Destroy command - Destroy the managed infrastructure.

use anyhow::Result;
use clap::Args;
use tracing::info;

use terrapin_recovery::TerraformOp;

use crate::commands::OpArgs;
use crate::driver::Driver;
use crate::ExitCodes;

#[derive(Args)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub op: OpArgs,

    /// Save a destroy plan before destroying
    #[arg(long)]
    pub preview: bool,
}

pub async fn execute(args: DestroyArgs) -> Result<u8> {
    info!("Destroying infrastructure in {}", args.op.dir.display());

    if args.preview {
        let previewer = Driver::new(&args.op.dir, args.op.max_attempts);
        let report = previewer.run(TerraformOp::DestroyPlan).await?;
        if report.outcome.cancelled {
            return Ok(ExitCodes::INTERRUPTED);
        }
        if !report.outcome.success {
            return Ok(ExitCodes::TERRAFORM_FAILURE);
        }
    }

    let driver = Driver::new(&args.op.dir, args.op.max_attempts);
    let report = driver.run(TerraformOp::Destroy).await?;
    if report.outcome.cancelled {
        return Ok(ExitCodes::INTERRUPTED);
    }
    if !report.outcome.success {
        return Ok(ExitCodes::TERRAFORM_FAILURE);
    }
    Ok(ExitCodes::SUCCESS)
}
