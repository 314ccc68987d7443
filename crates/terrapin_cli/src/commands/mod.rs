//! CLI command definitions.
//!
//! Each subcommand maps to one provisioning workflow: plan, apply, or
//! destroy, all driven through the same recovery loop.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub mod apply;
pub mod destroy;
pub mod plan;

/// terrapin - Terraform runner with live progress and auto-recovery
#[derive(Parser)]
#[command(name = "terrapin")]
#[command(version, about = "Terraform runner with live progress and auto-recovery")]
#[command(long_about = r#"
terrapin wraps terraform plan/apply/destroy with live progress output and
automatic recovery from well-known failure modes (uninitialized backends,
changed backend configuration, destroy-time archive errors).

WORKFLOWS:
  plan     → Plan changes, save the plan artifact and a change summary
  apply    → Plan, then apply exactly what was planned
  destroy  → Destroy the managed infrastructure

EXIT CODES:
  0   - Success
  1   - General error
  2   - Invalid arguments
  4   - Terraform operation failure
  130 - Interrupted by user
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan changes and save the plan artifact
    Plan(OpArgs),

    /// Plan, then apply the saved plan artifact
    Apply(OpArgs),

    /// Destroy the managed infrastructure
    Destroy(destroy::DestroyArgs),
}

/// Options shared by every operation.
#[derive(Args)]
pub struct OpArgs {
    /// Terraform configuration directory
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// Upper bound on operation runs when automatic recovery kicks in
    #[arg(long, default_value_t = terrapin_recovery::DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
}
