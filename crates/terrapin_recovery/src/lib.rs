//! # terrapin_recovery
//!
//! Bounded automatic recovery around the external provisioning tool:
//! classifies captured failure text against known recoverable signatures,
//! runs the matching remediation, and re-runs the whole operation, up to
//! a fixed attempt budget.
//!
//! Classification and retries are entirely internal; only a terminal
//! [`RecoveryReport`] crosses the boundary.

pub mod error;
pub mod mock;
pub mod op;
pub mod runner;
pub mod signature;
pub mod terraform;

pub use error::{RecoveryError, RecoveryResult};
pub use op::{TerraformOp, DESTROY_PLAN_ARTIFACT, PLAN_ARTIFACT};
pub use runner::{
    CommandSpec, OperationOutcome, OperationRunner, RecoveryAttempt, RecoveryLoop, RecoveryReport,
    RemediationOutcome, DEFAULT_MAX_ATTEMPTS,
};
pub use signature::{classify_failure, strip_ansi, FailureClass, Remediation};
pub use terraform::TerraformRunner;
