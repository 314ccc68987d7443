//! The bounded recovery loop and the operation-runner seam it drives.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use terrapin_engine::Reconciler;

use crate::error::RecoveryResult;
use crate::op::TerraformOp;
use crate::signature::{classify_failure, FailureClass, Remediation};

/// Default bound on operation attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// A concrete command to execute (remediations, mostly).
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn describe(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

impl From<Remediation> for CommandSpec {
    fn from(remediation: Remediation) -> Self {
        Self::new(remediation.program(), remediation.args())
    }
}

/// Terminal result of one operation run.
#[derive(Debug, Clone, Serialize)]
pub struct OperationOutcome {
    pub success: bool,
    pub cancelled: bool,
    pub error_summary: Option<String>,
    pub error_detail: Option<String>,
}

impl OperationOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            cancelled: false,
            error_summary: None,
            error_detail: None,
        }
    }

    pub fn interrupted() -> Self {
        Self {
            success: false,
            cancelled: true,
            error_summary: Some("Operation interrupted by user".to_string()),
            error_detail: None,
        }
    }

    pub fn failed(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            cancelled: false,
            error_summary: Some(summary.into()),
            error_detail: Some(detail.into()),
        }
    }

    /// Text fed to the failure classifier.
    pub fn error_text(&self) -> String {
        self.error_detail
            .clone()
            .or_else(|| self.error_summary.clone())
            .unwrap_or_default()
    }
}

/// Result of running a remediation command.
#[derive(Debug, Clone)]
pub struct RemediationOutcome {
    pub success: bool,
    pub output: String,
}

/// Seam between the recovery loop and real subprocess execution. Tests
/// substitute [`crate::mock::MockOperationRunner`].
#[async_trait]
pub trait OperationRunner: Send + Sync {
    /// Run one full operation, streaming its output through the engine.
    async fn run_operation(&self, op: TerraformOp) -> RecoveryResult<OperationOutcome>;

    /// Run one remediation command to completion.
    async fn run_remediation(&self, command: &CommandSpec) -> RecoveryResult<RemediationOutcome>;
}

#[async_trait]
impl<T: OperationRunner + ?Sized> OperationRunner for Arc<T> {
    async fn run_operation(&self, op: TerraformOp) -> RecoveryResult<OperationOutcome> {
        (**self).run_operation(op).await
    }

    async fn run_remediation(&self, command: &CommandSpec) -> RecoveryResult<RemediationOutcome> {
        (**self).run_remediation(command).await
    }
}

/// One recorded recovery step.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryAttempt {
    /// The operation run (1-based) whose failure triggered this step.
    pub attempt: u32,
    /// The signature that matched.
    pub matched: String,
    pub remediation: Remediation,
    pub remediation_succeeded: bool,
}

/// Final report returned across the core boundary.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub outcome: OperationOutcome,
    pub attempts: Vec<RecoveryAttempt>,
    /// How many times the operation itself was run.
    pub runs: u32,
}

/// Bounded run / classify / remediate / re-run loop.
///
/// There is no backoff: the failures this loop handles are deterministic
/// configuration issues, not transient load. The external tool is not
/// resumable at finer granularity, so every retry re-runs the whole
/// operation from the top.
pub struct RecoveryLoop<R> {
    runner: R,
    reconciler: Arc<Reconciler>,
    max_attempts: u32,
}

impl<R: OperationRunner> RecoveryLoop<R> {
    pub fn new(runner: R, reconciler: Arc<Reconciler>) -> Self {
        Self {
            runner,
            reconciler,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Drive the operation to a terminal result.
    pub async fn run(&self, op: TerraformOp) -> RecoveryResult<RecoveryReport> {
        let mut attempts: Vec<RecoveryAttempt> = Vec::new();
        let mut last_outcome: Option<OperationOutcome> = None;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                self.reconciler.reset_for_retry();
            }

            let outcome = self.runner.run_operation(op).await?;

            if outcome.success {
                self.reconciler.finish(true);
                return Ok(RecoveryReport {
                    outcome,
                    attempts,
                    runs: attempt,
                });
            }

            if outcome.cancelled {
                // Explicit user interrupt: clean shutdown, never a retry.
                info!("Operation cancelled, skipping recovery");
                self.reconciler.finish(false);
                return Ok(RecoveryReport {
                    outcome,
                    attempts,
                    runs: attempt,
                });
            }

            match classify_failure(&outcome.error_text()) {
                FailureClass::BenignWarning { matched } => {
                    warn!("Ignoring warning-only failure output: {}", matched);
                    self.reconciler.finish(true);
                    return Ok(RecoveryReport {
                        outcome: OperationOutcome {
                            success: true,
                            cancelled: false,
                            error_summary: Some(matched),
                            error_detail: None,
                        },
                        attempts,
                        runs: attempt,
                    });
                }
                FailureClass::Unrecoverable { detail } => {
                    self.reconciler.finish(false);
                    let summary = outcome
                        .error_summary
                        .clone()
                        .unwrap_or_else(|| "Operation failed".to_string());
                    return Ok(RecoveryReport {
                        outcome: OperationOutcome {
                            success: false,
                            cancelled: false,
                            error_summary: Some(summary),
                            error_detail: Some(detail),
                        },
                        attempts,
                        runs: attempt,
                    });
                }
                FailureClass::Recoverable {
                    remediation,
                    matched,
                } => {
                    last_outcome = Some(outcome);
                    if attempt == self.max_attempts {
                        break;
                    }

                    self.reconciler.mark_recovering();
                    let command = CommandSpec::from(remediation);
                    info!(
                        "Recovery attempt {}/{}: running '{}'",
                        attempt,
                        self.max_attempts,
                        command.describe()
                    );

                    let result = self.runner.run_remediation(&command).await?;
                    if !result.success {
                        // A failed remediation is reported but does not
                        // consume an attempt; the next operation run will
                        // fail and be classified again.
                        warn!("Remediation '{}' failed", command.describe());
                    }
                    attempts.push(RecoveryAttempt {
                        attempt,
                        matched,
                        remediation,
                        remediation_succeeded: result.success,
                    });
                }
            }
        }

        // Recoverable every time, still failing: give up.
        self.reconciler.finish(false);
        let base = last_outcome.unwrap_or_else(|| {
            OperationOutcome::failed("Operation failed", String::new())
        });
        let summary = format!(
            "Operation still failing after {} attempts: {}",
            self.max_attempts,
            base.error_summary.as_deref().unwrap_or("unknown error")
        );
        Ok(RecoveryReport {
            outcome: OperationOutcome {
                success: false,
                cancelled: false,
                error_summary: Some(summary),
                error_detail: base.error_detail,
            },
            attempts,
            runs: self.max_attempts,
        })
    }
}
