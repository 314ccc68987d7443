//! Mock operation runner for testing.
//!
//! Returns scripted outcomes and captures every call, so recovery-loop
//! behavior can be verified without running the real tool.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::RecoveryResult;
use crate::op::TerraformOp;
use crate::runner::{CommandSpec, OperationOutcome, OperationRunner, RemediationOutcome};

/// Scripted [`OperationRunner`].
#[derive(Default)]
pub struct MockOperationRunner {
    operations: Mutex<VecDeque<OperationOutcome>>,
    remediations: Mutex<VecDeque<RemediationOutcome>>,
    calls: Mutex<Vec<String>>,
}

impl MockOperationRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome for the next operation run.
    pub fn queue_operation(self, outcome: OperationOutcome) -> Self {
        self.operations.lock().push_back(outcome);
        self
    }

    /// Queue the result for the next remediation run.
    pub fn queue_remediation(self, success: bool, output: impl Into<String>) -> Self {
        self.remediations.lock().push_back(RemediationOutcome {
            success,
            output: output.into(),
        });
        self
    }

    /// All captured calls, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of operation runs performed.
    pub fn operation_runs(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with("operation:"))
            .count()
    }

    /// Number of remediation runs performed.
    pub fn remediation_runs(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with("remediation:"))
            .count()
    }
}

#[async_trait]
impl OperationRunner for MockOperationRunner {
    async fn run_operation(&self, op: TerraformOp) -> RecoveryResult<OperationOutcome> {
        self.calls.lock().push(format!("operation:{op}"));
        let outcome = self
            .operations
            .lock()
            .pop_front()
            .unwrap_or_else(OperationOutcome::succeeded);
        Ok(outcome)
    }

    async fn run_remediation(&self, command: &CommandSpec) -> RecoveryResult<RemediationOutcome> {
        self.calls
            .lock()
            .push(format!("remediation:{}", command.describe()));
        let outcome = self
            .remediations
            .lock()
            .pop_front()
            .unwrap_or(RemediationOutcome {
                success: true,
                output: String::new(),
            });
        Ok(outcome)
    }
}
