//! Real operation runner backed by the supervised subprocess.
//!
//! The foreground blocks on process completion while a poll timer drains
//! new output lines through the classifier into the reconciler. Stderr
//! lines are additionally collected as the captured error text handed to
//! the failure classifier.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use terrapin_engine::{classify_line, Reconciler, LOG_TAIL_CAP};
use terrapin_process::{ExitStatusInfo, LineLog, ProcessHandle, StreamSource};

use crate::error::RecoveryResult;
use crate::op::TerraformOp;
use crate::runner::{CommandSpec, OperationOutcome, OperationRunner, RemediationOutcome};

/// How often pending output lines are drained.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs the external tool in a working directory, feeding its output
/// through the engine.
pub struct TerraformRunner {
    working_dir: PathBuf,
    reconciler: Arc<Reconciler>,
    poll_interval: Duration,
    current: Mutex<Option<Arc<ProcessHandle>>>,
}

impl TerraformRunner {
    pub fn new(working_dir: impl Into<PathBuf>, reconciler: Arc<Reconciler>) -> Self {
        Self {
            working_dir: working_dir.into(),
            reconciler,
            poll_interval: POLL_INTERVAL,
            current: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Kill the currently running subprocess, if any. The pending wait
    /// observes a cancelled completion shortly after.
    pub fn cancel(&self) {
        if let Some(handle) = self.current.lock().as_ref() {
            handle.kill();
        }
    }

    /// Run `terraform show -json` over the saved plan artifact and return
    /// its stdout in full.
    pub async fn capture_plan_json(&self) -> RecoveryResult<Option<String>> {
        let op = TerraformOp::ShowPlan;
        // The plan JSON is one long line; a generous cap keeps it intact.
        let handle = ProcessHandle::spawn_with_capacity(
            op.program(),
            &op.args(),
            Some(&self.working_dir),
            10_000,
        )?;
        let status = handle.wait().await?;
        if !status.success {
            return Ok(None);
        }
        let stdout: Vec<String> = handle
            .log()
            .tail(10_000)
            .into_iter()
            .filter(|l| l.source == StreamSource::Stdout)
            .map(|l| l.text)
            .collect();
        Ok(Some(stdout.join("\n")))
    }

    async fn run_supervised(
        &self,
        program: &str,
        args: &[String],
    ) -> RecoveryResult<(Arc<ProcessHandle>, ExitStatusInfo, Vec<String>)> {
        let handle = Arc::new(ProcessHandle::spawn(
            program,
            args,
            Some(&self.working_dir),
        )?);
        *self.current.lock() = Some(handle.clone());

        let result = self.pump(&handle).await;
        *self.current.lock() = None;

        let (status, stderr_lines) = result?;
        Ok((handle, status, stderr_lines))
    }

    /// Block on completion while draining new lines on a timer. Resolves
    /// once both pipe readers have observed end-of-stream, after which
    /// the trailing lines are drained one final time.
    async fn pump(
        &self,
        handle: &ProcessHandle,
    ) -> RecoveryResult<(ExitStatusInfo, Vec<String>)> {
        let log = handle.log();
        let mut cursor = 0u64;
        let mut stderr_lines = Vec::new();

        let wait = handle.wait();
        tokio::pin!(wait);
        let status = loop {
            tokio::select! {
                result = &mut wait => break result?,
                _ = tokio::time::sleep(self.poll_interval) => {
                    cursor = self.drain(&log, cursor, &mut stderr_lines);
                }
            }
        };
        self.drain(&log, cursor, &mut stderr_lines);
        Ok((status, stderr_lines))
    }

    fn drain(&self, log: &LineLog, cursor: u64, stderr_lines: &mut Vec<String>) -> u64 {
        let (lines, next) = log.read_from(cursor);
        for line in lines {
            if line.source == StreamSource::Stderr {
                stderr_lines.push(line.text.clone());
            }
            self.reconciler.apply(&classify_line(&line.text));
        }
        next
    }

    fn collect_tail(handle: &ProcessHandle) -> String {
        handle
            .log()
            .tail(LOG_TAIL_CAP)
            .into_iter()
            .map(|l| l.text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl OperationRunner for TerraformRunner {
    async fn run_operation(&self, op: TerraformOp) -> RecoveryResult<OperationOutcome> {
        debug!("Running terraform {} in {:?}", op, self.working_dir);
        let (handle, status, stderr_lines) =
            self.run_supervised(op.program(), &op.args()).await?;

        if status.cancelled {
            return Ok(OperationOutcome::interrupted());
        }
        if status.success {
            return Ok(OperationOutcome::succeeded());
        }

        // Prefer stderr as captured error text; fall back to the log tail
        // when the tool wrote its failure to stdout.
        let detail = if stderr_lines.is_empty() {
            Self::collect_tail(&handle)
        } else {
            stderr_lines.join("\n")
        };
        let summary = stderr_lines
            .iter()
            .find(|l| l.contains("Error"))
            .cloned()
            .unwrap_or_else(|| {
                format!("terraform {} exited with status {:?}", op, status.code)
            });
        Ok(OperationOutcome::failed(summary, detail))
    }

    async fn run_remediation(&self, command: &CommandSpec) -> RecoveryResult<RemediationOutcome> {
        debug!("Running remediation '{}'", command.describe());
        let (handle, status, _) = self
            .run_supervised(&command.program, &command.args)
            .await?;
        Ok(RemediationOutcome {
            success: status.success,
            output: Self::collect_tail(&handle),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh_runner(script: &str) -> (CommandSpec, TerraformRunner) {
        let spec = CommandSpec::new("sh", vec!["-c".to_string(), script.to_string()]);
        let runner = TerraformRunner::new(".", Arc::new(Reconciler::new()))
            .with_poll_interval(Duration::from_millis(10));
        (spec, runner)
    }

    #[tokio::test]
    async fn test_remediation_reports_exit_status() {
        let (spec, runner) = sh_runner("echo remediated");
        let outcome = runner.run_remediation(&spec).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.output.contains("remediated"));

        let (spec, runner) = sh_runner("echo nope >&2; exit 1");
        let outcome = runner.run_remediation(&spec).await.unwrap();
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_supervised_run_feeds_reconciler() {
        let dir = tempfile::tempdir().unwrap();
        let reconciler = Arc::new(Reconciler::new());
        let runner = TerraformRunner::new(dir.path(), reconciler.clone())
            .with_poll_interval(Duration::from_millis(10));
        let spec = CommandSpec::new(
            "sh",
            vec![
                "-c".to_string(),
                "echo 'aws_vpc.main: Destroying...'; echo 'aws_vpc.main: Destruction complete after 3s'"
                    .to_string(),
            ],
        );
        runner.run_remediation(&spec).await.unwrap();

        let snap = reconciler.snapshot();
        assert_eq!(snap.resources.len(), 1);
        assert_eq!(snap.counters.deleted, 1);
    }
}
