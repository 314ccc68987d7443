//! Spawning and supervising the external provisioning tool.
//!
//! The supervisor owns the subprocess lifecycle: both pipes are drained by
//! background tasks into one shared [`LineLog`], and completion is reported
//! only after both readers observe end-of-stream so trailing lines are
//! never lost.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ProcessError, ProcessResult};
use crate::line_log::{LineLog, OutputLine, StreamSource};

/// Default cap on the shared line buffer.
pub const DEFAULT_LINE_CAP: usize = 1000;

/// Final status of a supervised subprocess.
#[derive(Debug, Clone, Copy)]
pub struct ExitStatusInfo {
    /// OS exit code, if the process exited normally.
    pub code: Option<i32>,
    /// True only for a clean zero exit that was not cancelled.
    pub success: bool,
    /// True if [`ProcessHandle::kill`] was called before completion.
    pub cancelled: bool,
}

/// Handle to a running subprocess.
pub struct ProcessHandle {
    log: Arc<LineLog>,
    cancelled: Arc<AtomicBool>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    readers: Mutex<Vec<JoinHandle<()>>>,
    waiter: Mutex<Option<JoinHandle<std::io::Result<ExitStatus>>>>,
}

impl ProcessHandle {
    /// Spawn `program args...` in `working_dir` with both pipes captured.
    pub fn spawn(
        program: &str,
        args: &[String],
        working_dir: Option<&Path>,
    ) -> ProcessResult<Self> {
        Self::spawn_with_capacity(program, args, working_dir, DEFAULT_LINE_CAP)
    }

    /// Spawn with a custom line buffer capacity.
    pub fn spawn_with_capacity(
        program: &str,
        args: &[String],
        working_dir: Option<&Path>,
        capacity: usize,
    ) -> ProcessResult<Self> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        info!("Spawning '{} {}'", program, args.join(" "));

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or(ProcessError::MissingPipe("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(ProcessError::MissingPipe("stderr"))?;

        let log = Arc::new(LineLog::new(capacity));
        let readers = vec![
            spawn_reader(log.clone(), StreamSource::Stdout, stdout),
            spawn_reader(log.clone(), StreamSource::Stderr, stderr),
        ];

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let waiter = tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    debug!("Kill requested, terminating subprocess");
                    if let Err(e) = child.start_kill() {
                        warn!("Failed to kill subprocess: {}", e);
                    }
                    child.wait().await
                }
            }
        });

        Ok(Self {
            log,
            cancelled: Arc::new(AtomicBool::new(false)),
            kill_tx: Mutex::new(Some(kill_tx)),
            readers: Mutex::new(readers),
            waiter: Mutex::new(Some(waiter)),
        })
    }

    /// Shared output buffer, readable while the process runs.
    pub fn log(&self) -> Arc<LineLog> {
        self.log.clone()
    }

    /// Request termination. Closing the pipes unblocks both readers, so a
    /// pending [`wait`](Self::wait) observes completion shortly after.
    pub fn kill(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(tx) = self.kill_tx.lock().take() {
            let _ = tx.send(());
        }
    }

    /// True once [`kill`](Self::kill) has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait for completion. Resolves only after both pipe readers have
    /// observed end-of-stream, then reports the exit status.
    pub async fn wait(&self) -> ProcessResult<ExitStatusInfo> {
        let readers: Vec<JoinHandle<()>> = {
            let mut guard = self.readers.lock();
            guard.drain(..).collect()
        };
        for reader in readers {
            reader
                .await
                .map_err(|e| ProcessError::TaskJoin(e.to_string()))?;
        }

        let waiter = self
            .waiter
            .lock()
            .take()
            .ok_or(ProcessError::AlreadyWaited)?;
        let status = waiter
            .await
            .map_err(|e| ProcessError::TaskJoin(e.to_string()))??;

        let cancelled = self.cancelled.load(Ordering::SeqCst);
        let info = ExitStatusInfo {
            code: status.code(),
            success: status.success() && !cancelled,
            cancelled,
        };
        debug!(
            "Subprocess finished: code={:?} cancelled={}",
            info.code, info.cancelled
        );
        Ok(info)
    }
}

fn spawn_reader(
    log: Arc<LineLog>,
    source: StreamSource,
    stream: impl AsyncRead + Unpin + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            log.push(OutputLine::new(source, line));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> (String, Vec<String>) {
        ("sh".to_string(), vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr_tagged() {
        let (program, args) = sh("echo out-line; echo err-line >&2");
        let handle = ProcessHandle::spawn(&program, &args, None).unwrap();
        let status = handle.wait().await.unwrap();
        assert!(status.success);

        let lines = handle.log().tail(10);
        assert_eq!(lines.len(), 2);
        assert!(lines
            .iter()
            .any(|l| l.source == StreamSource::Stdout && l.text == "out-line"));
        assert!(lines
            .iter()
            .any(|l| l.source == StreamSource::Stderr && l.text == "err-line"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_reported() {
        let (program, args) = sh("exit 3");
        let handle = ProcessHandle::spawn(&program, &args, None).unwrap();
        let status = handle.wait().await.unwrap();
        assert!(!status.success);
        assert!(!status.cancelled);
        assert_eq!(status.code, Some(3));
    }

    #[tokio::test]
    async fn test_trailing_lines_not_lost() {
        let (program, args) = sh("for i in 1 2 3 4 5; do echo line-$i; done");
        let handle = ProcessHandle::spawn(&program, &args, None).unwrap();
        handle.wait().await.unwrap();
        // All lines must be visible once wait() resolves.
        assert_eq!(handle.log().total_appended(), 5);
    }

    #[tokio::test]
    async fn test_kill_unblocks_wait_within_bounded_time() {
        let (program, args) = sh("echo started; sleep 60");
        let handle = ProcessHandle::spawn(&program, &args, None).unwrap();

        // Give the process a moment to start, then kill it.
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.kill();

        let status = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("wait() must unblock after kill")
            .unwrap();
        assert!(status.cancelled);
        assert!(!status.success);
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (program, args) = sh("pwd");
        let handle = ProcessHandle::spawn(&program, &args, Some(dir.path())).unwrap();
        handle.wait().await.unwrap();

        let lines = handle.log().tail(1);
        let printed = std::fs::canonicalize(&lines[0].text).unwrap();
        assert_eq!(printed, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn test_spawn_missing_program_errors() {
        let args: Vec<String> = Vec::new();
        let result = ProcessHandle::spawn("terrapin-does-not-exist", &args, None);
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_wait_twice_errors() {
        let (program, args) = sh("true");
        let handle = ProcessHandle::spawn(&program, &args, None).unwrap();
        handle.wait().await.unwrap();
        assert!(matches!(
            handle.wait().await,
            Err(ProcessError::AlreadyWaited)
        ));
    }
}
