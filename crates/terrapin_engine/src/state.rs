//! Operation state and the reconciler that folds events into it.

use std::collections::HashMap;
use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::event::{DiagnosticInfo, Event, LogLevel, ResourceAction};
use crate::phase::Phase;

/// Bounded log tail kept in the operation state.
pub const LOG_TAIL_CAP: usize = 100;

/// Window for reconstructing error detail from nearby log lines when a
/// resource fails without a structured diagnostic.
const ERROR_SCAN_WINDOW_SECS: i64 = 2;

/// Lifecycle of one resource within one attempt. Only ever advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Pending,
    Active,
    Done,
    Failed,
}

impl ResourceStatus {
    fn rank(self) -> u8 {
        match self {
            ResourceStatus::Pending => 0,
            ResourceStatus::Active => 1,
            ResourceStatus::Done => 2,
            ResourceStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ResourceStatus::Done | ResourceStatus::Failed)
    }
}

/// Per-resource record, created on first reference and updated in place.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceRecord {
    pub address: String,
    pub action: ResourceAction,
    pub status: ResourceStatus,
    pub started_at: DateTime<Utc>,
    /// Latest elapsed time reported by the tool while active.
    pub elapsed_seconds: f64,
    /// Final duration, recorded on completion.
    pub duration_seconds: Option<f64>,
    pub error_summary: Option<String>,
    pub error_detail: Option<String>,
}

impl ResourceRecord {
    fn new(address: &str, action: ResourceAction, status: ResourceStatus) -> Self {
        Self {
            address: address.to_string(),
            action,
            status,
            started_at: Utc::now(),
            elapsed_seconds: 0.0,
            duration_seconds: None,
            error_summary: None,
            error_detail: None,
        }
    }
}

/// Running totals over one attempt.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Counters {
    pub created: u32,
    pub updated: u32,
    pub deleted: u32,
    pub replaced: u32,
    pub errors: u32,
    pub warnings: u32,
}

/// One retained log line.
#[derive(Debug, Clone, Serialize)]
pub struct LogLine {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Read-only copy of the operation state for presentation and the
/// recovery loop. Taking a snapshot holds the state lock only for the
/// copy, never across rendering.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub phase: Phase,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    /// Resources in first-reference order.
    pub resources: Vec<ResourceRecord>,
    pub counters: Counters,
    pub log_tail: Vec<LogLine>,
}

struct OperationState {
    phase: Phase,
    attempt: u32,
    started_at: DateTime<Utc>,
    records: HashMap<String, ResourceRecord>,
    order: Vec<String>,
    diagnostics: HashMap<String, DiagnosticInfo>,
    log_tail: VecDeque<LogLine>,
    counters: Counters,
}

impl OperationState {
    fn new() -> Self {
        Self {
            phase: Phase::Initializing,
            attempt: 1,
            started_at: Utc::now(),
            records: HashMap::new(),
            order: Vec::new(),
            diagnostics: HashMap::new(),
            log_tail: VecDeque::new(),
            counters: Counters::default(),
        }
    }

    fn push_log(&mut self, level: LogLevel, message: String) {
        if self.log_tail.len() == LOG_TAIL_CAP {
            self.log_tail.pop_front();
        }
        self.log_tail.push_back(LogLine {
            at: Utc::now(),
            level,
            message,
        });
    }

    fn record_entry(&mut self, address: &str, action: ResourceAction) -> &mut ResourceRecord {
        if !self.records.contains_key(address) {
            self.order.push(address.to_string());
            self.records.insert(
                address.to_string(),
                ResourceRecord::new(address, action, ResourceStatus::Pending),
            );
        }
        self.records.get_mut(address).expect("just inserted")
    }

    /// Best-effort reconstruction of error detail from error-level log
    /// lines near the failure instant. Heuristic by design.
    fn scan_recent_errors(&self, failed_at: DateTime<Utc>) -> Option<String> {
        let window = Duration::seconds(ERROR_SCAN_WINDOW_SECS);
        let lines: Vec<&str> = self
            .log_tail
            .iter()
            .filter(|l| l.level == LogLevel::Error)
            .filter(|l| (failed_at - l.at).abs() <= window)
            .map(|l| l.message.as_str())
            .collect();
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

/// Folds the event stream into the operation state under one coarse lock.
pub struct Reconciler {
    state: Mutex<OperationState>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(OperationState::new()),
        }
    }

    /// Apply one event.
    pub fn apply(&self, event: &Event) {
        let mut state = self.state.lock();
        match event {
            Event::ResourceStart { address, action } => {
                // Resource activity is itself a phase signal.
                state.phase = state.phase.advanced_to(Phase::Executing);
                let record = state.record_entry(address, *action);
                // Duplicate starts are idempotent: the first start wins.
                if record.status == ResourceStatus::Pending {
                    record.status = ResourceStatus::Active;
                    record.started_at = Utc::now();
                }
                state.push_log(
                    LogLevel::Info,
                    format!("{address}: {action:?} started"),
                );
            }
            Event::ResourceProgress {
                address,
                elapsed_seconds,
            } => {
                if let Some(record) = state.records.get_mut(address) {
                    if record.status == ResourceStatus::Active {
                        record.elapsed_seconds = *elapsed_seconds;
                    }
                }
            }
            Event::ResourceComplete {
                address,
                action,
                success,
                elapsed_seconds,
                message,
            } => {
                self.apply_complete(
                    &mut state,
                    address,
                    *action,
                    *success,
                    *elapsed_seconds,
                    message,
                );
            }
            Event::Diagnostic(diag) => {
                self.apply_diagnostic(&mut state, diag);
            }
            Event::PhaseHint(next) => {
                let advanced = state.phase.advanced_to(*next);
                if advanced != state.phase {
                    debug!("Phase {:?} -> {:?}", state.phase, advanced);
                    state.phase = advanced;
                }
            }
            Event::Log { level, message } => {
                state.push_log(*level, message.clone());
            }
        }
    }

    fn apply_complete(
        &self,
        state: &mut OperationState,
        address: &str,
        action: ResourceAction,
        success: bool,
        elapsed_seconds: f64,
        message: &str,
    ) {
        state.phase = state.phase.advanced_to(Phase::Executing);
        // Completion for an unseen address still creates its record.
        let current = state.record_entry(address, action).status;
        let next = if success {
            ResourceStatus::Done
        } else {
            ResourceStatus::Failed
        };
        // Status never moves backwards within one attempt.
        if next.rank() <= current.rank() {
            return;
        }

        // A diagnostic attaches to at most one failure transition.
        let diagnostic = if success {
            None
        } else {
            state.diagnostics.remove(address)
        };
        let failed_at = Utc::now();
        let scanned = if !success && diagnostic.is_none() {
            state.scan_recent_errors(failed_at)
        } else {
            None
        };

        let record = state.records.get_mut(address).expect("entry exists");
        record.status = next;
        record.duration_seconds = Some(elapsed_seconds);
        if !success {
            match diagnostic {
                Some(diag) => {
                    record.error_summary = Some(diag.summary);
                    record.error_detail = Some(diag.detail);
                }
                None => {
                    record.error_summary = Some(message.to_string());
                    record.error_detail = scanned;
                }
            }
        }

        if success {
            match action {
                ResourceAction::Create => state.counters.created += 1,
                ResourceAction::Update => state.counters.updated += 1,
                ResourceAction::Delete => state.counters.deleted += 1,
                ResourceAction::Replace => state.counters.replaced += 1,
            }
            state.push_log(
                LogLevel::Info,
                format!("{address}: {action:?} complete ({elapsed_seconds:.0}s)"),
            );
        } else {
            state.counters.errors += 1;
            state.push_log(LogLevel::Error, message.to_string());
        }
    }

    fn apply_diagnostic(&self, state: &mut OperationState, diag: &DiagnosticInfo) {
        let level = diag.level();
        if level == LogLevel::Warning {
            state.counters.warnings += 1;
        }
        if let Some(address) = diag.address.clone() {
            // Latest-wins per address.
            state.diagnostics.insert(address.clone(), diag.clone());
            // Backfill a record that already failed without detail.
            if let Some(record) = state.records.get_mut(&address) {
                if record.status == ResourceStatus::Failed && record.error_detail.is_none() {
                    record.error_summary = Some(diag.summary.clone());
                    record.error_detail = Some(diag.detail.clone());
                    state.diagnostics.remove(&address);
                }
            }
        }
        if !diag.summary.is_empty() {
            state.push_log(level, format!("Error: {}", diag.summary));
        }
        if !diag.detail.is_empty() {
            state.push_log(level, diag.detail.clone());
        }
    }

    /// Phase the attempt is currently in.
    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Mark the transient recovering phase while a remediation runs.
    pub fn mark_recovering(&self) {
        let mut state = self.state.lock();
        state.phase = Phase::Recovering;
        state.push_log(LogLevel::Info, "Attempting automatic recovery".to_string());
    }

    /// Start a fresh attempt after recovery: phase back to Initializing,
    /// per-attempt records cleared, attempt counter advanced.
    pub fn reset_for_retry(&self) {
        let mut state = self.state.lock();
        state.phase = Phase::Initializing;
        state.attempt += 1;
        state.records.clear();
        state.order.clear();
        state.diagnostics.clear();
        state.counters = Counters::default();
        debug!("State reset for attempt {}", state.attempt);
    }

    /// Apply the process completion signal: Complete on success, Error
    /// otherwise, unless the attempt already reached a terminal phase.
    pub fn finish(&self, success: bool) {
        let mut state = self.state.lock();
        if state.phase.is_terminal() {
            return;
        }
        state.phase = if success { Phase::Complete } else { Phase::Error };
    }

    /// Snapshot copy for presentation; the lock is held only for the copy.
    pub fn snapshot(&self) -> StateSnapshot {
        let state = self.state.lock();
        StateSnapshot {
            phase: state.phase,
            attempt: state.attempt,
            started_at: state.started_at,
            resources: state
                .order
                .iter()
                .filter_map(|addr| state.records.get(addr))
                .cloned()
                .collect(),
            counters: state.counters,
            log_tail: state.log_tail.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(address: &str, action: ResourceAction) -> Event {
        Event::ResourceStart {
            address: address.to_string(),
            action,
        }
    }

    fn complete(address: &str, action: ResourceAction, success: bool, elapsed: f64) -> Event {
        Event::ResourceComplete {
            address: address.to_string(),
            action,
            success,
            elapsed_seconds: elapsed,
            message: format!("{address}: finished"),
        }
    }

    #[test]
    fn test_status_moves_forward_only() {
        let reconciler = Reconciler::new();
        reconciler.apply(&start("aws_vpc.main", ResourceAction::Create));
        reconciler.apply(&complete("aws_vpc.main", ResourceAction::Create, true, 2.0));
        // A late start event must not regress the record.
        reconciler.apply(&start("aws_vpc.main", ResourceAction::Create));

        let snap = reconciler.snapshot();
        assert_eq!(snap.resources.len(), 1);
        assert_eq!(snap.resources[0].status, ResourceStatus::Done);
    }

    #[test]
    fn test_duplicate_start_is_idempotent() {
        let reconciler = Reconciler::new();
        reconciler.apply(&start("aws_vpc.main", ResourceAction::Delete));
        reconciler.apply(&start("aws_vpc.main", ResourceAction::Delete));

        let snap = reconciler.snapshot();
        assert_eq!(snap.resources.len(), 1);
        assert_eq!(snap.resources[0].status, ResourceStatus::Active);
    }

    #[test]
    fn test_progress_updates_active_only() {
        let reconciler = Reconciler::new();
        reconciler.apply(&Event::ResourceProgress {
            address: "aws_vpc.unknown".to_string(),
            elapsed_seconds: 10.0,
        });
        assert!(reconciler.snapshot().resources.is_empty());

        reconciler.apply(&start("aws_vpc.main", ResourceAction::Create));
        reconciler.apply(&Event::ResourceProgress {
            address: "aws_vpc.main".to_string(),
            elapsed_seconds: 10.0,
        });
        let snap = reconciler.snapshot();
        assert_eq!(snap.resources[0].elapsed_seconds, 10.0);
        assert_eq!(snap.resources[0].status, ResourceStatus::Active);
    }

    #[test]
    fn test_failure_takes_diagnostic_detail() {
        let reconciler = Reconciler::new();
        reconciler.apply(&start("aws_s3_bucket.assets", ResourceAction::Create));
        reconciler.apply(&Event::Diagnostic(DiagnosticInfo {
            severity: "error".to_string(),
            summary: "creating bucket".to_string(),
            detail: "BucketAlreadyExists".to_string(),
            address: Some("aws_s3_bucket.assets".to_string()),
        }));
        reconciler.apply(&complete(
            "aws_s3_bucket.assets",
            ResourceAction::Create,
            false,
            1.0,
        ));

        let snap = reconciler.snapshot();
        let record = &snap.resources[0];
        assert_eq!(record.status, ResourceStatus::Failed);
        assert_eq!(record.error_summary.as_deref(), Some("creating bucket"));
        assert_eq!(record.error_detail.as_deref(), Some("BucketAlreadyExists"));
        assert_eq!(snap.counters.errors, 1);
    }

    #[test]
    fn test_late_diagnostic_backfills_failed_record() {
        let reconciler = Reconciler::new();
        reconciler.apply(&start("aws_s3_bucket.assets", ResourceAction::Create));
        reconciler.apply(&complete(
            "aws_s3_bucket.assets",
            ResourceAction::Create,
            false,
            1.0,
        ));
        reconciler.apply(&Event::Diagnostic(DiagnosticInfo {
            severity: "error".to_string(),
            summary: "creating bucket".to_string(),
            detail: "BucketAlreadyExists".to_string(),
            address: Some("aws_s3_bucket.assets".to_string()),
        }));

        let snap = reconciler.snapshot();
        assert_eq!(
            snap.resources[0].error_detail.as_deref(),
            Some("BucketAlreadyExists")
        );
    }

    #[test]
    fn test_failure_without_diagnostic_scans_log_window() {
        let reconciler = Reconciler::new();
        reconciler.apply(&Event::Log {
            level: LogLevel::Error,
            message: "Error: access denied".to_string(),
        });
        reconciler.apply(&start("aws_iam_role.task", ResourceAction::Create));
        reconciler.apply(&complete(
            "aws_iam_role.task",
            ResourceAction::Create,
            false,
            1.0,
        ));

        let snap = reconciler.snapshot();
        // Best-effort only: the error line was within the scan window.
        assert_eq!(
            snap.resources[0].error_detail.as_deref(),
            Some("Error: access denied")
        );
    }

    #[test]
    fn test_counters_by_action() {
        let reconciler = Reconciler::new();
        reconciler.apply(&complete("a.one", ResourceAction::Create, true, 1.0));
        reconciler.apply(&complete("a.two", ResourceAction::Delete, true, 1.0));
        reconciler.apply(&complete("a.three", ResourceAction::Update, true, 1.0));

        let counters = reconciler.snapshot().counters;
        assert_eq!(counters.created, 1);
        assert_eq!(counters.deleted, 1);
        assert_eq!(counters.updated, 1);
        assert_eq!(counters.errors, 0);
    }

    #[test]
    fn test_phase_hint_ignored_after_terminal() {
        let reconciler = Reconciler::new();
        reconciler.apply(&Event::PhaseHint(Phase::Complete));
        reconciler.apply(&Event::PhaseHint(Phase::Executing));
        assert_eq!(reconciler.phase(), Phase::Complete);
    }

    #[test]
    fn test_reset_for_retry_starts_fresh_attempt() {
        let reconciler = Reconciler::new();
        reconciler.apply(&Event::PhaseHint(Phase::Executing));
        reconciler.apply(&start("aws_vpc.main", ResourceAction::Create));
        reconciler.mark_recovering();
        reconciler.reset_for_retry();

        let snap = reconciler.snapshot();
        assert_eq!(snap.phase, Phase::Initializing);
        assert_eq!(snap.attempt, 2);
        assert!(snap.resources.is_empty());
    }

    #[test]
    fn test_log_tail_is_bounded() {
        let reconciler = Reconciler::new();
        for i in 0..250 {
            reconciler.apply(&Event::Log {
                level: LogLevel::Info,
                message: format!("line-{i}"),
            });
        }
        let snap = reconciler.snapshot();
        assert_eq!(snap.log_tail.len(), LOG_TAIL_CAP);
        assert_eq!(snap.log_tail.last().unwrap().message, "line-249");
    }
}
