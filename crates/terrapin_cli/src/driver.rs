//! Shared execution driver for the CLI commands.
//!
//! Wires a reconciler and a real runner into the recovery loop, installs
//! Ctrl+C cancellation, and prints progress from 100ms state snapshots.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::warn;

use terrapin_engine::{
    summarize_plan, Phase, PlanSummary, Reconciler, ResourceAction, ResourceStatus, StateSnapshot,
};
use terrapin_recovery::{RecoveryLoop, RecoveryReport, TerraformOp, TerraformRunner};

/// File the filtered plan changes are saved to, next to the configuration.
pub const PLAN_CHANGES_FILE: &str = "terraform-plan-changes.json";

const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// One operation's worth of wiring. Commands that chain operations (plan
/// then apply) build a fresh driver per stage.
pub struct Driver {
    working_dir: PathBuf,
    max_attempts: u32,
    reconciler: Arc<Reconciler>,
    runner: Arc<TerraformRunner>,
}

impl Driver {
    pub fn new(working_dir: impl Into<PathBuf>, max_attempts: u32) -> Self {
        let working_dir = working_dir.into();
        let reconciler = Arc::new(Reconciler::new());
        let runner = Arc::new(TerraformRunner::new(working_dir.clone(), reconciler.clone()));
        Self {
            working_dir,
            max_attempts,
            reconciler,
            runner,
        }
    }

    /// Drive one operation to a terminal report, printing progress along
    /// the way.
    pub async fn run(&self, op: TerraformOp) -> Result<RecoveryReport> {
        let cancel_runner = self.runner.clone();
        let cancel_task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n🛑 Interrupt received, stopping terraform...");
                cancel_runner.cancel();
            }
        });
        let progress_task = tokio::spawn(print_progress(self.reconciler.clone()));

        let result = RecoveryLoop::new(self.runner.clone(), self.reconciler.clone())
            .with_max_attempts(self.max_attempts)
            .run(op)
            .await;

        progress_task.abort();
        cancel_task.abort();

        let report = result.with_context(|| format!("failed to run terraform {op}"))?;
        print_final(op, &self.reconciler.snapshot(), &report);
        Ok(report)
    }

    /// Render the saved plan artifact, count the actual changes and save
    /// them beside the configuration. Returns None when the artifact
    /// cannot be rendered; the caller decides whether that matters.
    pub async fn save_plan_summary(&self) -> Result<Option<PlanSummary>> {
        let Some(json) = self.runner.capture_plan_json().await? else {
            warn!("Could not render the saved plan, skipping change summary");
            return Ok(None);
        };
        let summary = summarize_plan(&json).context("failed to parse plan JSON")?;
        let path = self.working_dir.join(PLAN_CHANGES_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("💾 Saved change summary to {}", path.display());
        Ok(Some(summary))
    }
}

fn action_verb(action: ResourceAction) -> &'static str {
    match action {
        ResourceAction::Create => "created",
        ResourceAction::Update => "updated",
        ResourceAction::Delete => "destroyed",
        ResourceAction::Replace => "replaced",
    }
}

/// Poll snapshots and print phase changes and newly finished resources.
/// Never holds the state lock across printing.
async fn print_progress(reconciler: Arc<Reconciler>) {
    let mut last_phase: Option<Phase> = None;
    let mut last_attempt = 1u32;
    let mut reported: HashSet<String> = HashSet::new();

    loop {
        tokio::time::sleep(PROGRESS_INTERVAL).await;
        let snap = reconciler.snapshot();

        if snap.attempt != last_attempt {
            last_attempt = snap.attempt;
            reported.clear();
            println!("🔁 Attempt {}", snap.attempt);
        }
        if last_phase != Some(snap.phase) {
            last_phase = Some(snap.phase);
            println!("▶️  {}", snap.phase.label());
        }
        for record in &snap.resources {
            if record.status.is_terminal() && reported.insert(record.address.clone()) {
                match record.status {
                    ResourceStatus::Done => println!(
                        "   ✅ {} {} ({:.0}s)",
                        record.address,
                        action_verb(record.action),
                        record.duration_seconds.unwrap_or(record.elapsed_seconds)
                    ),
                    ResourceStatus::Failed => println!(
                        "   ❌ {} failed: {}",
                        record.address,
                        record.error_summary.as_deref().unwrap_or("unknown error")
                    ),
                    _ => {}
                }
            }
        }
    }
}

fn print_final(op: TerraformOp, snap: &StateSnapshot, report: &RecoveryReport) {
    let elapsed = (Utc::now() - snap.started_at).num_seconds();
    println!();

    for attempt in &report.attempts {
        println!(
            "🔧 Recovery: matched '{}', ran '{}'",
            attempt.matched,
            attempt.remediation.describe()
        );
    }

    if report.outcome.cancelled {
        println!("🛑 terraform {op} cancelled after {elapsed}s");
        return;
    }

    let c = snap.counters;
    if report.outcome.success {
        println!(
            "✅ terraform {op} succeeded in {elapsed}s \
             ({} created, {} updated, {} destroyed, {} replaced)",
            c.created, c.updated, c.deleted, c.replaced
        );
        if let Some(note) = report.outcome.error_summary.as_deref() {
            println!("   ⚠️  {note}");
        }
    } else {
        println!(
            "❌ terraform {op} failed after {} run(s): {}",
            report.runs,
            report.outcome.error_summary.as_deref().unwrap_or("unknown error")
        );
        if let Some(detail) = report.outcome.error_detail.as_deref() {
            eprintln!("{detail}");
        }
    }
}
