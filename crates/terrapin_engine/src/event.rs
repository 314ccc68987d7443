//! Typed events parsed from the tool's output, and the wire structures of
//! its machine-readable (`-json`) stream.

use serde::{Deserialize, Serialize};

use crate::phase::Phase;

/// What is being done to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceAction {
    Create,
    Update,
    Delete,
    Replace,
}

impl ResourceAction {
    /// Parse the action strings the tool emits. Unknown strings fall back
    /// to `Update`, matching the tool's own default presentation.
    pub fn parse(s: &str) -> Self {
        match s {
            "create" => ResourceAction::Create,
            "delete" => ResourceAction::Delete,
            "replace" => ResourceAction::Replace,
            _ => ResourceAction::Update,
        }
    }
}

/// Severity of a log line or diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn parse(s: &str) -> Self {
        match s {
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warning,
            _ => LogLevel::Info,
        }
    }
}

/// Structured diagnostic payload attached to errors and warnings.
///
/// Unknown fields (range, snippet, ...) are tolerated and ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticInfo {
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub address: Option<String>,
}

impl DiagnosticInfo {
    pub fn level(&self) -> LogLevel {
        LogLevel::parse(&self.severity)
    }
}

/// Resource identity inside a hook payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceRef {
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub resource_type: String,
}

/// Hook payload carried by `apply_start` / `apply_progress` /
/// `apply_complete` / `apply_errored` messages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookInfo {
    #[serde(default)]
    pub resource: Option<ResourceRef>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub id_key: Option<String>,
    #[serde(default)]
    pub id_value: Option<String>,
    #[serde(default)]
    pub elapsed_seconds: Option<f64>,
}

/// One line of the tool's machine-readable stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type", default)]
    pub msg_type: String,
    #[serde(rename = "@level", default)]
    pub level: String,
    #[serde(rename = "@message", default)]
    pub message: String,
    #[serde(default)]
    pub diagnostic: Option<DiagnosticInfo>,
    #[serde(default)]
    pub hook: Option<HookInfo>,
}

/// One typed event derived from one output line. Immutable once parsed.
#[derive(Debug, Clone)]
pub enum Event {
    /// A resource operation started.
    ResourceStart {
        address: String,
        action: ResourceAction,
    },
    /// An in-flight resource operation reported elapsed time.
    ResourceProgress {
        address: String,
        elapsed_seconds: f64,
    },
    /// A resource operation finished, successfully or not.
    ResourceComplete {
        address: String,
        action: ResourceAction,
        success: bool,
        elapsed_seconds: f64,
        message: String,
    },
    /// A structured diagnostic was emitted.
    Diagnostic(DiagnosticInfo),
    /// The line indicates a coarse phase change.
    PhaseHint(Phase),
    /// Anything else: retained verbatim in the bounded log tail.
    Log { level: LogLevel, message: String },
}
