//! # terrapin_engine
//!
//! Turns the provisioning tool's output stream into a consistent view of
//! a long-running, partially-failing multi-resource operation.
//!
//! The pipeline is one-directional: the [`classify`] module converts one
//! line into at most one typed [`Event`]; the [`state::Reconciler`] folds
//! events into an operation state behind one coarse lock; the
//! [`phase::Phase`] machine derives coarse progress for consumers.
//! [`plan`] counts planned changes from the tool's JSON plan artifact.

pub mod classify;
pub mod error;
pub mod event;
pub mod phase;
pub mod plan;
pub mod state;

pub use classify::{classify_line, extract_address};
pub use error::{EngineError, EngineResult};
pub use event::{DiagnosticInfo, Event, LogLevel, ResourceAction};
pub use phase::Phase;
pub use plan::{summarize_plan, PlanCounts, PlanSummary};
pub use state::{
    Counters, LogLine, Reconciler, ResourceRecord, ResourceStatus, StateSnapshot, LOG_TAIL_CAP,
};
