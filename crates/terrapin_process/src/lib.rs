//! # terrapin_process
//!
//! Subprocess supervision for terrapin: spawns the external provisioning
//! tool, streams stdout/stderr into a shared capped line buffer, and
//! reports completion only after both pipes are fully drained.
//!
//! Tests substitute a shell one-liner for the real tool; nothing in this
//! crate knows about Terraform specifically.

pub mod error;
pub mod line_log;
pub mod supervisor;

pub use error::{ProcessError, ProcessResult};
pub use line_log::{LineLog, OutputLine, StreamSource};
pub use supervisor::{ExitStatusInfo, ProcessHandle, DEFAULT_LINE_CAP};
