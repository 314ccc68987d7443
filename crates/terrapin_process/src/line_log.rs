//! Shared, capped, append-only buffer of subprocess output lines.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Which pipe a line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

/// One captured output line.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub source: StreamSource,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl OutputLine {
    pub fn new(source: StreamSource, text: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

struct LineLogInner {
    lines: VecDeque<OutputLine>,
    /// Number of lines dropped off the front so far.
    discarded: u64,
}

/// Append-only line buffer with a fixed capacity.
///
/// Oldest lines are discarded beyond the cap. Readers keep an absolute
/// cursor (count of lines ever appended), so polling survives discards
/// without re-reading or blocking a writer.
pub struct LineLog {
    capacity: usize,
    inner: Mutex<LineLogInner>,
}

impl LineLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(LineLogInner {
                lines: VecDeque::with_capacity(capacity.min(256)),
                discarded: 0,
            }),
        }
    }

    /// Append a line, dropping the oldest if the buffer is full.
    pub fn push(&self, line: OutputLine) {
        let mut inner = self.inner.lock();
        if inner.lines.len() == self.capacity {
            inner.lines.pop_front();
            inner.discarded += 1;
        }
        inner.lines.push_back(line);
    }

    /// Total number of lines ever appended.
    pub fn total_appended(&self) -> u64 {
        let inner = self.inner.lock();
        inner.discarded + inner.lines.len() as u64
    }

    /// Read all lines at or after the absolute `cursor`, returning them
    /// together with the cursor to use for the next poll. Lines that were
    /// discarded before being read are silently skipped.
    pub fn read_from(&self, cursor: u64) -> (Vec<OutputLine>, u64) {
        let inner = self.inner.lock();
        let total = inner.discarded + inner.lines.len() as u64;
        if cursor >= total {
            return (Vec::new(), total);
        }
        let start = cursor.saturating_sub(inner.discarded) as usize;
        let out = inner.lines.iter().skip(start).cloned().collect();
        (out, total)
    }

    /// Copy of the most recent `n` lines.
    pub fn tail(&self, n: usize) -> Vec<OutputLine> {
        let inner = self.inner.lock();
        let skip = inner.lines.len().saturating_sub(n);
        inner.lines.iter().skip(skip).cloned().collect()
    }
}
