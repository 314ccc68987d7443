//! Coarse progress phases of one operation.

use serde::{Deserialize, Serialize};

/// Progress stage of an operation attempt.
///
/// Phases only move forward within one attempt; a fresh attempt after
/// recovery starts over at `Initializing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    Validating,
    Refreshing,
    Planning,
    Executing,
    Recovering,
    Complete,
    Error,
}

impl Default for Phase {
    fn default() -> Self {
        Self::Initializing
    }
}

impl Phase {
    /// Ordering rank used to keep phase transitions monotonic.
    fn rank(self) -> u8 {
        match self {
            Phase::Initializing => 0,
            Phase::Validating => 1,
            Phase::Refreshing => 2,
            Phase::Planning => 3,
            Phase::Executing => 4,
            Phase::Recovering => 5,
            Phase::Complete => 6,
            Phase::Error => 7,
        }
    }

    /// Complete and Error are terminal for an attempt.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::Error)
    }

    /// Advance to `next` if it is a forward move and the current phase is
    /// not already terminal. Returns the resulting phase.
    pub fn advanced_to(self, next: Phase) -> Phase {
        if self.is_terminal() || next.rank() <= self.rank() {
            self
        } else {
            next
        }
    }

    /// Human-readable label for progress output.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Initializing => "initializing",
            Phase::Validating => "validating",
            Phase::Refreshing => "refreshing",
            Phase::Planning => "planning",
            Phase::Executing => "executing",
            Phase::Recovering => "recovering",
            Phase::Complete => "complete",
            Phase::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_is_monotonic() {
        let phase = Phase::Planning;
        assert_eq!(phase.advanced_to(Phase::Refreshing), Phase::Planning);
        assert_eq!(phase.advanced_to(Phase::Executing), Phase::Executing);
    }

    #[test]
    fn test_terminal_phase_is_sticky() {
        assert_eq!(Phase::Complete.advanced_to(Phase::Error), Phase::Complete);
        assert_eq!(Phase::Error.advanced_to(Phase::Complete), Phase::Error);
    }
}
