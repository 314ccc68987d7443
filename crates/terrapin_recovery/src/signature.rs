//! Known recoverable-failure signatures.
//!
//! The table is ordered and first-match-wins. Signatures are substring
//! matches over ANSI-stripped error text; the remediations they map to
//! are safe to re-run against real external state.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// A corrective command run automatically when a failure matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Remediation {
    /// `terraform init`
    Init,
    /// `terraform init -reconfigure`
    InitReconfigure,
    /// `terraform apply -destroy -refresh=false -auto-approve`
    DestroySkipRefresh,
}

impl Remediation {
    pub fn program(self) -> &'static str {
        "terraform"
    }

    pub fn args(self) -> Vec<String> {
        let args: &[&str] = match self {
            Remediation::Init => &["init"],
            Remediation::InitReconfigure => &["init", "-reconfigure"],
            Remediation::DestroySkipRefresh => {
                &["apply", "-destroy", "-refresh=false", "-auto-approve"]
            }
        };
        args.iter().map(|s| s.to_string()).collect()
    }

    pub fn describe(self) -> String {
        format!("{} {}", self.program(), self.args().join(" "))
    }
}

/// Outcome of classifying captured error text.
#[derive(Debug, Clone)]
pub enum FailureClass {
    /// A known failure mode with an automatic remediation.
    Recoverable {
        remediation: Remediation,
        matched: String,
    },
    /// Warning-only output that is safe to ignore; no retry is consumed.
    BenignWarning { matched: String },
    /// No known remediation; the captured detail is surfaced verbatim.
    Unrecoverable { detail: String },
}

/// Signatures requiring a backend reconfigure.
const RECONFIGURE_SIGNATURES: &[&str] = &[
    "Error: Backend configuration changed",
    "backend configuration changed",
    "Backend configuration has changed",
    "backend type changed",
    "Backend type has changed",
    "-reconfigure",
    "terraform init -reconfigure",
    "run \"terraform init -reconfigure\"",
];

/// Signatures requiring a plain re-initialization.
const INIT_SIGNATURES: &[&str] = &[
    "Backend initialization required: please run \"terraform init\"",
    "Backend initialization required, please run \"terraform init\"",
    "Backend initialization required",
    "Reason: Backend configuration block has changed",
    "Reason: Initial configuration of the requested backend",
    "Error: Module not installed",
    "terraform init",
    "run \"terraform init\"",
    "Backend has not been initialized",
    "No backend is configured",
    "Error: Could not load plugin",
    "Provider requirements cannot be satisfied",
    "Required plugins are not installed",
    "terraform providers lock",
];

/// A referenced local file disappeared during a destroy-time archive
/// step; re-running the destroy without state refresh skips it.
const ARCHIVE_SIGNATURES: &[&str] = &[
    "Error: Archive creation error",
    "error creating archive",
    "could not archive missing file",
    "error archiving file",
];

const DEPRECATION_SIGNATURES: &[&str] = &["inline_policy is deprecated"];

/// Classify captured error text against the signature table.
pub fn classify_failure(output: &str) -> FailureClass {
    let clean = strip_ansi(output);

    for signature in RECONFIGURE_SIGNATURES {
        if clean.contains(signature) {
            return FailureClass::Recoverable {
                remediation: Remediation::InitReconfigure,
                matched: signature.to_string(),
            };
        }
    }

    for signature in INIT_SIGNATURES {
        if clean.contains(signature) {
            // The tool sometimes names the stronger flag explicitly.
            let remediation = if clean.contains("\"-reconfigure\"")
                || clean.contains("\"-migrate-state\"")
            {
                Remediation::InitReconfigure
            } else {
                Remediation::Init
            };
            return FailureClass::Recoverable {
                remediation,
                matched: signature.to_string(),
            };
        }
    }

    for signature in ARCHIVE_SIGNATURES {
        if clean.contains(signature) {
            return FailureClass::Recoverable {
                remediation: Remediation::DestroySkipRefresh,
                matched: signature.to_string(),
            };
        }
    }

    for signature in DEPRECATION_SIGNATURES {
        if clean.contains(signature) {
            return FailureClass::BenignWarning {
                matched: signature.to_string(),
            };
        }
    }

    FailureClass::Unrecoverable { detail: clean }
}

/// Remove ANSI escape sequences before signature matching.
pub fn strip_ansi(input: &str) -> String {
    static ANSI_RE: OnceLock<Regex> = OnceLock::new();
    let re = ANSI_RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").expect("valid regex"));
    re.replace_all(input, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_change_is_reconfigure() {
        let class = classify_failure(
            "Error: Backend configuration changed\n\nA change in the backend configuration has been detected.",
        );
        match class {
            FailureClass::Recoverable { remediation, .. } => {
                assert_eq!(remediation, Remediation::InitReconfigure);
            }
            other => panic!("unexpected class: {other:?}"),
        }
    }

    #[test]
    fn test_reconfigure_hint_in_init_text_escalates() {
        let class = classify_failure(
            "Backend initialization required\nPlease run \"terraform init\" with \"-reconfigure\"",
        );
        match class {
            FailureClass::Recoverable { remediation, .. } => {
                assert_eq!(remediation, Remediation::InitReconfigure);
            }
            other => panic!("unexpected class: {other:?}"),
        }
    }

    #[test]
    fn test_missing_module_is_init() {
        let class = classify_failure("Error: Module not installed");
        match class {
            FailureClass::Recoverable { remediation, .. } => {
                assert_eq!(remediation, Remediation::Init);
            }
            other => panic!("unexpected class: {other:?}"),
        }
    }

    #[test]
    fn test_archive_error_skips_refresh() {
        let class = classify_failure("Error: Archive creation error: could not archive missing file bootstrap");
        match class {
            FailureClass::Recoverable { remediation, .. } => {
                assert_eq!(remediation, Remediation::DestroySkipRefresh);
            }
            other => panic!("unexpected class: {other:?}"),
        }
    }

    #[test]
    fn test_deprecation_warning_is_benign() {
        let class = classify_failure("Warning: inline_policy is deprecated. Use aws_iam_role_policy instead.");
        assert!(matches!(class, FailureClass::BenignWarning { .. }));
    }

    #[test]
    fn test_unknown_error_is_unrecoverable_verbatim() {
        let class = classify_failure("disk full");
        match class {
            FailureClass::Unrecoverable { detail } => assert_eq!(detail, "disk full"),
            other => panic!("unexpected class: {other:?}"),
        }
    }

    #[test]
    fn test_ansi_is_stripped_before_matching() {
        let colored = "\x1b[31mError: Backend configuration changed\x1b[0m";
        assert!(matches!(
            classify_failure(colored),
            FailureClass::Recoverable {
                remediation: Remediation::InitReconfigure,
                ..
            }
        ));
    }

    #[test]
    fn test_remediation_commands() {
        assert_eq!(Remediation::Init.args(), vec!["init"]);
        assert_eq!(
            Remediation::InitReconfigure.describe(),
            "terraform init -reconfigure"
        );
        assert_eq!(
            Remediation::DestroySkipRefresh.args(),
            vec!["apply", "-destroy", "-refresh=false", "-auto-approve"]
        );
    }
}
