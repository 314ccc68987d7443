//! The frozen subcommand and flag set used to invoke the tool.
//!
//! The streaming contract in the engine depends on these exact flags:
//! `-json` selects the machine-readable stream for apply, `-no-color`
//! keeps the plain-text fallback parseable, `-auto-approve` and
//! `-input=false` keep the tool from prompting, and the plan artifact is
//! saved so apply executes exactly what was planned.

use std::fmt;

/// Name of the saved plan artifact.
pub const PLAN_ARTIFACT: &str = "tfplan";
/// Name of the saved destroy-plan artifact.
pub const DESTROY_PLAN_ARTIFACT: &str = "destroy.tfplan";

/// One invocation kind of the external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerraformOp {
    /// Plan and save the artifact.
    Plan,
    /// Apply the saved plan artifact with the JSON stream.
    Apply,
    /// Plan a destroy and save its artifact.
    DestroyPlan,
    /// Destroy with plain-text output.
    Destroy,
    /// Render the saved plan artifact as JSON.
    ShowPlan,
}

impl TerraformOp {
    pub fn program(self) -> &'static str {
        "terraform"
    }

    pub fn args(self) -> Vec<String> {
        let args: &[&str] = match self {
            TerraformOp::Plan => &["plan", "-input=false", "-no-color", "-out=tfplan"],
            TerraformOp::Apply => &["apply", "-json", "-auto-approve", PLAN_ARTIFACT],
            TerraformOp::DestroyPlan => &[
                "plan",
                "-destroy",
                "-input=false",
                "-no-color",
                "-out=destroy.tfplan",
            ],
            TerraformOp::Destroy => &["destroy", "-auto-approve", "-no-color"],
            TerraformOp::ShowPlan => &["show", "-json", PLAN_ARTIFACT],
        };
        args.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for TerraformOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerraformOp::Plan => "plan",
            TerraformOp::Apply => "apply",
            TerraformOp::DestroyPlan => "destroy plan",
            TerraformOp::Destroy => "destroy",
            TerraformOp::ShowPlan => "show",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_uses_json_stream_and_artifact() {
        let args = TerraformOp::Apply.args();
        assert!(args.contains(&"-json".to_string()));
        assert!(args.contains(&"-auto-approve".to_string()));
        assert_eq!(args.last().map(String::as_str), Some(PLAN_ARTIFACT));
    }

    #[test]
    fn test_destroy_is_plain_text() {
        let args = TerraformOp::Destroy.args();
        assert!(args.contains(&"-no-color".to_string()));
        assert!(!args.contains(&"-json".to_string()));
    }
}
