//! Line classification.
//!
//! One output line in, at most one typed [`Event`] out. The structured
//! JSON stream is authoritative when present; plain-text sentences fall
//! back to a prioritized table of total matchers. Classification never
//! rejects input: anything unrecognized becomes a `Log` event.

use crate::event::{Event, LogLevel, ResourceAction, WireMessage};
use crate::phase::Phase;

/// Classify one output line into an event.
pub fn classify_line(line: &str) -> Event {
    let trimmed = line.trim_end();
    if trimmed.trim_start().starts_with('{') {
        if let Ok(msg) = serde_json::from_str::<WireMessage>(trimmed) {
            if let Some(event) = classify_wire(&msg) {
                return event;
            }
            // Recognized JSON envelope but no structured mapping; fall back
            // to the text heuristics over the embedded human message.
            return classify_text(&msg.message, LogLevel::parse(&msg.level));
        }
    }
    classify_text(trimmed, LogLevel::Info)
}

/// Map a structured message by its discriminator. Returns `None` when the
/// message carries no payload we can use directly.
fn classify_wire(msg: &WireMessage) -> Option<Event> {
    match msg.msg_type.as_str() {
        "apply_start" => {
            let hook = msg.hook.as_ref()?;
            let resource = hook.resource.as_ref()?;
            Some(Event::ResourceStart {
                address: resource.addr.clone(),
                action: hook
                    .action
                    .as_deref()
                    .map(ResourceAction::parse)
                    .unwrap_or(ResourceAction::Update),
            })
        }
        "apply_progress" => {
            let hook = msg.hook.as_ref()?;
            let resource = hook.resource.as_ref()?;
            Some(Event::ResourceProgress {
                address: resource.addr.clone(),
                elapsed_seconds: hook.elapsed_seconds.unwrap_or(0.0),
            })
        }
        "apply_complete" | "apply_errored" => {
            let hook = msg.hook.as_ref()?;
            let resource = hook.resource.as_ref()?;
            Some(Event::ResourceComplete {
                address: resource.addr.clone(),
                action: hook
                    .action
                    .as_deref()
                    .map(ResourceAction::parse)
                    .unwrap_or(ResourceAction::Update),
                success: msg.msg_type == "apply_complete",
                elapsed_seconds: hook.elapsed_seconds.unwrap_or(0.0),
                message: msg.message.clone(),
            })
        }
        "diagnostic" => msg.diagnostic.clone().map(Event::Diagnostic),
        "refresh_start" => Some(Event::PhaseHint(Phase::Refreshing)),
        _ => None,
    }
}

type Matcher = fn(&str) -> Option<Event>;

/// Ordered matcher table; first match wins. Each matcher is total over
/// its input, so new entries can be added without affecting the rest.
const MATCHERS: &[Matcher] = &[
    match_completion,
    match_errored,
    match_in_progress,
    match_refreshing,
    match_phase_marker,
    match_error_line,
];

/// Classify a plain-text line via the matcher table.
pub fn classify_text(text: &str, level: LogLevel) -> Event {
    for matcher in MATCHERS {
        if let Some(event) = matcher(text) {
            return event;
        }
    }
    Event::Log {
        level,
        message: text.to_string(),
    }
}

const COMPLETIONS: &[(&str, ResourceAction)] = &[
    ("Creation complete after", ResourceAction::Create),
    ("Modifications complete after", ResourceAction::Update),
    ("Destruction complete after", ResourceAction::Delete),
    ("Destroy complete after", ResourceAction::Delete),
];

fn match_completion(text: &str) -> Option<Event> {
    for (pattern, action) in COMPLETIONS {
        if text.contains(pattern) {
            let address = extract_address(text)?;
            return Some(Event::ResourceComplete {
                address,
                action: *action,
                success: true,
                elapsed_seconds: extract_after_duration(text).unwrap_or(0.0),
                message: text.to_string(),
            });
        }
    }
    None
}

fn match_errored(text: &str) -> Option<Event> {
    if !text.contains("errored after") {
        return None;
    }
    let address = extract_address(text)?;
    let action = if text.contains("Destruction errored") {
        ResourceAction::Delete
    } else if text.contains("Creation errored") {
        ResourceAction::Create
    } else {
        ResourceAction::Update
    };
    Some(Event::ResourceComplete {
        address,
        action,
        success: false,
        elapsed_seconds: extract_after_duration(text).unwrap_or(0.0),
        message: text.to_string(),
    })
}

const IN_PROGRESS: &[&str] = &[
    "Still creating...",
    "Creating...",
    "Still destroying...",
    "Destroying...",
    "Still modifying...",
    "Modifying...",
];

fn match_in_progress(text: &str) -> Option<Event> {
    if !IN_PROGRESS.iter().any(|p| text.contains(p)) {
        return None;
    }
    let address = extract_address(text)?;
    // Elapsed-only update lines refresh the active record; everything else
    // is a (possibly duplicate, then idempotent) start.
    if let Some(elapsed_seconds) = extract_elapsed_suffix(text) {
        return Some(Event::ResourceProgress {
            address,
            elapsed_seconds,
        });
    }
    let lowered = text.to_lowercase();
    let action = if lowered.contains("destroy") {
        ResourceAction::Delete
    } else if lowered.contains("creat") {
        ResourceAction::Create
    } else {
        ResourceAction::Update
    };
    Some(Event::ResourceStart { address, action })
}

fn match_refreshing(text: &str) -> Option<Event> {
    if text.contains("Refreshing state") || text.contains("Reading...") {
        return Some(Event::PhaseHint(Phase::Refreshing));
    }
    None
}

fn match_phase_marker(text: &str) -> Option<Event> {
    if text.contains("Initializing") {
        return Some(Event::PhaseHint(Phase::Initializing));
    }
    if text.contains("Terraform used the selected providers") {
        return Some(Event::PhaseHint(Phase::Validating));
    }
    if text.contains("Terraform will perform") || text.contains("Plan:") {
        return Some(Event::PhaseHint(Phase::Planning));
    }
    if text.contains("No changes")
        || text.contains("Apply complete!")
        || text.contains("Destroy complete!")
    {
        return Some(Event::PhaseHint(Phase::Complete));
    }
    None
}

fn match_error_line(text: &str) -> Option<Event> {
    if text.starts_with("Error:") || text.starts_with("ERROR") {
        return Some(Event::Log {
            level: LogLevel::Error,
            message: text.to_string(),
        });
    }
    if text.starts_with("Warning:") {
        return Some(Event::Log {
            level: LogLevel::Warning,
            message: text.to_string(),
        });
    }
    None
}

/// Text before the first `:`, with any trailing `(...)` provisioner
/// annotation stripped. Returns `None` when the prefix does not look like
/// a resource address.
pub fn extract_address(line: &str) -> Option<String> {
    let (prefix, _) = line.split_once(':')?;
    let prefix = prefix.trim();
    let prefix = match prefix.find(" (") {
        Some(idx) => prefix[..idx].trim_end(),
        None => prefix,
    };
    if prefix.is_empty() || prefix.contains(' ') {
        return None;
    }
    Some(prefix.to_string())
}

/// Elapsed seconds from a `[10s elapsed]` suffix.
fn extract_elapsed_suffix(line: &str) -> Option<f64> {
    let end = line.rfind(" elapsed]")?;
    let start = line[..end].rfind('[')?;
    parse_duration_secs(&line[start + 1..end])
}

/// Elapsed seconds from an `... after 3s` fragment.
fn extract_after_duration(line: &str) -> Option<f64> {
    let idx = line.find("after ")?;
    let token = line[idx + 6..].split_whitespace().next()?;
    parse_duration_secs(token.trim_end_matches(['.', ',', ':']))
}

/// Parse the tool's compact duration format ("3s", "1m30s", "1h2m3s").
fn parse_duration_secs(s: &str) -> Option<f64> {
    let mut total = 0.0;
    let mut number = String::new();
    let mut any_unit = false;
    for c in s.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let value: f64 = number.parse().ok()?;
        number.clear();
        total += value
            * match c {
                'h' => 3600.0,
                'm' => 60.0,
                's' => 1.0,
                _ => return None,
            };
        any_unit = true;
    }
    (any_unit && number.is_empty()).then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_address_basic() {
        assert_eq!(
            extract_address("aws_vpc.main: Destroying... [id=vpc-1]").as_deref(),
            Some("aws_vpc.main")
        );
    }

    #[test]
    fn test_extract_address_strips_provisioner() {
        assert_eq!(
            extract_address("aws_instance.web (remote-exec): Creating...").as_deref(),
            Some("aws_instance.web")
        );
    }

    #[test]
    fn test_extract_address_rejects_prose() {
        assert!(extract_address("Note for operators: check the logs").is_none());
        assert!(extract_address("no colon here").is_none());
    }

    #[test]
    fn test_creation_complete_line() {
        let event =
            classify_line("aws_s3_bucket.assets: Creation complete after 4s [id=assets-1]");
        match event {
            Event::ResourceComplete {
                address,
                action,
                success,
                elapsed_seconds,
                ..
            } => {
                assert_eq!(address, "aws_s3_bucket.assets");
                assert_eq!(action, ResourceAction::Create);
                assert!(success);
                assert_eq!(elapsed_seconds, 4.0);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_minute_duration_parsed() {
        let event = classify_line("aws_db_instance.main: Creation complete after 5m21s");
        match event {
            Event::ResourceComplete {
                elapsed_seconds, ..
            } => assert_eq!(elapsed_seconds, 321.0),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_still_creating_is_progress() {
        let event = classify_line("aws_instance.web: Still creating... [20s elapsed]");
        match event {
            Event::ResourceProgress {
                address,
                elapsed_seconds,
            } => {
                assert_eq!(address, "aws_instance.web");
                assert_eq!(elapsed_seconds, 20.0);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_destroying_is_start() {
        let event = classify_line("aws_vpc.main: Destroying... [id=vpc-1]");
        match event {
            Event::ResourceStart { address, action } => {
                assert_eq!(address, "aws_vpc.main");
                assert_eq!(action, ResourceAction::Delete);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_errored_line() {
        let event = classify_line(
            "aws_iam_role.task: Creation errored after 2s",
        );
        match event {
            Event::ResourceComplete {
                address,
                action,
                success,
                ..
            } => {
                assert_eq!(address, "aws_iam_role.task");
                assert_eq!(action, ResourceAction::Create);
                assert!(!success);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_refreshing_phase_hint() {
        let event = classify_line("Refreshing state... aws_vpc.main [id=vpc-1]");
        assert!(matches!(event, Event::PhaseHint(Phase::Refreshing)));
    }

    #[test]
    fn test_phase_markers() {
        assert!(matches!(
            classify_line("Initializing the backend..."),
            Event::PhaseHint(Phase::Initializing)
        ));
        assert!(matches!(
            classify_line("Plan: 3 to add, 0 to change, 1 to destroy."),
            Event::PhaseHint(Phase::Planning)
        ));
        assert!(matches!(
            classify_line("No changes. Your infrastructure matches the configuration."),
            Event::PhaseHint(Phase::Complete)
        ));
    }

    #[test]
    fn test_unparseable_line_becomes_log() {
        let event = classify_line("some completely free-form text");
        match event {
            Event::Log { level, message } => {
                assert_eq!(level, LogLevel::Info);
                assert_eq!(message, "some completely free-form text");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_structured_apply_complete() {
        let line = r#"{"type":"apply_complete","@level":"info","@message":"aws_vpc.main: Creation complete after 2s","hook":{"resource":{"addr":"aws_vpc.main","resource_type":"aws_vpc"},"action":"create","elapsed_seconds":2.0}}"#;
        match classify_line(line) {
            Event::ResourceComplete {
                address,
                action,
                success,
                elapsed_seconds,
                ..
            } => {
                assert_eq!(address, "aws_vpc.main");
                assert_eq!(action, ResourceAction::Create);
                assert!(success);
                assert_eq!(elapsed_seconds, 2.0);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_structured_diagnostic() {
        let line = r#"{"type":"diagnostic","@level":"error","@message":"Error: creating bucket","diagnostic":{"severity":"error","summary":"creating bucket","detail":"BucketAlreadyExists","address":"aws_s3_bucket.assets"}}"#;
        match classify_line(line) {
            Event::Diagnostic(diag) => {
                assert_eq!(diag.severity, "error");
                assert_eq!(diag.address.as_deref(), Some("aws_s3_bucket.assets"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_structured_without_mapping_falls_back_to_message() {
        // A log-typed envelope whose message is a recognizable sentence.
        let line = r#"{"type":"log","@level":"info","@message":"aws_vpc.main: Destruction complete after 3s"}"#;
        match classify_line(line) {
            Event::ResourceComplete {
                address, success, ..
            } => {
                assert_eq!(address, "aws_vpc.main");
                assert!(success);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_json_is_log() {
        let event = classify_line("{not json at all");
        assert!(matches!(event, Event::Log { .. }));
    }
}
