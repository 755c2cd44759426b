//! Attempt recording: converts one attempt's raw result into a bounded
//! summary that the history formatter can render for the next retry.
//!
//! Summarization is a total function over its input: absent or oddly shaped
//! optional fields degrade to empty sequences, never errors. Failure
//! classification is a documented keyword heuristic over the string
//! rendering of opaque action-log entries, not a semantic judgment.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Case-insensitive markers that classify an action-log entry as failed.
///
/// Fixed set: the English pair covers most backends, the localized pair
/// covers models that narrate tool results in Chinese.
pub const FAILURE_MARKERS: &[&str] = &["failed", "error", "失败", "错误"];

/// Per-summary bound on recorded failed methods.
pub const MAX_FAILED_METHODS: usize = 10;

/// Per-summary bound on recorded key findings.
pub const MAX_KEY_FINDINGS: usize = 5;

/// Who produced a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation recorded on a transcript message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// One message in an attempt transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: MessageRole,
    pub content: String,
    /// Tool invocations attached to this message; non-empty marks the
    /// message as action-producing.
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
}

impl TranscriptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// `true` when this message carries at least one tool invocation.
    pub fn is_action(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Raw result of one attempt, as handed back by the attempt executor.
///
/// Every field defaults: a partially populated report (or one recovered
/// from loosely shaped JSON) still summarizes without error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttemptReport {
    /// Whether the attempt solved the task.
    #[serde(default)]
    pub solved: bool,
    /// Conversation transcript of the attempt.
    #[serde(default)]
    pub messages: Vec<TranscriptMessage>,
    /// Ordered log of actions taken; entries are opaque records.
    #[serde(default)]
    pub action_log: Vec<Value>,
    /// Discovered facts or leads worth carrying into the next attempt.
    #[serde(default)]
    pub leads: Vec<Value>,
    /// When the attempt started, if the executor recorded it.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl AttemptReport {
    /// Recover a report from loosely shaped JSON.
    ///
    /// Each field is decoded independently; a missing or wrong-shaped field
    /// degrades to its default instead of failing the whole report.
    pub fn from_value(value: &Value) -> Self {
        Self {
            solved: field(value, "solved"),
            messages: field(value, "messages"),
            action_log: field(value, "action_log"),
            leads: field(value, "leads"),
            started_at: field(value, "started_at"),
        }
    }
}

fn field<T: DeserializeOwned + Default>(value: &Value, key: &str) -> T {
    value
        .get(key)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Bounded summary of one attempt, rendered into the next attempt's context.
///
/// Immutable once created; consumed only by the history formatter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSummary {
    /// Role-assignment description the attempt ran under.
    pub strategy_label: String,
    /// Number of action-producing messages in the transcript.
    pub attempt_count: u32,
    /// Encounter-ordered renderings of failed actions, at most
    /// [`MAX_FAILED_METHODS`], not deduplicated.
    pub failed_methods: Vec<String>,
    /// Leads discovered during the attempt, at most [`MAX_KEY_FINDINGS`].
    pub key_findings: Vec<String>,
    /// Start time passed through from the report, when present.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Render an opaque record for keyword scanning and display.
///
/// JSON strings render as their contents; everything else falls back to
/// compact JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_failed_entry(rendered: &str) -> bool {
    let lowered = rendered.to_lowercase();
    FAILURE_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Summarize one attempt's raw result under the given strategy label.
pub fn summarize(report: &AttemptReport, strategy_label: &str) -> AttemptSummary {
    let failed_methods = report
        .action_log
        .iter()
        .map(render)
        .filter(|entry| is_failed_entry(entry))
        .take(MAX_FAILED_METHODS)
        .collect();

    let key_findings = report
        .leads
        .iter()
        .map(render)
        .take(MAX_KEY_FINDINGS)
        .collect();

    let attempt_count = report.messages.iter().filter(|m| m.is_action()).count() as u32;

    AttemptSummary {
        strategy_label: strategy_label.to_string(),
        attempt_count,
        failed_methods,
        key_findings,
        timestamp: report.started_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action_message() -> TranscriptMessage {
        TranscriptMessage::assistant("probing").with_tool_calls(vec![ToolCallRecord {
            name: "probe".into(),
            arguments: String::new(),
        }])
    }

    #[test]
    fn failure_markers_match_english_and_localized() {
        let report = AttemptReport {
            action_log: vec![
                json!("tool call succeeded"),
                json!("tool call failed: timeout"),
                json!("错误: invalid input"),
            ],
            ..AttemptReport::default()
        };
        let summary = summarize(&report, "probe pairing");
        assert_eq!(
            summary.failed_methods,
            vec!["tool call failed: timeout", "错误: invalid input"]
        );
    }

    #[test]
    fn marker_match_is_case_insensitive() {
        let report = AttemptReport {
            action_log: vec![json!("SQL injection FAILED on login form")],
            ..AttemptReport::default()
        };
        assert_eq!(summarize(&report, "s").failed_methods.len(), 1);
    }

    #[test]
    fn failed_methods_truncated_to_ten() {
        let report = AttemptReport {
            action_log: (0..15).map(|i| json!(format!("step {i} failed"))).collect(),
            ..AttemptReport::default()
        };
        let summary = summarize(&report, "s");
        assert_eq!(summary.failed_methods.len(), MAX_FAILED_METHODS);
        // Encounter order is preserved.
        assert_eq!(summary.failed_methods[0], "step 0 failed");
    }

    #[test]
    fn repeated_failures_are_not_deduplicated() {
        let report = AttemptReport {
            action_log: vec![json!("login failed"), json!("login failed")],
            ..AttemptReport::default()
        };
        assert_eq!(
            summarize(&report, "s").failed_methods,
            vec!["login failed", "login failed"]
        );
    }

    #[test]
    fn key_findings_truncated_to_five() {
        let report = AttemptReport {
            leads: (0..8).map(|i| json!(format!("lead {i}"))).collect(),
            ..AttemptReport::default()
        };
        assert_eq!(summarize(&report, "s").key_findings.len(), MAX_KEY_FINDINGS);
    }

    #[test]
    fn non_string_entries_render_best_effort() {
        let report = AttemptReport {
            action_log: vec![json!({"step": "exploit", "outcome": "error"})],
            leads: vec![json!(42)],
            ..AttemptReport::default()
        };
        let summary = summarize(&report, "s");
        assert_eq!(summary.failed_methods.len(), 1);
        assert_eq!(summary.key_findings, vec!["42"]);
    }

    #[test]
    fn attempt_count_counts_action_producing_messages() {
        let report = AttemptReport {
            messages: vec![
                TranscriptMessage::user("task"),
                action_message(),
                TranscriptMessage::assistant("thinking out loud"),
                action_message(),
            ],
            ..AttemptReport::default()
        };
        assert_eq!(summarize(&report, "s").attempt_count, 2);
    }

    #[test]
    fn empty_report_summarizes_to_empty_sequences() {
        let summary = summarize(&AttemptReport::default(), "s");
        assert_eq!(summary.attempt_count, 0);
        assert!(summary.failed_methods.is_empty());
        assert!(summary.key_findings.is_empty());
        assert!(summary.timestamp.is_none());
    }

    #[test]
    fn from_value_tolerates_wrong_shapes() {
        let raw = json!({
            "solved": "not-a-bool",
            "messages": 7,
            "action_log": ["connection error"],
            "leads": {"unexpected": "object"},
            "started_at": false,
        });
        let report = AttemptReport::from_value(&raw);
        assert!(!report.solved);
        assert!(report.messages.is_empty());
        assert_eq!(report.action_log.len(), 1);
        assert!(report.leads.is_empty());
        assert!(report.started_at.is_none());
    }

    #[test]
    fn from_value_reads_well_formed_fields() {
        let raw = json!({
            "solved": true,
            "action_log": ["step failed"],
            "leads": ["weak credential on admin panel"],
        });
        let report = AttemptReport::from_value(&raw);
        assert!(report.solved);
        let summary = summarize(&report, "s");
        assert_eq!(summary.failed_methods, vec!["step failed"]);
        assert_eq!(summary.key_findings, vec!["weak credential on admin panel"]);
    }
}
