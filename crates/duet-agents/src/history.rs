//! Renders accumulated attempt summaries into a single context block for
//! the next attempt. The output is opaque to this module; it exists to be
//! injected into the next model invocation, not interpreted here.

use crate::attempt::{AttemptSummary, MAX_FAILED_METHODS, MAX_KEY_FINDINGS};

const HEADING: &str = "## Prior Attempt History (avoid repeating these failures)\n";

const CLOSING_NOTE: &str = "**Important**: every method listed above has already failed. \
Take a materially different approach.\n";

/// Format the attempt history for injection into the next attempt's context.
///
/// Empty history yields an empty string, so the caller can append the
/// result unconditionally. Identical input always produces byte-identical
/// output.
pub fn format_attempt_history(history: &[AttemptSummary]) -> String {
    if history.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    out.push_str(HEADING);
    out.push('\n');

    for (index, summary) in history.iter().enumerate() {
        out.push_str(&format!(
            "### Attempt {}: {}\n",
            index + 1,
            summary.strategy_label
        ));
        out.push_str(&format!("- **Actions taken**: {}\n", summary.attempt_count));

        if !summary.failed_methods.is_empty() {
            out.push_str("- **Methods that failed**:\n");
            for method in summary.failed_methods.iter().take(MAX_FAILED_METHODS) {
                out.push_str(&format!("  - ❌ {method}\n"));
            }
        }

        if !summary.key_findings.is_empty() {
            out.push_str("- **Key findings**:\n");
            for finding in summary.key_findings.iter().take(MAX_KEY_FINDINGS) {
                out.push_str(&format!("  - 💡 {finding}\n"));
            }
        }

        out.push('\n');
    }

    out.push_str(CLOSING_NOTE);
    out
}
