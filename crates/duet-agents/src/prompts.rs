//! Preamble constants and prompt builders for the solver/advisor pairing.

/// Preamble for the model currently driving the attempt.
pub const SOLVER_PREAMBLE: &str = "\
You are the primary solver in a two-model session working on a hard, \
competition-style challenge. You get a bounded number of attempts; each \
prompt may include a history of prior attempts made by you or your partner \
model.

Rules:
- Read the prior attempt history first. Methods listed there have already \
failed; do not repeat them.
- Prefer a materially different angle over a small variation of a failed one.
- Be concrete: name the exact method, payload, or computation you try.
- Follow the response format at the end of the prompt exactly.";

/// Preamble for the model consulted before each attempt.
pub const ADVISOR_PREAMBLE: &str = "\
You are the advisor in a two-model session working on a hard, \
competition-style challenge. Another model drives the attempt; your job is \
to study the task and the history of failed attempts, then propose one \
concrete angle the driver has not tried yet.

Keep it short: a few sentences naming the approach and why it sidesteps the \
recorded failures. Do not solve the task yourself.";

/// Appended to every solver prompt so the response parses into a report.
pub const RESPONSE_CONTRACT: &str = "\
## Response Format

Work the task, then report in exactly this structure:

ACTIONS:
- one line per method you tried, stating its outcome (e.g. \"failed: ...\")
FINDINGS:
- one line per fact, lead, or partial result you discovered
VERDICT: solved or stuck

Finish with `VERDICT: solved` only when you have a complete, verified answer.
";

/// Compose the primary solver's prompt for one attempt.
pub fn solver_prompt(task: &str, history: &str, advice: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("# Task\n\n{task}\n\n"));
    if !history.is_empty() {
        prompt.push_str(history);
        prompt.push('\n');
    }
    if !advice.is_empty() {
        prompt.push_str(&format!("## Advisor Suggestion\n\n{advice}\n\n"));
    }
    prompt.push_str(RESPONSE_CONTRACT);
    prompt
}

/// Compose the advisor's consultation prompt for one attempt.
pub fn advisor_prompt(task: &str, history: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("# Task\n\n{task}\n\n"));
    if !history.is_empty() {
        prompt.push_str(history);
        prompt.push('\n');
    }
    prompt.push_str("Suggest one concrete angle the driver has not tried yet.\n");
    prompt
}
