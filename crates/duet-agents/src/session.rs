//! Session driver: the bounded, strictly sequential retry loop.
//!
//! The driver owns the retry budget. For each retry index it asks the
//! strategy for a role assignment, renders the accumulated history, and
//! hands execution to an [`AttemptExecutor`]. A non-solved attempt is
//! summarized and appended to the history before the next iteration, so no
//! two attempts ever run concurrently.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::attempt::{self, AttemptReport, ToolCallRecord, TranscriptMessage};
use crate::config::DuetConfig;
use crate::error::SessionError;
use crate::prompts;
use crate::provider::ModelHandle;
use crate::strategy::{RetryStrategy, RolePair};

/// Terminal outcome of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SessionOutcome {
    /// The task was solved on the given 1-based attempt.
    Solved { attempts: u32 },
    /// The attempt budget ran out without a solution.
    Exhausted { attempts: u32 },
}

impl SessionOutcome {
    pub fn is_solved(&self) -> bool {
        matches!(self, Self::Solved { .. })
    }
}

/// Executes one attempt with the assigned roles and accumulated history.
///
/// The seam between the orchestration core and task-specific solving
/// logic: tests script it, the binary uses [`LiveExecutor`].
#[async_trait]
pub trait AttemptExecutor: Send + Sync {
    async fn run_attempt(
        &self,
        task: &str,
        roles: &RolePair,
        history: &str,
    ) -> Result<AttemptReport, SessionError>;
}

/// Drives a [`RetryStrategy`] through the attempt budget.
pub struct SessionRunner<E> {
    strategy: RetryStrategy,
    executor: E,
    max_attempts: u32,
}

impl<E: AttemptExecutor> SessionRunner<E> {
    pub fn new(strategy: RetryStrategy, executor: E, max_attempts: u32) -> Self {
        Self {
            strategy,
            executor,
            max_attempts,
        }
    }

    /// Run attempts until the task is solved or the budget is spent.
    ///
    /// Fatal errors abort the session; a non-fatal executor error consumes
    /// the attempt and is recorded in the history like any other failure.
    pub async fn run(&mut self, task: &str) -> Result<SessionOutcome, SessionError> {
        for retry_index in 0..self.max_attempts {
            let roles = self.strategy.assign_roles(retry_index);
            let history = self.strategy.formatted_history();
            info!(retry_index, strategy = %roles.description, "attempt starting");

            let report = match self.executor.run_attempt(task, &roles, &history).await {
                Ok(report) => report,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(retry_index, error = %e, "attempt aborted; recording as failed");
                    failure_report(&e)
                }
            };

            if report.solved {
                info!(retry_index, "task solved");
                return Ok(SessionOutcome::Solved {
                    attempts: retry_index + 1,
                });
            }

            let summary = attempt::summarize(&report, &roles.description);
            info!(
                retry_index,
                failed_methods = summary.failed_methods.len(),
                key_findings = summary.key_findings.len(),
                "attempt failed; summary recorded"
            );
            self.strategy.record_attempt(summary);
        }

        warn!(max_attempts = self.max_attempts, "attempt budget exhausted");
        Ok(SessionOutcome::Exhausted {
            attempts: self.max_attempts,
        })
    }

    /// The underlying strategy, e.g. for rendering the final history.
    pub fn strategy(&self) -> &RetryStrategy {
        &self.strategy
    }

    /// The injected executor.
    pub fn executor(&self) -> &E {
        &self.executor
    }
}

/// Report standing in for an attempt that died before producing one.
fn failure_report(error: &SessionError) -> AttemptReport {
    AttemptReport {
        action_log: vec![Value::String(format!("attempt aborted: {error}"))],
        started_at: Some(Utc::now()),
        ..AttemptReport::default()
    }
}

/// Text-only live executor: consults the advisor, then prompts the primary.
///
/// Neither agent carries tools; the primary reports its work through the
/// structured response contract in [`prompts`], which is parsed into an
/// [`AttemptReport`]. A failed advisor consult degrades to no advice
/// rather than losing the attempt.
pub struct LiveExecutor {
    timeout: Duration,
    max_transport_retries: u32,
}

impl LiveExecutor {
    pub fn new(config: &DuetConfig) -> Self {
        Self {
            timeout: config.generation.timeout,
            max_transport_retries: config.generation.max_transport_retries,
        }
    }

    /// Invoke a handle with timeout and exponential backoff on transient
    /// failures.
    async fn invoke_with_retry(
        &self,
        handle: &ModelHandle,
        prompt: &str,
    ) -> Result<String, SessionError> {
        let mut transport_attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.timeout, handle.invoke(prompt)).await {
                Ok(result) => result,
                Err(_) => Err(SessionError::Inference(format!(
                    "{}: no response within {}s",
                    handle.display_name(),
                    self.timeout.as_secs()
                ))),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if transport_attempt >= self.max_transport_retries {
                        return Err(e);
                    }
                    let backoff = Duration::from_secs(2u64.pow(transport_attempt + 1));
                    warn!(
                        attempt = transport_attempt + 1,
                        max_retries = self.max_transport_retries,
                        backoff_secs = backoff.as_secs(),
                        error = %e,
                        "transient inference failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    transport_attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl AttemptExecutor for LiveExecutor {
    async fn run_attempt(
        &self,
        task: &str,
        roles: &RolePair,
        history: &str,
    ) -> Result<AttemptReport, SessionError> {
        let started_at = Utc::now();

        let consult = prompts::advisor_prompt(task, history);
        let advice = match self.invoke_with_retry(&roles.advisor, &consult).await {
            Ok(advice) => advice,
            Err(e) => {
                warn!(error = %e, "advisor consult failed, continuing without advice");
                String::new()
            }
        };

        let solver_prompt = prompts::solver_prompt(task, history, &advice);
        let response = self.invoke_with_retry(&roles.primary, &solver_prompt).await?;

        Ok(parse_response(&response, &solver_prompt, started_at))
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Actions,
    Findings,
}

/// Parse the structured response contract into a report.
///
/// Lenient: unknown lines are ignored, a missing verdict counts as stuck.
fn parse_response(response: &str, prompt: &str, started_at: DateTime<Utc>) -> AttemptReport {
    let mut actions: Vec<String> = Vec::new();
    let mut findings: Vec<String> = Vec::new();
    let mut solved = false;
    let mut section = Section::None;

    for line in response.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let upper = trimmed.to_ascii_uppercase();
        if upper.starts_with("ACTIONS") {
            section = Section::Actions;
            continue;
        }
        if upper.starts_with("FINDINGS") {
            section = Section::Findings;
            continue;
        }
        if let Some(verdict) = upper.strip_prefix("VERDICT:") {
            solved = verdict.trim().starts_with("SOLVED");
            section = Section::None;
            continue;
        }

        if let Some(item) = trimmed.strip_prefix("- ") {
            match section {
                Section::Actions => actions.push(item.trim().to_string()),
                Section::Findings => findings.push(item.trim().to_string()),
                Section::None => {}
            }
        }
    }

    let tool_calls = actions
        .iter()
        .map(|action| ToolCallRecord {
            name: "reported_action".to_string(),
            arguments: action.clone(),
        })
        .collect();

    AttemptReport {
        solved,
        messages: vec![
            TranscriptMessage::user(prompt),
            TranscriptMessage::assistant(response).with_tool_calls(tool_calls),
        ],
        action_log: actions.into_iter().map(Value::String).collect(),
        leads: findings.into_iter().map(Value::String).collect(),
        started_at: Some(started_at),
    }
}
