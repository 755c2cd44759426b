//! Role rotation across retries: which model drives, which advises.
//!
//! A single model re-prompted over its own failed transcript tends to retry
//! the same reasoning, so the rotation is strict: even retry indices put
//! the main model in the driver's seat, odd indices hand the wheel to the
//! advisor. The pairing changes, the infrastructure does not.
//!
//! Role assignment is pure apart from an informational log: the same retry
//! index always yields the same two handles in the same roles.

use tracing::info;

use crate::attempt::AttemptSummary;
use crate::config::DuetConfig;
use crate::error::SessionError;
use crate::history;
use crate::provider::{ModelHandle, ModelProvider};

/// Role assignment for one retry.
///
/// Recomputed fresh on every call; holds cheap clones of the two
/// session-lifetime handles, each assigned to exactly one role.
#[derive(Debug, Clone)]
pub struct RolePair {
    /// Drives the attempt.
    pub primary: ModelHandle,
    /// Consulted for a second opinion.
    pub advisor: ModelHandle,
    /// Human-readable description of the pairing.
    pub description: String,
}

/// Two-model retry orchestrator.
///
/// Owns the session's two model handles and the append-only attempt
/// history. Constructed once per task-solving session; the handles live
/// for its whole lifetime and are never reinitialized between retries.
pub struct RetryStrategy {
    main: ModelHandle,
    advisor: ModelHandle,
    attempts: Vec<AttemptSummary>,
}

impl RetryStrategy {
    /// Build both model handles from config and verify the backend is
    /// reachable.
    ///
    /// # Errors
    ///
    /// Provider errors surface unchanged: `Configuration` for missing
    /// credentials, `Connection` for an unreachable endpoint. Either is
    /// fatal before any retry loop starts.
    pub async fn connect(config: &DuetConfig) -> Result<Self, SessionError> {
        let provider = ModelProvider::new(config)?;
        provider.verify_connectivity().await?;
        Ok(Self::from_handles(
            provider.main_handle(),
            provider.advisor_handle(),
        ))
    }

    /// Assemble a strategy from pre-built handles.
    pub fn from_handles(main: ModelHandle, advisor: ModelHandle) -> Self {
        Self {
            main,
            advisor,
            attempts: Vec::new(),
        }
    }

    /// Decide which model drives attempt `retry_index` (0 = first attempt).
    ///
    /// Even indices keep the main model primary; odd indices swap the
    /// pair. Valid for any index; the caller owns the retry budget.
    pub fn assign_roles(&self, retry_index: u32) -> RolePair {
        let swapped = retry_index % 2 == 1;
        let (primary, advisor) = if swapped {
            (self.advisor.clone(), self.main.clone())
        } else {
            (self.main.clone(), self.advisor.clone())
        };

        let mut description = format!(
            "{} (primary) + {} (advisor)",
            primary.display_name(),
            advisor.display_name()
        );
        if retry_index > 0 {
            description.push_str(&format!(" [retry {retry_index}]"));
        }

        if swapped {
            info!(
                retry_index,
                primary = primary.display_name(),
                "role swap: advisor drives this attempt"
            );
        }
        info!(retry_index, strategy = %description, "roles assigned");

        RolePair {
            primary,
            advisor,
            description,
        }
    }

    /// Append one attempt's summary to the session history.
    pub fn record_attempt(&mut self, summary: AttemptSummary) {
        self.attempts.push(summary);
    }

    /// Summaries recorded so far, in chronological order.
    pub fn attempts(&self) -> &[AttemptSummary] {
        &self.attempts
    }

    /// Render the history for injection into the next attempt's context.
    pub fn formatted_history(&self) -> String {
        history::format_attempt_history(&self.attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::summarize;
    use crate::attempt::AttemptReport;
    use rig::client::CompletionClient;
    use rig::providers::openai;

    fn handle(name: &str) -> ModelHandle {
        let client = openai::CompletionsClient::builder()
            .api_key("test")
            .base_url("http://127.0.0.1:9/v1")
            .build()
            .expect("client");
        ModelHandle::new(client.agent(name).build(), name)
    }

    fn strategy() -> RetryStrategy {
        RetryStrategy::from_handles(handle("main-model"), handle("advisor-model"))
    }

    #[tokio::test]
    async fn primary_alternates_by_retry_parity() {
        let strategy = strategy();
        let primaries: Vec<String> = (0..5)
            .map(|i| strategy.assign_roles(i).primary.display_name().to_string())
            .collect();
        assert_eq!(
            primaries,
            vec![
                "main-model",
                "advisor-model",
                "main-model",
                "advisor-model",
                "main-model"
            ]
        );
    }

    #[tokio::test]
    async fn advisor_is_always_the_complementary_handle() {
        let strategy = strategy();
        for index in 0..6 {
            let pair = strategy.assign_roles(index);
            assert!(!pair.primary.same_agent(&pair.advisor));
            assert!(
                pair.primary.same_agent(&strategy.main) || pair.primary.same_agent(&strategy.advisor)
            );
        }
    }

    #[tokio::test]
    async fn assignment_is_identity_stable() {
        let strategy = strategy();
        let first = strategy.assign_roles(3);
        let second = strategy.assign_roles(3);
        assert!(first.primary.same_agent(&second.primary));
        assert!(first.advisor.same_agent(&second.advisor));
        assert_eq!(first.description, second.description);
    }

    #[tokio::test]
    async fn description_includes_retry_index_after_first_attempt() {
        let strategy = strategy();
        assert!(!strategy.assign_roles(0).description.contains("[retry"));
        assert!(strategy.assign_roles(3).description.contains("[retry 3]"));
        assert!(strategy
            .assign_roles(0)
            .description
            .contains("main-model (primary) + advisor-model (advisor)"));
    }

    #[tokio::test]
    async fn large_indices_follow_the_same_parity() {
        let strategy = strategy();
        assert_eq!(
            strategy.assign_roles(1000).primary.display_name(),
            "main-model"
        );
        assert_eq!(
            strategy.assign_roles(1001).primary.display_name(),
            "advisor-model"
        );
    }

    #[tokio::test]
    async fn history_is_append_only_and_chronological() {
        let mut strategy = strategy();
        assert_eq!(strategy.formatted_history(), "");

        let report = AttemptReport {
            action_log: vec![serde_json::json!("enumeration failed: no open ports")],
            ..AttemptReport::default()
        };
        strategy.record_attempt(summarize(&report, "first pairing"));
        strategy.record_attempt(summarize(&AttemptReport::default(), "second pairing"));

        assert_eq!(strategy.attempts().len(), 2);
        assert_eq!(strategy.attempts()[0].strategy_label, "first pairing");
        let text = strategy.formatted_history();
        assert!(text.contains("enumeration failed: no open ports"));
    }
}
