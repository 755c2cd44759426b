//! End-to-end session loop test with a scripted executor.
//!
//! Exercises the public surface the way the binary does: build handles,
//! assemble a strategy, drive the retry loop, and check that role rotation
//! and history injection behave across a whole session.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::providers::openai;
use serde_json::json;

use duet_agents::attempt::AttemptReport;
use duet_agents::error::SessionError;
use duet_agents::provider::ModelHandle;
use duet_agents::session::{AttemptExecutor, SessionOutcome, SessionRunner};
use duet_agents::strategy::{RetryStrategy, RolePair};

fn handle(name: &str) -> ModelHandle {
    let client = openai::CompletionsClient::builder()
        .api_key("test")
        .base_url("http://127.0.0.1:9/v1")
        .build()
        .expect("client builds offline");
    ModelHandle::new(client.agent(name).build(), name)
}

fn strategy() -> RetryStrategy {
    RetryStrategy::from_handles(handle("main-model"), handle("advisor-model"))
}

/// Scripted executor that records the pairings and histories it was given.
struct ScriptedExecutor {
    script: Mutex<VecDeque<AttemptReport>>,
    descriptions: Mutex<Vec<String>>,
    histories: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn new(script: Vec<AttemptReport>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            descriptions: Mutex::new(Vec::new()),
            histories: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AttemptExecutor for ScriptedExecutor {
    async fn run_attempt(
        &self,
        _task: &str,
        roles: &RolePair,
        history: &str,
    ) -> Result<AttemptReport, SessionError> {
        self.descriptions
            .lock()
            .unwrap()
            .push(roles.description.clone());
        self.histories.lock().unwrap().push(history.to_string());
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

fn failed_report(method: &str, finding: &str) -> AttemptReport {
    AttemptReport {
        action_log: vec![json!(format!("{method}: request failed"))],
        leads: vec![json!(finding)],
        ..AttemptReport::default()
    }
}

#[tokio::test]
async fn full_session_rotates_roles_and_accumulates_history() {
    let executor = ScriptedExecutor::new(vec![
        failed_report("default credentials", "login rate-limits after 5 tries"),
        failed_report("session fixation", "token is a raw UNIX timestamp"),
        AttemptReport {
            solved: true,
            ..AttemptReport::default()
        },
    ]);
    let mut runner = SessionRunner::new(strategy(), executor, 5);

    let outcome = runner.run("capture the flag").await.expect("session runs");
    assert_eq!(outcome, SessionOutcome::Solved { attempts: 3 });

    let descriptions = runner_descriptions(&runner);
    assert!(descriptions[0].starts_with("main-model (primary) + advisor-model (advisor)"));
    assert!(descriptions[1].starts_with("advisor-model (primary) + main-model (advisor)"));
    assert!(descriptions[1].ends_with("[retry 1]"));
    assert!(descriptions[2].ends_with("[retry 2]"));

    let histories = runner_histories(&runner);
    assert_eq!(histories[0], "");
    assert!(histories[1].contains("default credentials: request failed"));
    assert!(histories[2].contains("session fixation: request failed"));
    assert!(histories[2].contains("token is a raw UNIX timestamp"));
    // The cautionary close appears once per rendered history.
    assert_eq!(histories[2].matches("already failed").count(), 1);
}

#[tokio::test]
async fn exhausted_session_keeps_one_summary_per_attempt() {
    let executor = ScriptedExecutor::new(vec![
        failed_report("a", "x"),
        failed_report("b", "y"),
        failed_report("c", "z"),
    ]);
    let mut runner = SessionRunner::new(strategy(), executor, 3);

    let outcome = runner.run("capture the flag").await.expect("session runs");
    assert_eq!(outcome, SessionOutcome::Exhausted { attempts: 3 });
    assert_eq!(runner.strategy().attempts().len(), 3);

    // Rendering the final history twice yields identical text.
    assert_eq!(
        runner.strategy().formatted_history(),
        runner.strategy().formatted_history()
    );
}

fn runner_descriptions(runner: &SessionRunner<ScriptedExecutor>) -> Vec<String> {
    runner_executor(runner).descriptions.lock().unwrap().clone()
}

fn runner_histories(runner: &SessionRunner<ScriptedExecutor>) -> Vec<String> {
    runner_executor(runner).histories.lock().unwrap().clone()
}

fn runner_executor(runner: &SessionRunner<ScriptedExecutor>) -> &ScriptedExecutor {
    runner.executor()
}
