//! Model provider: builds the session's two long-lived model handles.
//!
//! Both backend families are addressed through OpenAI-compatible endpoints
//! (a local runtime exposes chat completions under `/v1`), so the backend
//! choice is dispatched exactly once here. Every downstream consumer sees
//! the same [`ModelHandle`] type and never branches on backend again.
//!
//! The handles are shared, read-only references: created once, cheaply
//! cloned into each role assignment, never mutated.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::{Backend, DuetConfig};
use crate::error::SessionError;
use crate::prompts;

/// Type alias for agents built from OpenAI-compatible endpoints.
pub type OaiAgent = Agent<openai::completion::CompletionModel>;

/// Display labels for the hosted-API pairing.
const HOSTED_MAIN_LABEL: &str = "DeepSeek";
const HOSTED_ADVISOR_LABEL: &str = "MiniMax";

/// Local servers accept any non-empty API key.
const LOCAL_API_KEY: &str = "local";

/// Timeout for endpoint reachability probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Opaque reference to a configured model.
///
/// Capability: given context, produce a response. The wrapped agent is
/// text-only; tool execution belongs to the surrounding application.
#[derive(Clone)]
pub struct ModelHandle {
    agent: Arc<OaiAgent>,
    display_name: Arc<str>,
}

impl ModelHandle {
    pub fn new(agent: OaiAgent, display_name: impl Into<Arc<str>>) -> Self {
        Self {
            agent: Arc::new(agent),
            display_name: display_name.into(),
        }
    }

    /// Backend-dependent human-readable name, used in strategy descriptions.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Send one prompt to the model and return its text response.
    pub async fn invoke(&self, context: &str) -> Result<String, SessionError> {
        self.agent
            .prompt(context)
            .await
            .map_err(|e| SessionError::Inference(format!("{}: {e}", self.display_name)))
    }

    /// `true` when both handles wrap the same underlying agent.
    pub fn same_agent(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.agent, &other.agent)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Builds and owns the two model handles for one session.
#[derive(Debug)]
pub struct ModelProvider {
    main: ModelHandle,
    advisor: ModelHandle,
    config: DuetConfig,
}

impl ModelProvider {
    /// Build both handles for the configured backend.
    ///
    /// # Errors
    ///
    /// `SessionError::Configuration` when required credentials are absent or
    /// a client cannot be assembled from the endpoint settings.
    pub fn new(config: &DuetConfig) -> Result<Self, SessionError> {
        let (main, advisor) = match config.backend {
            Backend::HostedApi => build_hosted(config)?,
            Backend::LocalRuntime => build_local(config)?,
        };

        info!(
            backend = %config.backend,
            main = main.display_name(),
            advisor = advisor.display_name(),
            "model provider ready"
        );

        Ok(Self {
            main,
            advisor,
            config: config.clone(),
        })
    }

    /// Handle for the session's main model.
    pub fn main_handle(&self) -> ModelHandle {
        self.main.clone()
    }

    /// Handle for the session's advisor model.
    pub fn advisor_handle(&self) -> ModelHandle {
        self.advisor.clone()
    }

    /// Check the backend endpoint is reachable before starting a session.
    ///
    /// Hosted backends answer `GET {base}/models`; local runtimes answer
    /// `GET {base}/api/tags`, whose tag list is also checked so a missing
    /// model is surfaced as a warning instead of a mid-session failure.
    pub async fn verify_connectivity(&self) -> Result<(), SessionError> {
        match self.config.backend {
            Backend::HostedApi => {
                let url = format!("{}/models", self.config.hosted.base_url.trim_end_matches('/'));
                probe(&url).await?;
                Ok(())
            }
            Backend::LocalRuntime => {
                let base = self.config.local.base_url.trim_end_matches('/');
                let url = format!("{base}/api/tags");
                let body = probe(&url).await?;

                let available: Vec<String> = body
                    .get("models")
                    .and_then(Value::as_array)
                    .map(|models| {
                        models
                            .iter()
                            .filter_map(|m| m.get("name").and_then(Value::as_str))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();

                for model in [&self.config.local.main_model, &self.config.local.advisor_model] {
                    if !available.iter().any(|name| name == model) {
                        warn!(
                            model = %model,
                            "model not found on local runtime; pull it before starting a session"
                        );
                    }
                }
                Ok(())
            }
        }
    }
}

/// GET a probe URL and decode the JSON body (empty object when not JSON).
async fn probe(url: &str) -> Result<Value, SessionError> {
    let response = reqwest::Client::new()
        .get(url)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
        .map_err(|e| SessionError::Connection(format!("cannot reach {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(SessionError::Connection(format!(
            "{url} returned {}",
            response.status()
        )));
    }

    Ok(response.json::<Value>().await.unwrap_or_else(|_| json!({})))
}

fn client(base_url: &str, api_key: &str) -> Result<openai::CompletionsClient, SessionError> {
    openai::CompletionsClient::builder()
        .api_key(api_key)
        .base_url(base_url)
        .build()
        .map_err(|e| {
            SessionError::Configuration(format!("failed to build client for {base_url}: {e}"))
        })
}

fn build_hosted(config: &DuetConfig) -> Result<(ModelHandle, ModelHandle), SessionError> {
    let hosted = &config.hosted;
    let api_key = hosted.api_key.as_deref().ok_or_else(|| {
        SessionError::Configuration("hosted API backend requires an API key".to_string())
    })?;

    let main_client = client(&hosted.base_url, api_key)?;
    let main_agent = main_client
        .agent(&hosted.main_model)
        .name("solver")
        .description("Primary solver driving the session's task")
        .preamble(prompts::SOLVER_PREAMBLE)
        .temperature(config.generation.temperature)
        .max_tokens(config.generation.max_output_tokens)
        .build();

    let advisor_key = hosted.advisor_api_key.as_deref().unwrap_or(api_key);
    let advisor_client = client(&hosted.advisor_base_url, advisor_key)?;
    let advisor_agent = advisor_client
        .agent(&hosted.advisor_model)
        .name("advisor")
        .description("Second opinion consulted before each attempt")
        .preamble(prompts::ADVISOR_PREAMBLE)
        .temperature(config.generation.advisor_temperature)
        .max_tokens(config.generation.max_output_tokens)
        .build();

    Ok((
        ModelHandle::new(main_agent, HOSTED_MAIN_LABEL),
        ModelHandle::new(advisor_agent, HOSTED_ADVISOR_LABEL),
    ))
}

fn build_local(config: &DuetConfig) -> Result<(ModelHandle, ModelHandle), SessionError> {
    let local = &config.local;
    let base_url = format!("{}/v1", local.base_url.trim_end_matches('/'));

    // One client serves both models; selection happens via the model name
    // in the request.
    let shared = client(&base_url, LOCAL_API_KEY)?;
    let runtime_options = json!({ "num_ctx": config.generation.context_window });

    let main_agent = shared
        .agent(&local.main_model)
        .name("solver")
        .description("Primary solver driving the session's task")
        .preamble(prompts::SOLVER_PREAMBLE)
        .temperature(config.generation.temperature)
        .max_tokens(config.generation.max_output_tokens)
        .additional_params(runtime_options.clone())
        .build();

    let advisor_agent = shared
        .agent(&local.advisor_model)
        .name("advisor")
        .description("Second opinion consulted before each attempt")
        .preamble(prompts::ADVISOR_PREAMBLE)
        .temperature(config.generation.advisor_temperature)
        .max_tokens(config.generation.max_output_tokens)
        .additional_params(runtime_options)
        .build();

    Ok((
        ModelHandle::new(main_agent, local.main_model.as_str()),
        ModelHandle::new(advisor_agent, local.advisor_model.as_str()),
    ))
}
