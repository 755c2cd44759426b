//! Runtime configuration for a two-model session.
//!
//! The configuration is an explicit immutable value: built once via
//! [`DuetConfig::from_env`] (or assembled directly in tests), validated, and
//! passed by reference into the provider and session driver. Nothing reads
//! the environment after construction.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (e.g. `DUET_BACKEND`)
//! 2. Built-in defaults
//!
//! ## Backends
//!
//! | Backend        | Main model             | Advisor model        |
//! |----------------|------------------------|----------------------|
//! | `hosted-api`   | DeepSeek chat API      | MiniMax via hosted API |
//! | `local-runtime`| Ollama/vLLM, main tag  | Ollama/vLLM, advisor tag |

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Total attempt budget: one original attempt plus four retries.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Environment-variable names recognized by [`DuetConfig::from_env`].
const ENV_BACKEND: &str = "DUET_BACKEND";
const ENV_API_KEY: &str = "DUET_API_KEY";
const ENV_API_KEY_FALLBACK: &str = "OPENAI_API_KEY";
const ENV_API_BASE_URL: &str = "DUET_API_BASE_URL";
const ENV_API_MAIN_MODEL: &str = "DUET_API_MAIN_MODEL";
const ENV_ADVISOR_API_KEY: &str = "DUET_ADVISOR_API_KEY";
const ENV_ADVISOR_BASE_URL: &str = "DUET_ADVISOR_BASE_URL";
const ENV_ADVISOR_MODEL: &str = "DUET_ADVISOR_MODEL";
const ENV_LOCAL_BASE_URL: &str = "DUET_LOCAL_BASE_URL";
const ENV_LOCAL_MAIN_MODEL: &str = "DUET_LOCAL_MAIN_MODEL";
const ENV_LOCAL_ADVISOR_MODEL: &str = "DUET_LOCAL_ADVISOR_MODEL";
const ENV_TEMPERATURE: &str = "DUET_TEMPERATURE";
const ENV_CONTEXT_WINDOW: &str = "DUET_CONTEXT_WINDOW";
const ENV_MAX_OUTPUT_TOKENS: &str = "DUET_MAX_OUTPUT_TOKENS";
const ENV_TIMEOUT_SECS: &str = "DUET_TIMEOUT_SECS";
const ENV_MAX_ATTEMPTS: &str = "DUET_MAX_ATTEMPTS";

/// Inference backend family. Dispatched exactly once, at provider
/// construction; downstream code only ever sees [`crate::provider::ModelHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Hosted OpenAI-compatible API (DeepSeek solver + MiniMax advisor).
    HostedApi,
    /// Local OpenAI-compatible runtime (Ollama, vLLM, llama.cpp).
    LocalRuntime,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostedApi => write!(f, "hosted_api"),
            Self::LocalRuntime => write!(f, "local_runtime"),
        }
    }
}

impl FromStr for Backend {
    type Err = SessionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "api" | "hosted" | "hosted-api" | "hosted_api" => Ok(Self::HostedApi),
            "ollama" | "local" | "local-runtime" | "local_runtime" => Ok(Self::LocalRuntime),
            other => Err(SessionError::Configuration(format!(
                "{ENV_BACKEND} must be \"api\" or \"ollama\", got \"{other}\""
            ))),
        }
    }
}

/// Hosted OpenAI-compatible endpoints for the solver/advisor pairing.
///
/// The advisor runs against its own endpoint; when no separate advisor key
/// is configured the main key is reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostedApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub main_model: String,
    pub advisor_base_url: String,
    pub advisor_api_key: Option<String>,
    pub advisor_model: String,
}

impl Default for HostedApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com/v1".to_string(),
            api_key: None,
            main_model: "deepseek-chat".to_string(),
            advisor_base_url: "https://api.siliconflow.cn/v1".to_string(),
            advisor_api_key: None,
            advisor_model: "MiniMaxAI/MiniMax-M2".to_string(),
        }
    }
}

/// Local OpenAI-compatible runtime endpoint.
///
/// `base_url` is the server root; the provider appends `/v1` for chat
/// completions and `/api/tags` for the availability probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalRuntimeConfig {
    pub base_url: String,
    pub main_model: String,
    pub advisor_model: String,
}

impl Default for LocalRuntimeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            main_model: "deepseek-r1:32b".to_string(),
            advisor_model: "qwen3:latest".to_string(),
        }
    }
}

/// Generation parameters, consumed opaquely by the provider and executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Sampling temperature for the solver.
    pub temperature: f64,
    /// Sampling temperature for the advisor (runs slightly hotter).
    pub advisor_temperature: f64,
    /// Context window size in tokens, forwarded to local runtimes.
    pub context_window: u64,
    /// Maximum tokens per response.
    pub max_output_tokens: u64,
    /// Wall-clock budget per model invocation.
    pub timeout: Duration,
    /// Transport-level retries per invocation (exponential backoff).
    pub max_transport_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            advisor_temperature: 0.7,
            context_window: 8_192,
            max_output_tokens: 4_096,
            timeout: Duration::from_secs(300),
            max_transport_retries: 3,
        }
    }
}

/// Top-level session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuetConfig {
    pub backend: Backend,
    pub hosted: HostedApiConfig,
    pub local: LocalRuntimeConfig,
    pub generation: GenerationConfig,
    /// Total attempt budget for one session.
    pub max_attempts: u32,
}

impl Default for DuetConfig {
    fn default() -> Self {
        Self {
            backend: Backend::HostedApi,
            hosted: HostedApiConfig::default(),
            local: LocalRuntimeConfig::default(),
            generation: GenerationConfig::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl DuetConfig {
    /// Build from environment, falling back to defaults, then validate.
    ///
    /// # Errors
    ///
    /// `SessionError::Configuration` when `DUET_BACKEND` is unrecognized,
    /// the hosted backend has no API key, or a numeric parameter is out of
    /// range.
    pub fn from_env() -> Result<Self, SessionError> {
        let mut config = Self::default();

        if let Some(raw) = env_string(ENV_BACKEND) {
            config.backend = raw.parse()?;
        }

        config.hosted.api_key = env_string(ENV_API_KEY).or_else(|| env_string(ENV_API_KEY_FALLBACK));
        if let Some(url) = env_string(ENV_API_BASE_URL) {
            config.hosted.base_url = url;
        }
        if let Some(model) = env_string(ENV_API_MAIN_MODEL) {
            config.hosted.main_model = model;
        }
        config.hosted.advisor_api_key = env_string(ENV_ADVISOR_API_KEY);
        if let Some(url) = env_string(ENV_ADVISOR_BASE_URL) {
            config.hosted.advisor_base_url = url;
        }
        if let Some(model) = env_string(ENV_ADVISOR_MODEL) {
            config.hosted.advisor_model = model;
        }

        if let Some(url) = env_string(ENV_LOCAL_BASE_URL) {
            config.local.base_url = url;
        }
        if let Some(model) = env_string(ENV_LOCAL_MAIN_MODEL) {
            config.local.main_model = model;
        }
        if let Some(model) = env_string(ENV_LOCAL_ADVISOR_MODEL) {
            config.local.advisor_model = model;
        }

        if let Some(temperature) = env_parse(ENV_TEMPERATURE) {
            config.generation.temperature = temperature;
        }
        if let Some(window) = env_parse(ENV_CONTEXT_WINDOW) {
            config.generation.context_window = window;
        }
        if let Some(tokens) = env_parse(ENV_MAX_OUTPUT_TOKENS) {
            config.generation.max_output_tokens = tokens;
        }
        if let Some(secs) = env_parse::<u64>(ENV_TIMEOUT_SECS) {
            config.generation.timeout = Duration::from_secs(secs);
        }
        if let Some(max) = env_parse(ENV_MAX_ATTEMPTS) {
            config.max_attempts = max;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the assembled configuration.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.backend == Backend::HostedApi && self.hosted.api_key.is_none() {
            return Err(SessionError::Configuration(format!(
                "hosted API backend requires {ENV_API_KEY} (or {ENV_API_KEY_FALLBACK})"
            )));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(SessionError::Configuration(format!(
                "temperature must be in [0, 2], got {}",
                self.generation.temperature
            )));
        }
        if !(0.0..=2.0).contains(&self.generation.advisor_temperature) {
            return Err(SessionError::Configuration(format!(
                "advisor temperature must be in [0, 2], got {}",
                self.generation.advisor_temperature
            )));
        }
        if self.generation.context_window == 0 {
            return Err(SessionError::Configuration(
                "context_window must be > 0".to_string(),
            ));
        }
        if self.generation.max_output_tokens == 0 {
            return Err(SessionError::Configuration(
                "max_output_tokens must be > 0".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(SessionError::Configuration(
                "max_attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
