use anyhow::Result;
use clap::Parser;
use tracing::{debug, info, warn};

use duet_agents::config::{Backend, DuetConfig};
use duet_agents::session::{LiveExecutor, SessionOutcome, SessionRunner};
use duet_agents::strategy::RetryStrategy;

/// Two-model task-solving session with role rotation across retries.
#[derive(Parser)]
#[command(name = "duet-agents", version, about)]
struct Cli {
    /// Task description the solver pair should work on.
    task: String,

    /// Inference backend override (default from DUET_BACKEND).
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Total attempt budget override.
    #[arg(long)]
    max_attempts: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = DuetConfig::from_env()?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(max_attempts) = cli.max_attempts {
        config.max_attempts = max_attempts;
    }
    config.validate()?;

    info!(
        backend = %config.backend,
        max_attempts = config.max_attempts,
        "session starting"
    );

    let strategy = RetryStrategy::connect(&config).await?;
    let executor = LiveExecutor::new(&config);
    let mut runner = SessionRunner::new(strategy, executor, config.max_attempts);

    match runner.run(&cli.task).await? {
        SessionOutcome::Solved { attempts } => {
            info!(attempts, "task solved");
            Ok(())
        }
        SessionOutcome::Exhausted { attempts } => {
            warn!(attempts, "all attempts exhausted without a solution");
            debug!(history = %runner.strategy().formatted_history(), "final attempt history");
            std::process::exit(1);
        }
    }
}
