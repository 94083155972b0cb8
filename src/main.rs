use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use classcal::storage::config::Config;

mod cli;
use cli::{parse_cli_command, print_usage, run};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_or_create().context("Failed to load configuration")?;
    let _guard = setup_logging(&config);

    let command = match parse_cli_command() {
        Ok(command) => command,
        Err(err) => {
            eprintln!("Error: {}", err);
            print_usage();
            return Ok(());
        }
    };

    tracing::info!("Running command {:?}", command);
    if let Err(e) = run(command, &config).await {
        tracing::error!("Command failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

fn setup_logging(config: &Config) -> WorkerGuard {
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, "classcal.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .init();

    tracing::info!("classcal started");
    guard
}
