use clap::Parser;
use tracing::{error, info};

use certkeeper::{
    cli::{self, Cli},
    config::AppConfig,
    observability::{init_observability, log_config_info},
    APP_NAME, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before any configuration is read from the environment
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    init_observability(&config.observability)?;
    info!(app_name = APP_NAME, version = VERSION, "Starting certkeeper");
    log_config_info(&config);

    match cli::run(cli.command, &config).await {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!(error = %e, "Command failed");
            Err(e)
        }
    }
}
