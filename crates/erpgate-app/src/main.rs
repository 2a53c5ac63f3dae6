use anyhow::Result;
use clap::Parser;
use erpgate_app::cli::{self, Cli};
use erpgate_app::logging::{self, LoggingConfig};
use erpgate_app::settings::GatewaySettings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = GatewaySettings::resolve_path(cli.config.as_deref())?;
    let settings = GatewaySettings::load_with_env(path.as_deref())?;

    let mut log_config = LoggingConfig::from_settings(&settings.logging);
    if let Some(filter) = cli.log_level {
        log_config.default_filter = filter;
    }
    // Flushes the file writer on exit
    let _guard = logging::init(log_config)?;

    match &path {
        Some(path) => tracing::info!(path = %path.display(), "loaded settings"),
        None => tracing::info!("no settings file found, using defaults"),
    }

    cli::run(cli.command, settings).await
}
