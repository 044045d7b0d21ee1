//! askdb Gateway - Main entry point.

use anyhow::Result;
use askdb_common::config::{config_dir, Config};
use askdb_common::config_loader::check_modular_files;
use askdb_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load and validate configuration
    let config = Config::load_and_validate()?;

    init_logging(&config.observability.log_level, &config.observability.log_format);

    tracing::info!("askdb gateway v{}", env!("CARGO_PKG_VERSION"));
    for (file, present) in check_modular_files(Some(config_dir())) {
        tracing::debug!(file = %file, present, "Config file");
    }

    askdb_gateway::start_server(&config).await
}
