//! MQTT command-line client - Main Entry Point

use clap::Parser;
use mqtt_cli::cli::Cli;
use mqtt_cli::observability::init_default_logging;
use std::process;
use tracing::debug;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.verbose);
    debug!("Starting mqtt-cli v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = mqtt_cli::app::run(cli).await {
        if e.is_startup_failure() {
            eprintln!("mqtt-cli: cannot start: {}", e.diagnostic());
        } else {
            eprintln!("mqtt-cli: {}", e.diagnostic());
        }
        process::exit(1);
    }
}
