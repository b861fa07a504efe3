//! wireless-sensor-mqtt - Main Entry Point
//!
//! Relays FT017TH measurements to an MQTT broker until the session fails.

use clap::Parser;
use std::process;
use tracing::{error, info};
use wireless_sensor_mqtt::bootstrap;
use wireless_sensor_mqtt::cli::Cli;
use wireless_sensor_mqtt::observability::init_default_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.debug);

    info!(
        "Starting wireless-sensor-mqtt v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    match bootstrap::run(&config).await {
        Ok(never) => match never {},
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
