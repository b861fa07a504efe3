//! Command line interface
//!
//! Every setting can come from a TOML file (`--config`); flags given on the
//! command line take precedence over the file.

use crate::config::{BridgeConfig, ConfigError, MQTT_DEFAULT_PORT, MQTT_DEFAULT_TLS_PORT};
use clap::Parser;
use std::path::PathBuf;

/// MQTT client reporting measurements of FT017TH wireless thermo/hygrometers
#[derive(Debug, Parser)]
#[command(name = "wireless-sensor-mqtt")]
#[command(version)]
#[command(about = "MQTT client reporting measurements of FT017TH wireless thermo/hygrometers")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub mqtt_host: Option<String>,

    #[arg(
        long,
        help = format!("default {MQTT_DEFAULT_TLS_PORT} ({MQTT_DEFAULT_PORT} with --mqtt-disable-tls)")
    )]
    pub mqtt_port: Option<u16>,

    #[arg(long)]
    pub mqtt_username: Option<String>,

    #[arg(long)]
    pub mqtt_disable_tls: bool,

    #[arg(long, conflicts_with = "mqtt_password_file")]
    pub mqtt_password: Option<String>,

    /// Read the password from a file, stripping one trailing newline
    #[arg(long, value_name = "PATH")]
    pub mqtt_password_file: Option<PathBuf>,

    /// Prefix of the measurement topics [default: wireless-sensor/FT017TH]
    #[arg(long)]
    pub mqtt_topic_prefix: Option<String>,

    /// Home Assistant discovery prefix [default: homeassistant]
    #[arg(long)]
    pub homeassistant_discovery_prefix: Option<String>,

    /// Home Assistant node id, allowed characters: a-zA-Z0-9_- [default: FT017TH]
    #[arg(long)]
    pub homeassistant_node_id: Option<String>,

    /// Publish random values to test MQTT connection
    #[arg(long)]
    pub mock_measurements: bool,

    /// Name of GPIO pin connected to the transceiver's GDO0 pin (e.g. GPIO24)
    #[arg(long)]
    pub gdo0_gpio_line_name: Option<String>,

    /// Release flock from SPI device file after configuring the transceiver.
    /// Useful if another process (infrequently) accesses the transceiver simultaneously.
    #[arg(long)]
    pub unlock_spi_device: bool,

    /// Verbose logging of the CC1101 transceiver, passed to the receiver command
    #[arg(long)]
    pub debug_cc1101: bool,

    /// Receiver command writing one JSON measurement per line [default: wireless-sensor-receive]
    #[arg(long, value_name = "COMMAND")]
    pub receiver_command: Option<String>,

    /// Increase verbosity
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Merge flags over the config file (or the defaults without one)
    pub fn into_config(self) -> Result<BridgeConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::load_from_file(path)?,
            None => BridgeConfig::default(),
        };

        let mqtt = &mut config.mqtt;
        if let Some(host) = self.mqtt_host {
            mqtt.host = host;
        }
        if let Some(port) = self.mqtt_port {
            mqtt.port = Some(port);
        }
        if let Some(username) = self.mqtt_username {
            mqtt.username = Some(username);
        }
        if self.mqtt_disable_tls {
            mqtt.disable_tls = true;
        }
        // a password source on the command line replaces the file's
        if let Some(password) = self.mqtt_password {
            mqtt.password = Some(password);
            mqtt.password_file = None;
        }
        if let Some(password_file) = self.mqtt_password_file {
            mqtt.password_file = Some(password_file);
            mqtt.password = None;
        }
        if let Some(topic_prefix) = self.mqtt_topic_prefix {
            mqtt.topic_prefix = topic_prefix;
        }

        let homeassistant = &mut config.homeassistant;
        if let Some(discovery_prefix) = self.homeassistant_discovery_prefix {
            homeassistant.discovery_prefix = discovery_prefix;
        }
        if let Some(node_id) = self.homeassistant_node_id {
            homeassistant.node_id = node_id;
        }

        let sensor = &mut config.sensor;
        if self.mock_measurements {
            sensor.mock_measurements = true;
        }
        if let Some(line_name) = self.gdo0_gpio_line_name {
            sensor.gdo0_gpio_line_name = Some(line_name);
        }
        if self.unlock_spi_device {
            sensor.unlock_spi_device = true;
        }
        if self.debug_cc1101 {
            sensor.debug_cc1101 = true;
        }
        if let Some(command) = self.receiver_command {
            sensor.receiver_command = command;
        }

        Ok(config)
    }
}
