//! Adapter for the external FT017TH receiver
//!
//! The receiver command owns the transceiver (SPI, GPIO, demodulation) and
//! writes one JSON measurement per line to stdout:
//!
//! ```text
//! {"decoding_timestamp":"2020-12-07T18:05:01Z","temperature_degrees_celsius":23.12,"relative_humidity":0.5012}
//! ```

use super::{Measurement, MeasurementSource, SensorError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Receiver wiring passed through to the external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverOptions {
    pub command: String,
    pub gdo0_gpio_line_name: String,
    pub unlock_spi_device: bool,
    /// Verbose transceiver logging in the receiver
    pub debug_cc1101: bool,
    pub receive_timeout: Duration,
}

impl ReceiverOptions {
    /// Arguments for the receiver command
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--gdo0-gpio-line-name".to_string(),
            self.gdo0_gpio_line_name.clone(),
        ];
        if self.unlock_spi_device {
            args.push("--unlock-spi-device".to_string());
        }
        if self.debug_cc1101 {
            args.push("--debug-cc1101".to_string());
        }
        args
    }
}

/// Reads measurement records line by line with a per-packet timeout
pub struct LineMeasurementReader<R> {
    lines: Lines<R>,
    receive_timeout: Duration,
}

impl<R: AsyncBufRead + Unpin + Send> LineMeasurementReader<R> {
    pub fn new(reader: R, receive_timeout: Duration) -> Self {
        Self {
            lines: reader.lines(),
            receive_timeout,
        }
    }

    /// Next record; `Ok(None)` on end of output or receive timeout
    pub async fn next_record(&mut self) -> Result<Option<Measurement>, SensorError> {
        match self.read_record().await? {
            ReadOutcome::Record(measurement) => Ok(Some(measurement)),
            ReadOutcome::EndOfOutput | ReadOutcome::TimedOut => Ok(None),
        }
    }

    /// Next record, telling end of output apart from the receive timeout
    pub async fn read_record(&mut self) -> Result<ReadOutcome, SensorError> {
        loop {
            let line = match tokio::time::timeout(self.receive_timeout, self.lines.next_line()).await
            {
                Err(_) => {
                    warn!(
                        "no packet received within {} seconds",
                        self.receive_timeout.as_secs()
                    );
                    return Ok(ReadOutcome::TimedOut);
                }
                Ok(line) => line?,
            };
            let Some(line) = line else {
                return Ok(ReadOutcome::EndOfOutput);
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return parse_record(line).map(ReadOutcome::Record);
        }
    }
}

/// How reading the next record ended
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Record(Measurement),
    EndOfOutput,
    TimedOut,
}

/// Parse a single JSON measurement record
pub fn parse_record(line: &str) -> Result<Measurement, SensorError> {
    serde_json::from_str(line).map_err(|source| SensorError::InvalidRecord {
        line: line.to_string(),
        source,
    })
}

/// Measurement source backed by the receiver child process
///
/// The child is killed when this value is dropped.
pub struct ReceiverProcess {
    child: Child,
    reader: LineMeasurementReader<BufReader<ChildStdout>>,
}

impl ReceiverProcess {
    pub fn spawn(options: &ReceiverOptions) -> Result<Self, SensorError> {
        info!(
            command = %options.command,
            gdo0_gpio_line_name = %options.gdo0_gpio_line_name,
            unlock_spi_device = options.unlock_spi_device,
            debug_cc1101 = options.debug_cc1101,
            "starting receiver"
        );
        let mut child = Command::new(&options.command)
            .args(options.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SensorError::Spawn {
                command: options.command.clone(),
                source,
            })?;
        let stdout = child.stdout.take().ok_or_else(|| SensorError::Spawn {
            command: options.command.clone(),
            source: std::io::Error::other("stdout not captured"),
        })?;

        Ok(Self {
            child,
            reader: LineMeasurementReader::new(BufReader::new(stdout), options.receive_timeout),
        })
    }
}

#[async_trait]
impl MeasurementSource for ReceiverProcess {
    async fn next_measurement(&mut self) -> Result<Option<Measurement>, SensorError> {
        match self.reader.read_record().await? {
            ReadOutcome::Record(measurement) => Ok(Some(measurement)),
            ReadOutcome::TimedOut => Ok(None),
            ReadOutcome::EndOfOutput => {
                // stdout closes before the child is reaped
                let status = match tokio::time::timeout(
                    self.reader.receive_timeout,
                    self.child.wait(),
                )
                .await
                {
                    Ok(status) => status?,
                    Err(_) => {
                        warn!("receiver closed its output but kept running");
                        return Ok(None);
                    }
                };
                if !status.success() {
                    return Err(SensorError::ReceiverExited {
                        status: status.code(),
                    });
                }
                debug!("receiver exited cleanly");
                Ok(None)
            }
        }
    }
}
