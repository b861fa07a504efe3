//! Measurement sources
//!
//! The radio receiver is an external collaborator. The relay loop only sees
//! the [`MeasurementSource`] capability, implemented by the receiver process
//! adapter and by the mock generator used for connectivity tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod mock;
pub mod receiver;

pub use mock::MockMeasurementSource;
pub use receiver::ReceiverProcess;

/// One decoded FT017TH packet
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub decoding_timestamp: Option<DateTime<Utc>>,
    pub temperature_degrees_celsius: f64,
    /// Relative humidity in [0, 1]
    pub relative_humidity: f64,
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Measurement(decoding_timestamp=")?;
        match self.decoding_timestamp {
            Some(timestamp) => write!(f, "{}", timestamp.to_rfc3339())?,
            None => write!(f, "None")?,
        }
        write!(
            f,
            ", temperature_degrees_celsius={}, relative_humidity={})",
            self.temperature_degrees_celsius, self.relative_humidity
        )
    }
}

/// Errors raised by a measurement source
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Failed to start receiver command {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read from receiver: {0}")]
    Read(#[from] std::io::Error),
    #[error("Receiver emitted an invalid measurement record {line:?}: {source}")]
    InvalidRecord {
        line: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Receiver exited with status {status:?}")]
    ReceiverExited { status: Option<i32> },
}

/// Lazy sequence of measurements, not restartable
///
/// `Ok(None)` ends the sequence, either because it is exhausted or because no
/// packet arrived within the receive timeout.
#[async_trait]
pub trait MeasurementSource: Send {
    async fn next_measurement(&mut self) -> Result<Option<Measurement>, SensorError>;
}

#[async_trait]
impl<S: MeasurementSource + ?Sized> MeasurementSource for Box<S> {
    async fn next_measurement(&mut self) -> Result<Option<Measurement>, SensorError> {
        (**self).next_measurement().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_measurement_display() {
        let measurement = Measurement {
            decoding_timestamp: Some(Utc.with_ymd_and_hms(2020, 12, 7, 18, 5, 1).unwrap()),
            temperature_degrees_celsius: 23.1234567,
            relative_humidity: 0.501234567,
        };

        assert_eq!(
            measurement.to_string(),
            "Measurement(decoding_timestamp=2020-12-07T18:05:01+00:00, \
             temperature_degrees_celsius=23.1234567, relative_humidity=0.501234567)"
        );
    }

    #[test]
    fn test_measurement_display_without_timestamp() {
        let measurement = Measurement {
            decoding_timestamp: None,
            temperature_degrees_celsius: 21.5,
            relative_humidity: 0.45,
        };

        assert!(measurement
            .to_string()
            .starts_with("Measurement(decoding_timestamp=None,"));
    }

    #[test]
    fn test_measurement_deserialize() {
        let measurement: Measurement = serde_json::from_str(
            r#"{"decoding_timestamp":"2020-12-07T18:06:19Z","temperature_degrees_celsius":24.1234567,"relative_humidity":0.401234567}"#,
        )
        .unwrap();

        assert_eq!(measurement.temperature_degrees_celsius, 24.1234567);
        assert_eq!(measurement.relative_humidity, 0.401234567);
        assert_eq!(
            measurement.decoding_timestamp,
            Some(Utc.with_ymd_and_hms(2020, 12, 7, 18, 6, 19).unwrap())
        );
    }

    #[test]
    fn test_measurement_deserialize_missing_timestamp() {
        let measurement: Measurement = serde_json::from_str(
            r#"{"temperature_degrees_celsius":20.0,"relative_humidity":0.5}"#,
        )
        .unwrap();
        assert_eq!(measurement.decoding_timestamp, None);
    }
}
