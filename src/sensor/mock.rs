//! Synthetic measurements for testing the broker connection

use super::{Measurement, MeasurementSource, SensorError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

pub const MEASUREMENT_MOCKS_COUNT: usize = 3;
pub const MEASUREMENT_MOCKS_INTERVAL: Duration = Duration::from_secs(8);

/// Yields a fixed number of random in-range measurements, each after a delay
#[derive(Debug)]
pub struct MockMeasurementSource {
    remaining: usize,
    interval: Duration,
}

impl MockMeasurementSource {
    pub fn new() -> Self {
        Self::with_count(MEASUREMENT_MOCKS_COUNT, MEASUREMENT_MOCKS_INTERVAL)
    }

    pub fn with_count(count: usize, interval: Duration) -> Self {
        warn!("publishing {} mocked measurements", count);
        Self {
            remaining: count,
            interval,
        }
    }

    fn random_measurement() -> Measurement {
        Measurement {
            decoding_timestamp: None,
            temperature_degrees_celsius: rand::random_range(20.0..30.0),
            relative_humidity: rand::random_range(0.4..0.6),
        }
    }
}

impl Default for MockMeasurementSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MeasurementSource for MockMeasurementSource {
    async fn next_measurement(&mut self) -> Result<Option<Measurement>, SensorError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        tokio::time::sleep(self.interval).await;
        Ok(Some(Self::random_measurement()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_yields_three_measurements_eight_seconds_apart() {
        let mut source = MockMeasurementSource::new();
        let mut previous = Instant::now();

        for _ in 0..3 {
            let measurement = source.next_measurement().await.unwrap().unwrap();
            let now = Instant::now();
            assert_eq!(now - previous, Duration::from_secs(8));
            previous = now;

            assert!(measurement.temperature_degrees_celsius > 20.0);
            assert!(measurement.temperature_degrees_celsius < 30.0);
            assert!(measurement.relative_humidity > 0.4);
            assert!(measurement.relative_humidity < 0.6);
            assert!(measurement.decoding_timestamp.is_none());
        }

        assert!(source.next_measurement().await.unwrap().is_none());
        assert_eq!(Instant::now(), previous, "no delay once exhausted");
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_count() {
        let mut source = MockMeasurementSource::with_count(1, Duration::from_millis(10));
        assert!(source.next_measurement().await.unwrap().is_some());
        assert!(source.next_measurement().await.unwrap().is_none());
        assert!(source.next_measurement().await.unwrap().is_none());
    }
}
