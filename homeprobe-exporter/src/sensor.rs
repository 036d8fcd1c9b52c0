//! Sensor driver interfaces.
//!
//! The poller only needs a reading from each device; bus access and
//! calibration stay inside the driver behind these traits.

use std::time::Duration;

use thiserror::Error;

/// Errors reported by sensor drivers.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Sensor I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Sensor did not respond within {0:?}")]
    Timeout(Duration),
    #[error("Invalid sensor data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, SensorError>;

/// A temperature / humidity / pressure reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClimateReading {
    /// Degrees Celsius.
    pub temperature: f64,
    /// Relative humidity, percent.
    pub humidity: Option<f64>,
    /// Station pressure, hPa.
    pub pressure: Option<f64>,
}

impl ClimateReading {
    /// Overlay `other` onto `self`; fields present in `other` win.
    pub fn merge(self, other: ClimateReading) -> ClimateReading {
        ClimateReading {
            temperature: other.temperature,
            humidity: other.humidity.or(self.humidity),
            pressure: other.pressure.or(self.pressure),
        }
    }
}

/// An air quality reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AirQualityReading {
    /// Equivalent CO2, ppm.
    pub eco2: f64,
    /// Total volatile organic compounds, ppb.
    pub voc: f64,
}

/// Temperature, humidity and pressure sensors.
pub trait ClimateSensor: Send {
    fn name(&self) -> &str;

    fn read(&mut self) -> Result<ClimateReading>;
}

/// Air quality sensors needing environment compensation.
pub trait AirQualitySensor: Send {
    fn name(&self) -> &str;

    /// Read, compensating for the given temperature (°C) and relative humidity (%).
    fn read(&mut self, temperature: f64, humidity: f64) -> Result<AirQualityReading>;
}

/// NDIR CO2 sensors.
pub trait Co2Sensor: Send {
    fn name(&self) -> &str;

    fn read_ppm(&mut self) -> Result<u16>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_later_fields_win() {
        let bme = ClimateReading {
            temperature: 21.0,
            humidity: Some(40.0),
            pressure: Some(1010.0),
        };
        let sht = ClimateReading {
            temperature: 22.5,
            humidity: Some(45.0),
            pressure: None,
        };

        let merged = bme.merge(sht);
        assert_eq!(merged.temperature, 22.5);
        assert_eq!(merged.humidity, Some(45.0));
        assert_eq!(merged.pressure, Some(1010.0));
    }

    #[test]
    fn test_error_display() {
        let err = SensorError::Timeout(Duration::from_millis(500));
        assert_eq!(err.to_string(), "Sensor did not respond within 500ms");

        let err = SensorError::InvalidData("crc mismatch".to_string());
        assert!(err.to_string().contains("crc mismatch"));
    }
}
