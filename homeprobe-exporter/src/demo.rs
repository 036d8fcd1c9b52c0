//! Simulated sensors and beacon for running without hardware.
//!
//! Values drift around plausible indoor and outdoor baselines so dashboards
//! show something that looks like a real room.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::beacon::{Advertisement, BeaconData, ThoReading, WxBeaconReading};
use crate::config::BeaconKind;
use crate::sensor::{
    AirQualityReading, AirQualitySensor, ClimateReading, ClimateSensor, Co2Sensor, Result,
};

/// Advertisements sent per beacon sequence number.
const REPEATS_PER_SEQUENCE: u32 = 3;

/// Slowly varying value source shared by the demo devices.
///
/// Each quantity keeps the phase drawn on its first use, so consecutive
/// readings move by at most a tenth of the amplitude plus noise.
struct Oscillator {
    rng: SmallRng,
    tick: u64,
    phases: HashMap<&'static str, f64>,
}

impl Oscillator {
    fn new() -> Self {
        Self::with_rng(SmallRng::from_os_rng())
    }

    fn seeded(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }

    fn with_rng(rng: SmallRng) -> Self {
        Self {
            rng,
            tick: 0,
            phases: HashMap::new(),
        }
    }

    fn advance(&mut self) {
        self.tick += 1;
    }

    /// `base` plus a sine swing of `amplitude` and some noise.
    fn value(&mut self, key: &'static str, base: f64, amplitude: f64) -> f64 {
        let rng = &mut self.rng;
        let phase = *self
            .phases
            .entry(key)
            .or_insert_with(|| rng.random_range(0.0..2.0 * PI));
        let oscillation = amplitude * (self.tick as f64 * 0.1 + phase).sin();
        let noise = self.rng.random_range(-amplitude * 0.3..amplitude * 0.3);
        base + oscillation + noise
    }
}

/// Simulated temperature / humidity / pressure sensor.
pub struct DemoClimateSensor {
    osc: Oscillator,
}

impl DemoClimateSensor {
    pub fn new() -> Self {
        Self {
            osc: Oscillator::new(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            osc: Oscillator::seeded(seed),
        }
    }
}

impl Default for DemoClimateSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl ClimateSensor for DemoClimateSensor {
    fn name(&self) -> &str {
        "demo-climate"
    }

    fn read(&mut self) -> Result<ClimateReading> {
        self.osc.advance();
        Ok(ClimateReading {
            temperature: self.osc.value("temperature", 22.0, 2.0),
            humidity: Some(self.osc.value("humidity", 45.0, 8.0).clamp(0.0, 100.0)),
            pressure: Some(self.osc.value("pressure", 1010.0, 3.0)),
        })
    }
}

/// Simulated eCO2 / VOC sensor.
pub struct DemoAirQualitySensor {
    osc: Oscillator,
}

impl DemoAirQualitySensor {
    pub fn new() -> Self {
        Self {
            osc: Oscillator::new(),
        }
    }
}

impl Default for DemoAirQualitySensor {
    fn default() -> Self {
        Self::new()
    }
}

impl AirQualitySensor for DemoAirQualitySensor {
    fn name(&self) -> &str {
        "demo-air-quality"
    }

    fn read(&mut self, temperature: f64, humidity: f64) -> Result<AirQualityReading> {
        self.osc.advance();
        // Warm, humid air reads a little worse.
        let bias = (temperature - 20.0).max(0.0) * 5.0 + (humidity - 40.0).max(0.0);
        Ok(AirQualityReading {
            eco2: self.osc.value("eco2", 600.0 + bias, 120.0).max(400.0).round(),
            voc: self.osc.value("voc", 30.0 + bias / 5.0, 20.0).max(0.0).round(),
        })
    }
}

/// Simulated NDIR CO2 sensor.
pub struct DemoCo2Sensor {
    osc: Oscillator,
}

impl DemoCo2Sensor {
    pub fn new() -> Self {
        Self {
            osc: Oscillator::new(),
        }
    }
}

impl Default for DemoCo2Sensor {
    fn default() -> Self {
        Self::new()
    }
}

impl Co2Sensor for DemoCo2Sensor {
    fn name(&self) -> &str {
        "demo-co2"
    }

    fn read_ppm(&mut self) -> Result<u16> {
        self.osc.advance();
        Ok(self.osc.value("co2", 650.0, 150.0).clamp(400.0, 5000.0) as u16)
    }
}

/// Simulated beacon producing advertisements.
pub struct DemoBeacon {
    kind: BeaconKind,
    device_id: String,
    osc: Oscillator,
    sequence: u8,
    sent: u32,
    last: Option<BeaconData>,
}

impl DemoBeacon {
    pub fn new(kind: BeaconKind, device_id: impl Into<String>) -> Self {
        Self::with_oscillator(kind, device_id.into(), Oscillator::new())
    }

    pub fn seeded(kind: BeaconKind, device_id: impl Into<String>, seed: u64) -> Self {
        Self::with_oscillator(kind, device_id.into(), Oscillator::seeded(seed))
    }

    fn with_oscillator(kind: BeaconKind, device_id: String, osc: Oscillator) -> Self {
        Self {
            kind,
            device_id,
            osc,
            sequence: 0,
            sent: 0,
            last: None,
        }
    }

    /// Next advertisement. Each measurement is repeated a few times under
    /// the same sequence number, as real beacons do.
    pub fn next_advertisement(&mut self) -> Advertisement {
        let data = match self.last.take() {
            Some(data) if self.sent % REPEATS_PER_SEQUENCE != 0 => data,
            _ => {
                self.sequence = self.sequence.wrapping_add(1);
                self.measure()
            }
        };
        self.sent += 1;
        self.last = Some(data.clone());

        Advertisement {
            device_id: self.device_id.clone(),
            data,
        }
    }

    fn measure(&mut self) -> BeaconData {
        self.osc.advance();
        let temperature = self.osc.value("temperature", 15.0, 4.0);
        let humidity = self.osc.value("humidity", 60.0, 10.0).clamp(0.0, 100.0);

        match self.kind {
            BeaconKind::WxBeacon2 => BeaconData::WxBeacon2(WxBeaconReading {
                sequence: self.sequence,
                temperature,
                humidity,
                ambient_light: self.osc.value("ambient_light", 8000.0, 6000.0).max(0.0),
                uv_index: self.osc.value("uv_index", 3.0, 2.0).max(0.0),
                pressure: self.osc.value("pressure", 1008.0, 4.0),
                sound_noise: self.osc.value("sound_noise", 45.0, 8.0).max(0.0),
                discomfort_index: homeprobe_common::weather::discomfort_index(
                    temperature,
                    humidity,
                ),
                heat_stroke: temperature * 0.7 + humidity * 0.05,
                battery_voltage: self.osc.value("battery", 2.9, 0.05),
            }),
            BeaconKind::Tho => BeaconData::Tho(ThoReading {
                sequence: self.sequence,
                temperature: (temperature * 10.0).round() / 10.0,
                humidity: humidity.round(),
                battery_percent: self.osc.value("battery", 85.0, 5.0).clamp(0.0, 100.0) as u8,
            }),
        }
    }
}

/// Send demo advertisements on `interval` until shutdown or the receiver goes away.
pub async fn feed_beacon(
    mut beacon: DemoBeacon,
    tx: mpsc::Sender<Advertisement>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(kind = beacon.kind.as_str(), device = %beacon.device_id, "Starting demo beacon");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let adv = beacon.next_advertisement();
                if tx.send(adv).await.is_err() {
                    debug!("Beacon handler gone, stopping demo beacon");
                    break;
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
