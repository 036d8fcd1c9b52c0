//! Bluetooth beacon advertisement handling.
//!
//! Advertisements arrive already decoded over a channel. Beacons repeat the
//! same measurement several times per sequence number, so only the first
//! advertisement of a sequence is published.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use homeprobe_common::weather;
use homeprobe_metrics::{Labels, Metric, RoundedValue};

use crate::config::{BeaconConfig, SiteConfig};
use crate::gauges::EnvironmentGauges;

/// Longest pause between watchdog checks.
const MAX_WATCHDOG_CHECK: Duration = Duration::from_secs(60);

/// Measurement set broadcast by an environment beacon.
#[derive(Debug, Clone, PartialEq)]
pub struct WxBeaconReading {
    pub sequence: u8,
    pub temperature: f64,
    pub humidity: f64,
    pub ambient_light: f64,
    pub uv_index: f64,
    /// Station pressure, hPa.
    pub pressure: f64,
    pub sound_noise: f64,
    pub discomfort_index: f64,
    pub heat_stroke: f64,
    pub battery_voltage: f64,
}

/// Measurement set broadcast by a thermo-hygrometer.
#[derive(Debug, Clone, PartialEq)]
pub struct ThoReading {
    pub sequence: u8,
    pub temperature: f64,
    pub humidity: f64,
    pub battery_percent: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BeaconData {
    WxBeacon2(WxBeaconReading),
    Tho(ThoReading),
}

impl BeaconData {
    pub fn sequence(&self) -> u8 {
        match self {
            BeaconData::WxBeacon2(r) => r.sequence,
            BeaconData::Tho(r) => r.sequence,
        }
    }
}

/// A decoded advertisement.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    /// Address of the sending device.
    pub device_id: String,
    pub data: BeaconData,
}

/// What [`BeaconHandler::handle`] did with an advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// New sequence; this many samples were written.
    Published(usize),
    /// Implausible jump; only this many samples (battery included) were written.
    Rejected(usize),
    /// Sequence already seen.
    Duplicate,
    /// Sent by another device.
    Ignored,
}

/// Publishes beacon advertisements to the gauges.
pub struct BeaconHandler {
    gauges: EnvironmentGauges,
    labels: Labels,
    device_id: String,
    above_sea_level: f64,
    ttl: Duration,
    watchdog: Duration,
    max_temp_jump: f64,
    max_humid_jump: f64,
    last_sequence: Option<u8>,
    last_battery_sequence: Option<u8>,
    last_temperature: Option<f64>,
    last_humidity: Option<f64>,
    last_update: Instant,
}

impl BeaconHandler {
    pub fn new(
        gauges: EnvironmentGauges,
        base_labels: &Labels,
        site: &SiteConfig,
        config: &BeaconConfig,
    ) -> Self {
        Self {
            gauges,
            labels: base_labels.merge(&Labels::new().with("place", config.place.clone())),
            device_id: config.device_id.clone(),
            above_sea_level: site.above_sea_level,
            ttl: Duration::from_secs(config.ttl_secs),
            watchdog: Duration::from_secs(config.watchdog_secs),
            max_temp_jump: config.max_temp_jump,
            max_humid_jump: config.max_humid_jump,
            last_sequence: None,
            last_battery_sequence: None,
            last_temperature: None,
            last_humidity: None,
            last_update: Instant::now(),
        }
    }

    /// Publish one advertisement.
    pub fn handle(&mut self, adv: &Advertisement, now: Instant) -> Outcome {
        if !self.device_id.is_empty() && !adv.device_id.eq_ignore_ascii_case(&self.device_id) {
            return Outcome::Ignored;
        }

        match &adv.data {
            BeaconData::WxBeacon2(reading) => self.handle_wxbeacon(reading, now),
            BeaconData::Tho(reading) => self.handle_tho(reading, now),
        }
    }

    /// No new sequence arrived within the watchdog period.
    pub fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_update) >= self.watchdog
    }

    fn accept_sequence(&mut self, sequence: u8, now: Instant) -> bool {
        if self.last_sequence == Some(sequence) {
            debug!(seq = sequence, "Sequence not changed");
            return false;
        }
        self.last_sequence = Some(sequence);
        self.last_update = now;
        true
    }

    fn set(&self, metric: &Metric, labels: &Labels, value: f64, precision: u32, now: Instant) {
        metric.set_with_timeout(labels, RoundedValue::new(value, precision), now + self.ttl);
    }

    fn handle_wxbeacon(&mut self, r: &WxBeaconReading, now: Instant) -> Outcome {
        if !self.accept_sequence(r.sequence, now) {
            return Outcome::Duplicate;
        }
        info!(
            seq = r.sequence,
            temperature = r.temperature,
            humidity = r.humidity,
            "Beacon data received"
        );

        let g = self.gauges.clone();
        let labels = self.labels.clone();
        let mut published = 0;
        let mut rejected = false;

        if exceeds(r.temperature, self.last_temperature, self.max_temp_jump) {
            warn!(
                temperature = r.temperature,
                last_temperature = ?self.last_temperature,
                "Temperature jump rejected"
            );
            rejected = true;
        } else {
            self.set(&g.temperature, &labels, r.temperature, 2, now);
            self.last_temperature = Some(r.temperature);
            published += 1;
        }

        if exceeds(r.humidity, self.last_humidity, self.max_humid_jump) {
            warn!(
                humidity = r.humidity,
                last_humidity = ?self.last_humidity,
                "Humidity jump rejected"
            );
            rejected = true;
        } else {
            self.set(&g.relative_humidity, &labels, r.humidity, 2, now);
            self.last_humidity = Some(r.humidity);
            published += 1;
        }

        self.set(&g.sensor_vbat, &labels, r.battery_voltage, 2, now);
        published += 1;

        if rejected {
            return Outcome::Rejected(published);
        }

        let pressure = weather::sea_level_pressure(r.pressure, r.temperature, self.above_sea_level);
        let derived = [
            (&g.absolute_humidity, weather::absolute_humidity(r.temperature, r.humidity)),
            (&g.ambient_light, r.ambient_light),
            (&g.uv_index, r.uv_index),
            (&g.pressure, pressure),
            (&g.sound_noise, r.sound_noise),
            (&g.discomfort_index, r.discomfort_index),
            (&g.heat_stroke, r.heat_stroke),
        ];
        for (metric, value) in derived {
            self.set(metric, &labels, value, 2, now);
            published += 1;
        }

        Outcome::Published(published)
    }

    fn handle_tho(&mut self, r: &ThoReading, now: Instant) -> Outcome {
        let labels = self.labels.merge(
            &Labels::new()
                .with("wosensor_id", self.device_id.clone())
                .with("wosensor_type", "tho"),
        );
        let mut published = 0;

        if r.battery_percent <= 100 && self.last_battery_sequence != Some(r.sequence) {
            self.last_battery_sequence = Some(r.sequence);
            let volts = f64::from(r.battery_percent) / 100.0 * 3.0;
            self.set(&self.gauges.sensor_vbat, &labels, volts, 3, now);
            info!(battery = r.battery_percent, seq = r.sequence, "Battery changed");
            published += 1;
        }

        if !self.accept_sequence(r.sequence, now) {
            return if published > 0 {
                Outcome::Published(published)
            } else {
                Outcome::Duplicate
            };
        }
        info!(
            seq = r.sequence,
            temperature = r.temperature,
            humidity = r.humidity,
            "Thermo-hygrometer data updated"
        );

        let g = &self.gauges;
        self.set(&g.temperature, &labels, r.temperature, 2, now);
        self.set(&g.relative_humidity, &labels, r.humidity, 0, now);
        self.set(
            &g.absolute_humidity,
            &labels,
            weather::absolute_humidity(r.temperature, r.humidity),
            2,
            now,
        );
        self.set(
            &g.discomfort_index,
            &labels,
            weather::discomfort_index(r.temperature, r.humidity),
            2,
            now,
        );

        Outcome::Published(published + 4)
    }

    /// Consume advertisements until the channel closes or shutdown is signalled.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<Advertisement>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(device = %self.device_id, "Starting beacon handler");

        let mut watchdog = tokio::time::interval(self.watchdog.min(MAX_WATCHDOG_CHECK));

        loop {
            tokio::select! {
                adv = rx.recv() => {
                    let Some(adv) = adv else {
                        debug!("Advertisement channel closed");
                        break;
                    };
                    let outcome = self.handle(&adv, Instant::now());
                    debug!(?outcome, seq = adv.data.sequence(), "Advertisement handled");
                }
                _ = watchdog.tick() => {
                    let now = Instant::now();
                    if self.is_stale(now) {
                        warn!(
                            silent_for = ?now.saturating_duration_since(self.last_update),
                            "No new beacon sequence received"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Beacon handler stopped");
    }
}

/// The change from the last accepted value is larger than `limit`.
fn exceeds(value: f64, last: Option<f64>, limit: f64) -> bool {
    last.is_some_and(|last| (value - last).abs() > limit)
}
