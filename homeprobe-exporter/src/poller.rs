//! Periodic polling of the wired sensors.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use homeprobe_common::weather;
use homeprobe_metrics::{Labels, Metric, RoundedValue};

use crate::config::{PollerConfig, SiteConfig};
use crate::gauges::EnvironmentGauges;
use crate::sensor::{AirQualitySensor, ClimateReading, ClimateSensor, Co2Sensor};

/// Compensation input for air quality sensors when no humidity is known.
const DEFAULT_COMPENSATION_HUMIDITY: f64 = 50.0;

/// Outcome of a single poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Samples written to the gauges.
    pub published: usize,
    /// Sensors that failed to read.
    pub failures: usize,
    /// Readings were taken but held back by the warm-up window.
    pub warming_up: bool,
}

/// Reads the wired sensors and publishes their values.
pub struct EnvironmentPoller {
    gauges: EnvironmentGauges,
    labels: Labels,
    site: SiteConfig,
    interval: Duration,
    ttl: Option<Duration>,
    ready_at: Instant,
    climate: Vec<Box<dyn ClimateSensor>>,
    air_quality: Option<Box<dyn AirQualitySensor>>,
    co2: Option<Box<dyn Co2Sensor>>,
}

impl EnvironmentPoller {
    /// Create a poller with no sensors attached.
    ///
    /// `base_labels` are merged under `place=<config.place>`. The warm-up
    /// window starts now.
    pub fn new(
        gauges: EnvironmentGauges,
        base_labels: &Labels,
        site: SiteConfig,
        config: &PollerConfig,
    ) -> Self {
        let labels = base_labels.merge(&Labels::new().with("place", config.place.clone()));

        Self {
            gauges,
            labels,
            site,
            interval: Duration::from_secs(config.interval_secs),
            ttl: config.ttl_secs.map(Duration::from_secs),
            ready_at: Instant::now() + Duration::from_secs(config.warmup_secs),
            climate: Vec::new(),
            air_quality: None,
            co2: None,
        }
    }

    /// Attach a climate sensor. Sensors added later override fields of earlier ones.
    pub fn with_climate_sensor(mut self, sensor: Box<dyn ClimateSensor>) -> Self {
        self.climate.push(sensor);
        self
    }

    pub fn with_air_quality_sensor(mut self, sensor: Box<dyn AirQualitySensor>) -> Self {
        self.air_quality = Some(sensor);
        self
    }

    pub fn with_co2_sensor(mut self, sensor: Box<dyn Co2Sensor>) -> Self {
        self.co2 = Some(sensor);
        self
    }

    /// Override the end of the warm-up window.
    pub fn with_ready_at(mut self, ready_at: Instant) -> Self {
        self.ready_at = ready_at;
        self
    }

    /// When the warm-up window ends.
    pub fn ready_at(&self) -> Instant {
        self.ready_at
    }

    /// Number of attached sensors.
    pub fn sensor_count(&self) -> usize {
        self.climate.len() + self.air_quality.is_some() as usize + self.co2.is_some() as usize
    }

    /// Read every sensor once and publish the results.
    pub fn poll_once(&mut self, now: Instant) -> PollReport {
        let mut report = PollReport {
            warming_up: now < self.ready_at,
            ..PollReport::default()
        };

        if let Some(sensor) = self.co2.as_mut() {
            match sensor.read_ppm() {
                Ok(ppm) => {
                    debug!(sensor = sensor.name(), ppm, "CO2 reading");
                    if !report.warming_up {
                        let value = RoundedValue::new(f64::from(ppm), 0);
                        publish(&self.gauges.co2, &self.labels, value, self.ttl, now);
                        report.published += 1;
                    }
                }
                Err(e) => {
                    warn!(sensor = sensor.name(), error = %e, "Failed to read CO2 sensor");
                    report.failures += 1;
                }
            }
        }

        let mut climate: Option<ClimateReading> = None;
        for sensor in self.climate.iter_mut() {
            match sensor.read() {
                Ok(reading) => {
                    debug!(
                        sensor = sensor.name(),
                        temperature = reading.temperature,
                        humidity = ?reading.humidity,
                        pressure = ?reading.pressure,
                        "Climate reading"
                    );
                    climate = Some(match climate {
                        Some(prev) => prev.merge(reading),
                        None => reading,
                    });
                }
                Err(e) => {
                    warn!(sensor = sensor.name(), error = %e, "Failed to read climate sensor");
                    report.failures += 1;
                }
            }
        }

        let Some(mut climate) = climate else {
            return report;
        };
        climate.temperature += self.site.temp_offset;

        if !report.warming_up {
            report.published += self.publish_climate(&climate, now);
        }

        if let Some(sensor) = self.air_quality.as_mut() {
            let humidity = climate.humidity.unwrap_or(DEFAULT_COMPENSATION_HUMIDITY);
            match sensor.read(climate.temperature, humidity) {
                Ok(air) => {
                    debug!(sensor = sensor.name(), eco2 = air.eco2, voc = air.voc, "Air quality reading");
                    if !report.warming_up {
                        let g = &self.gauges;
                        publish(&g.eco2, &self.labels, RoundedValue::new(air.eco2, 2), self.ttl, now);
                        publish(&g.voc, &self.labels, RoundedValue::new(air.voc, 2), self.ttl, now);
                        report.published += 2;
                    }
                }
                Err(e) => {
                    warn!(sensor = sensor.name(), error = %e, "Failed to read air quality sensor");
                    report.failures += 1;
                }
            }
        }

        report
    }

    fn publish_climate(&self, climate: &ClimateReading, now: Instant) -> usize {
        let g = &self.gauges;
        let t = climate.temperature;
        let mut published = 1;

        publish(&g.temperature, &self.labels, RoundedValue::new(t, 2), self.ttl, now);

        if let Some(rh) = climate.humidity {
            let derived = [
                (&g.relative_humidity, rh),
                (&g.absolute_humidity, weather::absolute_humidity(t, rh)),
                (&g.discomfort_index, weather::discomfort_index(t, rh)),
            ];
            for (metric, value) in derived {
                publish(metric, &self.labels, RoundedValue::new(value, 2), self.ttl, now);
            }
            published += 3;
        }

        if let Some(p) = climate.pressure {
            let msl = weather::sea_level_pressure(p, t, self.site.above_sea_level);
            publish(&g.pressure, &self.labels, RoundedValue::new(msl, 2), self.ttl, now);
            published += 1;
        }

        published
    }

    /// Poll on the configured interval until shutdown is signalled.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            sensors = self.sensor_count(),
            interval_secs = self.interval.as_secs(),
            "Starting sensor poller"
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.poll_once(Instant::now());
                    if report.warming_up {
                        info!(ready_in = ?self.ready_at.saturating_duration_since(Instant::now()), "Warming up");
                    }
                    debug!(
                        published = report.published,
                        failures = report.failures,
                        "Poll complete"
                    );
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Sensor poller stopped");
    }
}

/// Set a gauge, with a deadline when a TTL is configured.
fn publish(
    metric: &Metric,
    labels: &Labels,
    value: RoundedValue,
    ttl: Option<Duration>,
    now: Instant,
) {
    match ttl {
        Some(ttl) => metric.set_with_timeout(labels, value, now + ttl),
        None => metric.set(labels, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{AirQualityReading, Result, SensorError};
    use homeprobe_metrics::MetricSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedClimate(ClimateReading);

    impl ClimateSensor for FixedClimate {
        fn name(&self) -> &str {
            "fixed"
        }

        fn read(&mut self) -> Result<ClimateReading> {
            Ok(self.0)
        }
    }

    struct FailingClimate;

    impl ClimateSensor for FailingClimate {
        fn name(&self) -> &str {
            "failing"
        }

        fn read(&mut self) -> Result<ClimateReading> {
            Err(SensorError::Timeout(Duration::from_millis(100)))
        }
    }

    /// Records the compensation input it was given.
    struct RecordingAirQuality {
        last_temperature: Arc<AtomicU32>,
    }

    impl AirQualitySensor for RecordingAirQuality {
        fn name(&self) -> &str {
            "recording"
        }

        fn read(&mut self, temperature: f64, _humidity: f64) -> Result<AirQualityReading> {
            self.last_temperature
                .store((temperature * 100.0) as u32, Ordering::SeqCst);
            Ok(AirQualityReading {
                eco2: 450.0,
                voc: 12.0,
            })
        }
    }

    struct FixedCo2(u16);

    impl Co2Sensor for FixedCo2 {
        fn name(&self) -> &str {
            "fixed-co2"
        }

        fn read_ppm(&mut self) -> Result<u16> {
            Ok(self.0)
        }
    }

    fn make_poller(set: &mut MetricSet, site: SiteConfig, config: PollerConfig) -> EnvironmentPoller {
        let gauges = EnvironmentGauges::register(set);
        EnvironmentPoller::new(gauges, &Labels::from([("host", "pi")]), site, &config)
    }

    fn no_warmup() -> PollerConfig {
        PollerConfig {
            warmup_secs: 0,
            ..PollerConfig::default()
        }
    }

    fn climate(temperature: f64, humidity: Option<f64>, pressure: Option<f64>) -> Box<FixedClimate> {
        Box::new(FixedClimate(ClimateReading {
            temperature,
            humidity,
            pressure,
        }))
    }

    #[test]
    fn test_publishes_all_readings() {
        let mut set = MetricSet::new();
        let mut poller = make_poller(&mut set, SiteConfig::default(), no_warmup())
            .with_climate_sensor(climate(25.0, Some(60.0), Some(1013.25)))
            .with_air_quality_sensor(Box::new(RecordingAirQuality {
                last_temperature: Arc::new(AtomicU32::new(0)),
            }))
            .with_co2_sensor(Box::new(FixedCo2(612)));

        let now = Instant::now();
        let report = poller.poll_once(now);
        assert_eq!(
            report,
            PollReport {
                published: 8,
                failures: 0,
                warming_up: false,
            }
        );

        let output = set.render(now);
        assert!(output.contains("temperature{host=\"pi\",place=\"inside\"} 25.00\n"), "{}", output);
        assert!(output.contains("relative_humidity{host=\"pi\",place=\"inside\"} 60.00\n"));
        assert!(output.contains("absolute_humidity{host=\"pi\",place=\"inside\"} 13.80\n"), "{}", output);
        assert!(output.contains("discomfort_index{host=\"pi\",place=\"inside\"} 72.82\n"), "{}", output);
        assert!(output.contains("pressure{host=\"pi\",place=\"inside\"} 1013.25\n"));
        assert!(output.contains("eco2{host=\"pi\",place=\"inside\"} 450.00\n"));
        assert!(output.contains("voc{host=\"pi\",place=\"inside\"} 12.00\n"));
        assert!(output.contains("co2{host=\"pi\",place=\"inside\"} 612\n"));
    }

    #[test]
    fn test_warmup_holds_back_readings() {
        let mut set = MetricSet::new();
        let config = PollerConfig {
            warmup_secs: 30,
            ..PollerConfig::default()
        };
        let mut poller = make_poller(&mut set, SiteConfig::default(), config)
            .with_co2_sensor(Box::new(FixedCo2(700)));
        let ready_at = poller.ready_at();

        let report = poller.poll_once(ready_at - Duration::from_secs(1));
        assert!(report.warming_up);
        assert_eq!(report.published, 0);
        assert_eq!(set.series_count(), 0);

        let report = poller.poll_once(ready_at);
        assert!(!report.warming_up);
        assert_eq!(report.published, 1);
        assert!(set.render(ready_at).contains("co2{host=\"pi\",place=\"inside\"} 700\n"));
    }

    #[test]
    fn test_later_sensor_overrides_and_offset_applies() {
        let recorded = Arc::new(AtomicU32::new(0));
        let site = SiteConfig {
            above_sea_level: 0.0,
            temp_offset: -1.5,
        };

        let mut set = MetricSet::new();
        let mut poller = make_poller(&mut set, site, no_warmup())
            .with_climate_sensor(climate(20.0, Some(40.0), Some(1000.0)))
            .with_climate_sensor(climate(23.5, Some(45.0), None))
            .with_air_quality_sensor(Box::new(RecordingAirQuality {
                last_temperature: recorded.clone(),
            }));

        let now = Instant::now();
        poller.poll_once(now);

        let output = set.render(now);
        assert!(output.contains("temperature{host=\"pi\",place=\"inside\"} 22.00\n"), "{}", output);
        assert!(output.contains("relative_humidity{host=\"pi\",place=\"inside\"} 45.00\n"));
        // Pressure survives from the first sensor.
        assert!(output.contains("pressure{host=\"pi\",place=\"inside\"} 1000.00\n"));
        // The air quality sensor sees the offset temperature.
        assert_eq!(recorded.load(Ordering::SeqCst), 2200);
    }

    #[test]
    fn test_failing_sensor_does_not_block_others() {
        let mut set = MetricSet::new();
        let mut poller = make_poller(&mut set, SiteConfig::default(), no_warmup())
            .with_climate_sensor(Box::new(FailingClimate))
            .with_co2_sensor(Box::new(FixedCo2(550)));

        let now = Instant::now();
        let report = poller.poll_once(now);
        assert_eq!(report.failures, 1);
        assert_eq!(report.published, 1);

        let output = set.render(now);
        assert!(output.contains("co2{host=\"pi\",place=\"inside\"} 550\n"));
        assert!(!output.contains("temperature"));
    }

    #[test]
    fn test_temperature_only_sensor() {
        let mut set = MetricSet::new();
        let mut poller = make_poller(&mut set, SiteConfig::default(), no_warmup())
            .with_climate_sensor(climate(18.0, None, None));

        let report = poller.poll_once(Instant::now());
        assert_eq!(report.published, 1);
        assert_eq!(set.series_count(), 1);
    }

    #[test]
    fn test_ttl_applies_to_polled_samples() {
        let mut set = MetricSet::new();
        let config = PollerConfig {
            ttl_secs: Some(60),
            ..no_warmup()
        };
        let mut poller =
            make_poller(&mut set, SiteConfig::default(), config).with_co2_sensor(Box::new(FixedCo2(800)));

        let now = Instant::now();
        poller.poll_once(now);
        assert!(set.render(now + Duration::from_secs(59)).contains("co2"));
        assert_eq!(set.render(now + Duration::from_secs(61)), "");
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut set = MetricSet::new();
        let poller = make_poller(&mut set, SiteConfig::default(), no_warmup())
            .with_co2_sensor(Box::new(FixedCo2(420)));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(poller.run(rx));
        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(set.render(Instant::now()).contains("co2{host=\"pi\",place=\"inside\"} 420\n"));
    }
}
