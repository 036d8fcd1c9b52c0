//! Configuration for the sensor exporter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use homeprobe_common::LoggingConfig;
use homeprobe_metrics::Labels;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Endpoints served next to the metrics path.
pub const RESERVED_PATHS: [&str; 2] = ["/health", "/ready"];

/// Complete exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// HTTP endpoint settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Labels added to every sample.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Site parameters used by derived quantities.
    #[serde(default)]
    pub site: SiteConfig,

    /// Wired sensor polling.
    #[serde(default)]
    pub poller: PollerConfig,

    /// Bluetooth beacon reception.
    #[serde(default)]
    pub beacon: BeaconConfig,

    /// Background pruning of expired samples.
    #[serde(default)]
    pub expiry: ExpiryConfig,

    /// Use simulated sensors instead of hardware drivers.
    #[serde(default = "default_true")]
    pub demo: bool,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_true() -> bool {
    true
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address to listen on (default: "0.0.0.0:9821").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen() -> String {
    "0.0.0.0:9821".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

/// Where the sensors are installed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Height above sea level in metres, for sea-level pressure.
    #[serde(default)]
    pub above_sea_level: f64,

    /// Offset added to wired temperature readings (°C).
    #[serde(default)]
    pub temp_offset: f64,
}

/// Wired sensor polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Poll the wired sensors (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between polls (default: 15).
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    /// Seconds after startup during which readings are not published (default: 30).
    #[serde(default = "default_warmup")]
    pub warmup_secs: u64,

    /// Value of the `place` label (default: "inside").
    #[serde(default = "default_inside")]
    pub place: String,

    /// Expire polled samples after this many seconds (default: never).
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

fn default_poll_interval() -> u64 {
    15
}

fn default_warmup() -> u64 {
    30
}

fn default_inside() -> String {
    "inside".to_string()
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_poll_interval(),
            warmup_secs: default_warmup(),
            place: default_inside(),
            ttl_secs: None,
        }
    }
}

/// Beacon model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeaconKind {
    /// Environment beacon broadcasting the full weather set.
    #[default]
    WxBeacon2,
    /// Thermo-hygrometer broadcasting temperature, humidity and battery.
    Tho,
}

impl BeaconKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BeaconKind::WxBeacon2 => "wxbeacon2",
            BeaconKind::Tho => "tho",
        }
    }
}

/// Bluetooth beacon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// Receive beacon advertisements (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Beacon model.
    #[serde(default)]
    pub kind: BeaconKind,

    /// Device identifier (address) of the beacon.
    #[serde(default)]
    pub device_id: String,

    /// Value of the `place` label (default: "outside").
    #[serde(default = "default_outside")]
    pub place: String,

    /// Seconds a beacon sample stays valid (default: 900).
    #[serde(default = "default_beacon_ttl")]
    pub ttl_secs: u64,

    /// Warn when no new sequence arrived for this many seconds (default: 420).
    #[serde(default = "default_watchdog")]
    pub watchdog_secs: u64,

    /// Largest accepted temperature change between sequences (default: 8.0).
    #[serde(default = "default_max_temp_jump")]
    pub max_temp_jump: f64,

    /// Largest accepted humidity change between sequences (default: 10.0).
    #[serde(default = "default_max_humid_jump")]
    pub max_humid_jump: f64,
}

fn default_outside() -> String {
    "outside".to_string()
}

fn default_beacon_ttl() -> u64 {
    900 // 15 minutes
}

fn default_watchdog() -> u64 {
    420 // 7 minutes
}

fn default_max_temp_jump() -> f64 {
    8.0
}

fn default_max_humid_jump() -> f64 {
    10.0
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kind: BeaconKind::default(),
            device_id: String::new(),
            place: default_outside(),
            ttl_secs: default_beacon_ttl(),
            watchdog_secs: default_watchdog(),
            max_temp_jump: default_max_temp_jump(),
            max_humid_jump: default_max_humid_jump(),
        }
    }
}

/// Background expiry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryConfig {
    /// Seconds between sweeps of expired samples; `null` relies on
    /// scrape-time expiry only (default: 60).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: Option<u64>,
}

fn default_sweep_interval() -> Option<u64> {
    Some(60)
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Labels shared by every sample.
    pub fn base_labels(&self) -> Labels {
        self.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate listen address format
        if self.http.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.http.listen
            )));
        }

        // Validate path starts with /
        if !self.http.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if RESERVED_PATHS.contains(&self.http.path.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Metrics path {} collides with a built-in endpoint",
                self.http.path
            )));
        }

        if self.poller.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "poller.interval_secs must be > 0".to_string(),
            ));
        }

        if self.poller.ttl_secs == Some(0) {
            return Err(ConfigError::Validation(
                "poller.ttl_secs must be > 0".to_string(),
            ));
        }

        if self.beacon.ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "beacon.ttl_secs must be > 0".to_string(),
            ));
        }

        if self.beacon.watchdog_secs == 0 {
            return Err(ConfigError::Validation(
                "beacon.watchdog_secs must be > 0".to_string(),
            ));
        }

        if self.beacon.enabled && !self.demo && self.beacon.device_id.is_empty() {
            return Err(ConfigError::Validation(
                "beacon.device_id is required when the beacon is enabled".to_string(),
            ));
        }

        if self.expiry.sweep_interval_secs == Some(0) {
            return Err(ConfigError::Validation(
                "expiry.sweep_interval_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            labels: BTreeMap::new(),
            site: SiteConfig::default(),
            poller: PollerConfig::default(),
            beacon: BeaconConfig::default(),
            expiry: ExpiryConfig::default(),
            demo: true,
            logging: LoggingConfig::default(),
        }
    }
}
