//! Environmental sensor exporter.
//!
//! Polls wired climate and air quality sensors, receives Bluetooth beacon
//! advertisements, and exposes the latest readings on an HTTP `/metrics`
//! endpoint for Prometheus scraping.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐
//! │ EnvironmentPoller │──┐
//! └───────────────────┘  │   ┌─────────────────┐     ┌─────────────────┐
//!                        ├──>│    MetricSet    │────>│   HTTP Server   │
//! ┌───────────────────┐  │   │  (gauges, TTL)  │     │   (/metrics)    │
//! │   BeaconHandler   │──┘   └─────────────────┘     └─────────────────┘
//! └───────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! homeprobe-exporter --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod beacon;
pub mod config;
pub mod demo;
pub mod gauges;
pub mod http;
pub mod poller;
pub mod sensor;

pub use beacon::{Advertisement, BeaconData, BeaconHandler, Outcome};
pub use config::ExporterConfig;
pub use gauges::EnvironmentGauges;
pub use http::HttpServer;
pub use poller::{EnvironmentPoller, PollReport};
pub use sensor::{AirQualitySensor, ClimateSensor, Co2Sensor, SensorError};
