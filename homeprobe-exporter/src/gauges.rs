//! The gauges published by the exporter.

use std::sync::Arc;

use homeprobe_metrics::{Metric, MetricSet};

/// Shared handles to every gauge the producers write to.
#[derive(Debug, Clone)]
pub struct EnvironmentGauges {
    pub temperature: Arc<Metric>,
    pub relative_humidity: Arc<Metric>,
    pub absolute_humidity: Arc<Metric>,
    pub pressure: Arc<Metric>,
    pub co2: Arc<Metric>,
    pub eco2: Arc<Metric>,
    pub voc: Arc<Metric>,
    pub discomfort_index: Arc<Metric>,
    pub sound_noise: Arc<Metric>,
    pub heat_stroke: Arc<Metric>,
    pub sensor_vbat: Arc<Metric>,
    pub ambient_light: Arc<Metric>,
    pub uv_index: Arc<Metric>,
}

impl EnvironmentGauges {
    /// Create every gauge and register it in `set`.
    pub fn register(set: &mut MetricSet) -> Self {
        Self {
            temperature: set.gauge("temperature", "Temperature"),
            relative_humidity: set.gauge("relative_humidity", "Relative Humidity percent"),
            absolute_humidity: set.gauge("absolute_humidity", "Absolute Humidity g/m^3"),
            pressure: set.gauge("pressure", "Air Pressure hPa"),
            co2: set.gauge("co2", "CO2 ppm"),
            eco2: set.gauge("eco2", "eCO2 ppm"),
            voc: set.gauge("voc", "VOC ppb"),
            discomfort_index: set.gauge("discomfort_index", "Discomfort Index"),
            sound_noise: set.gauge("sound_noise", "Sound Noise db"),
            heat_stroke: set.gauge("heat_stroke", "WBGT"),
            sensor_vbat: set.gauge("sensor_vbat", "Voltage of Sensor battery"),
            ambient_light: set.gauge("ambient_light", "Ambient Light lx"),
            uv_index: set.gauge("uv_index", "Index of UV"),
        }
    }
}
