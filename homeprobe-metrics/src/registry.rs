//! The metric set exposed on a scrape.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::error::Result;
use crate::metric::Metric;

/// An ordered collection of metrics, rendered together on every scrape.
///
/// The set is assembled at startup through `&mut self` and then shared
/// immutably (usually as [`SharedMetricSet`]); each [`Metric`] carries its
/// own lock for sample updates.
#[derive(Debug, Default)]
pub struct MetricSet {
    /// Metrics keyed by exposition name, kept in name order.
    metrics: BTreeMap<String, Arc<Metric>>,
}

/// Create a shareable metric set handle.
pub type SharedMetricSet = Arc<MetricSet>;

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a metric under its exposition name.
    ///
    /// A metric already registered under the same name is replaced and
    /// returned.
    pub fn add(&mut self, metric: Arc<Metric>) -> Option<Arc<Metric>> {
        let key = metric.exposition_name();
        let replaced = self.metrics.insert(key.clone(), metric);

        if replaced.is_some() {
            warn!(metric = %key, "Metric registered twice, previous registration replaced");
        } else {
            debug!(metric = %key, "Metric registered");
        }
        replaced
    }

    /// Register several metrics; later entries win on name collisions.
    pub fn extend<I: IntoIterator<Item = Arc<Metric>>>(&mut self, metrics: I) {
        for metric in metrics {
            self.add(metric);
        }
    }

    /// Create a gauge, register it and return the shared handle.
    pub fn gauge(&mut self, name: impl Into<String>, help: impl Into<String>) -> Arc<Metric> {
        let metric = Arc::new(Metric::gauge(name, help));
        self.add(metric.clone());
        metric
    }

    /// Look up a metric by exposition name (e.g. `gauge_co2`).
    pub fn get(&self, exposition_name: &str) -> Option<&Arc<Metric>> {
        self.metrics.get(exposition_name)
    }

    /// Number of registered metrics.
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Total number of stored samples across all metrics.
    pub fn series_count(&self) -> usize {
        self.metrics.values().map(|m| m.len()).sum()
    }

    /// Drop expired samples from every metric. Returns how many were removed.
    pub fn expire(&self, now: Instant) -> usize {
        self.metrics.values().map(|m| m.expire(now)).sum()
    }

    /// Write every metric with live samples to `out`, in name order.
    ///
    /// Stops at the first write error; whatever was written before stays
    /// written.
    pub fn write<W: io::Write + ?Sized>(&self, out: &mut W, now: Instant) -> Result<()> {
        for metric in self.metrics.values() {
            metric.render(now, out)?;
        }
        Ok(())
    }

    /// Render the whole set into a string.
    pub fn render(&self, now: Instant) -> String {
        let mut buf = Vec::with_capacity(self.metrics.len() * 128);
        // Writing into a Vec cannot fail.
        self.write(&mut buf, now).ok();
        String::from_utf8(buf).unwrap_or_default()
    }
}
