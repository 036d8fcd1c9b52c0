//! A single named metric and its label-keyed samples.

use std::collections::BTreeMap;
use std::io;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use crate::error::Result;
use crate::labels::Labels;
use crate::value::RoundedValue;

/// Exposition type of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
        }
    }
}

/// Latest value of one series.
#[derive(Debug, Clone, Copy)]
struct Sample {
    value: RoundedValue,
    expires_at: Option<Instant>,
}

impl Sample {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// A named time series holding the latest sample per label set.
///
/// Writers and the renderer share one lock per metric, so a render observes
/// and prunes a consistent snapshot while producers keep updating other
/// metrics without contention.
#[derive(Debug)]
pub struct Metric {
    kind: MetricKind,
    name: String,
    help: String,
    /// Samples keyed by rendered label set, kept in key order.
    samples: Mutex<BTreeMap<String, Sample>>,
}

impl Metric {
    /// Create a metric of the given kind.
    pub fn new(kind: MetricKind, name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            help: help.into(),
            samples: Mutex::new(BTreeMap::new()),
        }
    }

    /// Create a gauge.
    pub fn gauge(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self::new(MetricKind::Gauge, name, help)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Registry key, derived from kind and name (e.g. `gauge_temperature`).
    pub fn exposition_name(&self) -> String {
        format!("{}_{}", self.kind.as_str(), self.name)
    }

    /// Set the value of a series. The sample never expires.
    pub fn set(&self, labels: &Labels, value: RoundedValue) {
        self.store(labels, value, None);
    }

    /// Set the value of a series, dropping it once `expires_at` is reached.
    pub fn set_with_timeout(&self, labels: &Labels, value: RoundedValue, expires_at: Instant) {
        self.store(labels, value, Some(expires_at));
    }

    /// Set the value of a series for `ttl` from now.
    pub fn set_with_ttl(&self, labels: &Labels, value: RoundedValue, ttl: Duration) {
        self.set_with_timeout(labels, value, Instant::now() + ttl);
    }

    fn store(&self, labels: &Labels, value: RoundedValue, expires_at: Option<Instant>) {
        let key = labels.render();
        trace!(metric = %self.name, labels = %key, value = %value, "Sample set");

        self.samples.lock().insert(key, Sample { value, expires_at });
    }

    /// Remove samples whose expiry has been reached. Returns how many were dropped.
    pub fn expire(&self, now: Instant) -> usize {
        let mut samples = self.samples.lock();
        self.expire_locked(&mut samples, now)
    }

    fn expire_locked(&self, samples: &mut BTreeMap<String, Sample>, now: Instant) -> usize {
        let before = samples.len();
        samples.retain(|_, sample| !sample.is_expired(now));

        let removed = before - samples.len();
        if removed > 0 {
            trace!(
                metric = %self.name,
                removed,
                remaining = samples.len(),
                "Expired samples"
            );
        }
        removed
    }

    /// Number of stored samples, including any not yet pruned.
    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// Expire stale samples and write the metric block to `out`.
    ///
    /// A metric without live samples writes nothing, not even its HELP and
    /// TYPE lines. Expired samples stay removed even if the write fails.
    pub fn render<W: io::Write + ?Sized>(&self, now: Instant, out: &mut W) -> Result<()> {
        let block = {
            let mut samples = self.samples.lock();
            self.expire_locked(&mut samples, now);

            if samples.is_empty() {
                return Ok(());
            }

            let mut block = format!(
                "# HELP {name} {help}\n# TYPE {name} {kind}\n",
                name = self.name,
                help = self.help,
                kind = self.kind.as_str(),
            );
            for (labels, sample) in samples.iter() {
                block.push_str(&format!("{}{} {}\n", self.name, labels, sample.value));
            }
            block
        };

        out.write_all(block.as_bytes())?;
        Ok(())
    }
}
