//! Gauge registry for the homeprobe exporters.
//!
//! Producers set the latest reading of each series on a shared [`Metric`];
//! the HTTP endpoint calls [`MetricSet::write`] on every scrape, which drops
//! expired samples and renders the rest in a deterministic text format:
//!
//! ```text
//! # HELP temperature Temperature
//! # TYPE temperature gauge
//! temperature{place="inside"} 22.41
//! temperature{place="outside"} 12.08
//! ```
//!
//! # Example
//!
//! ```
//! use std::time::Instant;
//! use homeprobe_metrics::{Labels, MetricSet, RoundedValue};
//!
//! let mut set = MetricSet::new();
//! let co2 = set.gauge("co2", "CO2 ppm");
//!
//! co2.set(&Labels::from([("place", "inside")]), RoundedValue::new(612.0, 0));
//!
//! assert_eq!(
//!     set.render(Instant::now()),
//!     "# HELP co2 CO2 ppm\n# TYPE co2 gauge\nco2{place=\"inside\"} 612\n"
//! );
//! ```

pub mod error;
pub mod labels;
pub mod metric;
pub mod registry;
pub mod value;

pub use error::{MetricsError, Result};
pub use labels::Labels;
pub use metric::{Metric, MetricKind};
pub use registry::{MetricSet, SharedMetricSet};
pub use value::RoundedValue;
