//! In-memory representation of scraped metric families and of the
//! time series handed to the monitoring backend.

use std::collections::BTreeMap;
use std::fmt;

use chrono::DateTime;
use chrono::Utc;

/// Label name to label value. Ordered so two label sets with the same
/// content always iterate (and therefore canonicalize) identically.
pub type Labels = BTreeMap<String, String>;

/// Metric kind declared by the exposition `# TYPE` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl MetricKind {
    /// Unknown keywords classify as [`MetricKind::Untyped`].
    pub fn from_type_keyword(keyword: &str) -> Self {
        match keyword {
            "counter" => MetricKind::Counter,
            "gauge" => MetricKind::Gauge,
            "histogram" => MetricKind::Histogram,
            "summary" => MetricKind::Summary,
            _ => MetricKind::Untyped,
        }
    }

    pub fn is_cumulative(self) -> bool {
        matches!(
            self,
            MetricKind::Counter | MetricKind::Histogram | MetricKind::Summary
        )
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
            MetricKind::Untyped => "untyped",
        };
        f.write_str(s)
    }
}

/// One histogram bucket or summary quantile.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    /// Parsed `le` or `quantile`, used for ordering.
    pub bound: f64,
    /// The bound exactly as it appeared in the exposition.
    pub label: String,
    pub value: f64,
}

impl Bucket {
    pub fn new(bound: f64, label: impl Into<String>, value: f64) -> Self {
        Self {
            bound,
            label: label.into(),
            value,
        }
    }
}

/// Value of one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Scalar(f64),
    /// `buckets` holds cumulative counts sorted by upper bound.
    Histogram {
        buckets: Vec<Bucket>,
        sum: Option<f64>,
        count: Option<f64>,
    },
    /// `quantiles` is sorted by quantile.
    Summary {
        quantiles: Vec<Bucket>,
        sum: Option<f64>,
        count: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Labels,
    pub value: SampleValue,
    /// Instant the scrape completed; shared by every sample of one scrape.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub kind: MetricKind,
    pub help: Option<String>,
    pub samples: Vec<Sample>,
}

/// Monitored resource attached to every point of one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub resource_type: String,
    pub labels: Labels,
}

/// Timestamp shape of a delivered point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointTime {
    Instant(DateTime<Utc>),
    Interval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl PointTime {
    pub fn end(&self) -> DateTime<Utc> {
        match self {
            PointTime::Instant(t) => *t,
            PointTime::Interval { end, .. } => *end,
        }
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        match self {
            PointTime::Instant(_) => None,
            PointTime::Interval { start, .. } => Some(*start),
        }
    }
}

/// Delivery-format unit: one value of one series.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesPoint {
    /// Fully qualified metric type, `<prefix>/<component>/<name>`.
    pub metric_type: String,
    pub metric_name: String,
    pub resource: ResourceDescriptor,
    pub labels: Labels,
    pub value: f64,
    pub time: PointTime,
}

impl TimeSeriesPoint {
    pub fn is_cumulative(&self) -> bool {
        matches!(self.time, PointTime::Interval { .. })
    }
}
