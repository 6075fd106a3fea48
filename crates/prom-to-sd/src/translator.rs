//! Translation of scraped metric families into delivery time series.

use chrono::DateTime;
use chrono::Utc;

use crate::config::ResourceConfig;
use crate::config::SourceConfig;
use crate::model::Labels;
use crate::model::MetricFamily;
use crate::model::MetricKind;
use crate::model::PointTime;
use crate::model::ResourceDescriptor;
use crate::model::SampleValue;
use crate::model::TimeSeriesPoint;
use crate::tracker::CounterStateTracker;
use crate::tracker::SeriesKey;

const BUCKET_LABEL: &str = "le";
const QUANTILE_LABEL: &str = "quantile";

/// Points produced for one source in one cycle.
#[derive(Debug, Default)]
pub struct Translation {
    pub points: Vec<TimeSeriesPoint>,
    /// Families that produced no points: filtered out or unusable.
    pub skipped_families: usize,
    /// Cumulative series whose counter went backwards in this cycle.
    pub resets: usize,
    /// NaN or infinite sample values; the monitoring API cannot store them.
    pub skipped_points: usize,
}

/// Stateless part of the translation; the tracker is supplied per call.
#[derive(Debug, Clone)]
pub struct Translator {
    metrics_prefix: String,
    resource: ResourceConfig,
}

impl Translator {
    pub fn new(metrics_prefix: impl Into<String>, resource: ResourceConfig) -> Self {
        Self {
            metrics_prefix: metrics_prefix.into().trim_end_matches('/').to_string(),
            resource,
        }
    }

    pub fn metric_type(&self, component: &str, metric: &str) -> String {
        format!("{}/{}/{}", self.metrics_prefix, component, metric)
    }

    /// Translates `families` scraped from `source`.
    ///
    /// Never fails: a family that is not whitelisted or whose samples do not
    /// match its declared kind yields no points and is counted as skipped.
    pub fn translate(
        &self,
        source: &SourceConfig,
        families: &[MetricFamily],
        tracker: &mut CounterStateTracker,
    ) -> Translation {
        let mut out = FamilyWriter {
            translator: self,
            source,
            resource: self.resource.descriptor_for(&source.name),
            tracker,
            translation: Translation::default(),
        };

        for family in families {
            if !source.allows(&family.name) {
                tracing::debug!(
                    source = %source.name,
                    metric = %family.name,
                    "metric not whitelisted, skipping"
                );
                out.translation.skipped_families += 1;
                continue;
            }
            if !out.family(family) {
                tracing::debug!(
                    source = %source.name,
                    metric = %family.name,
                    kind = %family.kind,
                    "family samples do not match declared kind, skipping"
                );
                out.translation.skipped_families += 1;
            }
        }

        out.translation
    }
}

struct FamilyWriter<'a> {
    translator: &'a Translator,
    source: &'a SourceConfig,
    resource: ResourceDescriptor,
    tracker: &'a mut CounterStateTracker,
    translation: Translation,
}

impl FamilyWriter<'_> {
    /// Emits the points of one family; returns false if it had to be skipped.
    fn family(&mut self, family: &MetricFamily) -> bool {
        let well_formed = family.samples.iter().all(|s| match family.kind {
            MetricKind::Histogram => matches!(s.value, SampleValue::Histogram { .. }),
            MetricKind::Summary => matches!(s.value, SampleValue::Summary { .. }),
            _ => matches!(s.value, SampleValue::Scalar(_)),
        });
        if !well_formed || family.samples.is_empty() {
            return false;
        }

        for sample in &family.samples {
            let ts = sample.timestamp;
            match (&sample.value, family.kind) {
                (SampleValue::Scalar(v), MetricKind::Gauge | MetricKind::Untyped) => {
                    self.gauge(&family.name, sample.labels.clone(), *v, ts);
                }
                (SampleValue::Scalar(v), MetricKind::Counter) => {
                    self.cumulative(&family.name, sample.labels.clone(), *v, ts);
                }
                (SampleValue::Histogram { buckets, sum, count }, _) => {
                    for bucket in buckets {
                        let mut labels = sample.labels.clone();
                        labels.insert(BUCKET_LABEL.to_string(), bucket.label.clone());
                        self.cumulative(&family.name, labels, bucket.value, ts);
                    }
                    self.sum_and_count(&family.name, &sample.labels, *sum, *count, ts);
                }
                (SampleValue::Summary { quantiles, sum, count }, _) => {
                    for quantile in quantiles {
                        let mut labels = sample.labels.clone();
                        labels.insert(QUANTILE_LABEL.to_string(), quantile.label.clone());
                        self.cumulative(&family.name, labels, quantile.value, ts);
                    }
                    self.sum_and_count(&family.name, &sample.labels, *sum, *count, ts);
                }
                // Excluded by the well-formedness check above.
                (SampleValue::Scalar(_), _) => {}
            }
        }
        true
    }

    fn sum_and_count(
        &mut self,
        name: &str,
        labels: &Labels,
        sum: Option<f64>,
        count: Option<f64>,
        ts: DateTime<Utc>,
    ) {
        if let Some(sum) = sum {
            self.cumulative(&format!("{name}_sum"), labels.clone(), sum, ts);
        }
        if let Some(count) = count {
            self.cumulative(&format!("{name}_count"), labels.clone(), count, ts);
        }
    }

    fn gauge(&mut self, name: &str, labels: Labels, value: f64, ts: DateTime<Utc>) {
        if !value.is_finite() {
            self.skip_point(name, value);
            return;
        }
        self.push(name, labels, value, PointTime::Instant(ts));
    }

    fn cumulative(&mut self, name: &str, labels: Labels, value: f64, ts: DateTime<Utc>) {
        let key = SeriesKey::new(&self.source.name, name, &labels);
        let Some(observation) = self.tracker.observe(&key, value, ts) else {
            self.skip_point(name, value);
            return;
        };
        if observation.reset {
            tracing::debug!(
                source = %self.source.name,
                series = %key,
                "counter reset detected"
            );
            self.translation.resets += 1;
        }
        self.push(
            name,
            labels,
            value,
            PointTime::Interval {
                start: observation.start,
                end: ts,
            },
        );
    }

    fn skip_point(&mut self, name: &str, value: f64) {
        tracing::trace!(source = %self.source.name, metric = name, %value, "non-finite value, skipping");
        self.translation.skipped_points += 1;
    }

    fn push(&mut self, name: &str, labels: Labels, value: f64, time: PointTime) {
        self.translation.points.push(TimeSeriesPoint {
            metric_type: self.translator.metric_type(&self.source.name, name),
            metric_name: name.to_string(),
            resource: self.resource.clone(),
            labels,
            value,
            time,
        });
    }
}
