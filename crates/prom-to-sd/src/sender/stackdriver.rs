//! Cloud Monitoring (Stackdriver) v3 `timeSeries.create` writer.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use error_stack::Report;
use error_stack::ResultExt;
use serde::Serialize;

use crate::config::TokenConfig;
use crate::errors::DeliveryError;
use crate::model::PointTime;
use crate::model::TimeSeriesPoint;
use crate::sender::MetricWriter;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTimeSeriesRequest<'a> {
    time_series: Vec<TimeSeries<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TimeSeries<'a> {
    metric: Metric<'a>,
    resource: MonitoredResource<'a>,
    metric_kind: &'static str,
    value_type: &'static str,
    points: [Point; 1],
}

#[derive(Debug, Serialize)]
struct Metric<'a> {
    #[serde(rename = "type")]
    metric_type: &'a str,
    labels: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct MonitoredResource<'a> {
    #[serde(rename = "type")]
    resource_type: &'a str,
    labels: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct Point {
    interval: Interval,
    value: TypedValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Interval {
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<String>,
    end_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TypedValue {
    double_value: f64,
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl<'a> From<&'a TimeSeriesPoint> for TimeSeries<'a> {
    fn from(point: &'a TimeSeriesPoint) -> Self {
        let (metric_kind, interval) = match point.time {
            PointTime::Instant(t) => (
                "GAUGE",
                Interval {
                    start_time: None,
                    end_time: rfc3339(t),
                },
            ),
            PointTime::Interval { start, end } => (
                "CUMULATIVE",
                Interval {
                    start_time: Some(rfc3339(start)),
                    end_time: rfc3339(end),
                },
            ),
        };
        TimeSeries {
            metric: Metric {
                metric_type: &point.metric_type,
                labels: &point.labels,
            },
            resource: MonitoredResource {
                resource_type: &point.resource.resource_type,
                labels: &point.resource.labels,
            },
            metric_kind,
            value_type: "DOUBLE",
            points: [Point {
                interval,
                value: TypedValue {
                    double_value: point.value,
                },
            }],
        }
    }
}

/// Writes batches to `<endpoint>/v3/projects/<project>/timeSeries`.
pub struct StackdriverWriter {
    client: reqwest::Client,
    url: String,
    token: TokenConfig,
    timeout: Duration,
}

impl StackdriverWriter {
    pub fn new(
        endpoint: &str,
        project: &str,
        token: TokenConfig,
        timeout: Duration,
    ) -> Result<Self, Report<DeliveryError>> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .change_context(DeliveryError::Unreachable {
                points: 0,
                message: "failed to build HTTP client".to_string(),
            })?;
        Ok(Self {
            client,
            url: format!(
                "{}/v3/projects/{}/timeSeries",
                endpoint.trim_end_matches('/'),
                project
            ),
            token,
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn bearer_token(&self) -> Result<String, Report<DeliveryError>> {
        match &self.token {
            TokenConfig::Static(token) => Ok(token.clone()),
            TokenConfig::File(path) => {
                let token = tokio::fs::read_to_string(path).await.change_context(
                    DeliveryError::Auth {
                        message: format!("failed to read token file {}", path.display()),
                    },
                )?;
                let token = token.trim();
                if token.is_empty() {
                    return Err(Report::new(DeliveryError::Auth {
                        message: format!("token file {} is empty", path.display()),
                    }));
                }
                Ok(token.to_string())
            }
        }
    }
}

#[async_trait::async_trait]
impl MetricWriter for StackdriverWriter {
    async fn write(&self, batch: &[TimeSeriesPoint]) -> Result<(), Report<DeliveryError>> {
        let points = batch.len();
        let token = self.bearer_token().await?;
        let body = CreateTimeSeriesRequest {
            time_series: batch.iter().map(TimeSeries::from).collect(),
        };
        let body = serde_json::to_vec(&body).map_err(|e| {
            Report::new(DeliveryError::Encode {
                points,
                message: e.to_string(),
            })
        })?;

        let request = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| {
                Report::new(DeliveryError::Timeout {
                    points,
                    millis: self.timeout.as_millis() as u64,
                })
            })?
            .map_err(|e| {
                let context = if e.is_timeout() {
                    DeliveryError::Timeout {
                        points,
                        millis: self.timeout.as_millis() as u64,
                    }
                } else {
                    DeliveryError::Unreachable {
                        points,
                        message: e.to_string(),
                    }
                };
                Report::new(context)
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        Err(Report::new(DeliveryError::Rejected {
            status: status.as_u16(),
            points,
        })
        .attach_printable(format!("backend response: {text}")))
    }
}
