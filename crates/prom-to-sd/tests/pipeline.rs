use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::DateTime;
use chrono::TimeZone;
use chrono::Utc;
use error_stack::Report;
use prom_to_sd::app::ApplicationBuilder;
use prom_to_sd::config::ResourceConfig;
use prom_to_sd::config::Settings;
use prom_to_sd::config::SourceConfig;
use prom_to_sd::config::TokenConfig;
use prom_to_sd::errors::DeliveryError;
use prom_to_sd::errors::ScrapeError;
use prom_to_sd::model::PointTime;
use prom_to_sd::model::TimeSeriesPoint;
use prom_to_sd::scheduler::SourceWorker;
use prom_to_sd::scraper::parser;
use prom_to_sd::scraper::HttpScraper;
use prom_to_sd::scraper::Scrape;
use prom_to_sd::scraper::Scraped;
use prom_to_sd::sender::BatchSender;
use prom_to_sd::sender::MetricWriter;
use prom_to_sd::sender::StackdriverWriter;
use prom_to_sd::translator::Translator;
use serde_json::Value;
use similar_asserts::assert_eq;
use test_log::test;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn resource() -> ResourceConfig {
    ResourceConfig {
        resource_type: "gke_container".to_string(),
        project: "my-project".to_string(),
        zone: "us-central1-b".to_string(),
        cluster: "prod".to_string(),
        instance: "42".to_string(),
    }
}

/// Serves one exposition payload per scrape, stamped with a scripted time.
struct ScriptedScraper {
    script: Mutex<Vec<(String, DateTime<Utc>)>>,
}

impl ScriptedScraper {
    fn new(script: Vec<(String, i64)>) -> Self {
        let mut script: Vec<_> = script
            .into_iter()
            .map(|(payload, secs)| (payload, at(secs)))
            .collect();
        script.reverse();
        Self {
            script: Mutex::new(script),
        }
    }
}

#[async_trait::async_trait]
impl Scrape for ScriptedScraper {
    async fn scrape(&self, source: &SourceConfig) -> Result<Scraped, Report<ScrapeError>> {
        let next = self.script.lock().unwrap().pop();
        let Some((payload, ts)) = next else {
            return Err(Report::new(ScrapeError::Unreachable {
                url: source.url(),
                message: "script exhausted".to_string(),
            }));
        };
        let report = parser::parse(payload.as_bytes(), ts)?;
        Ok(Scraped {
            families: report.families,
            skipped_lines: report.skipped_lines,
        })
    }
}

#[derive(Default)]
struct RecordingWriter {
    points: Mutex<Vec<TimeSeriesPoint>>,
}

impl RecordingWriter {
    fn take(&self) -> Vec<TimeSeriesPoint> {
        std::mem::take(&mut *self.points.lock().unwrap())
    }
}

#[async_trait::async_trait]
impl MetricWriter for RecordingWriter {
    async fn write(&self, batch: &[TimeSeriesPoint]) -> Result<(), Report<DeliveryError>> {
        self.points.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }
}

fn counter(value: u32) -> String {
    format!(
        "# TYPE requests_total counter\nrequests_total{{path=\"/\"}} {value}\n"
    )
}

fn worker(scraper: Arc<dyn Scrape>, writer: Arc<dyn MetricWriter>) -> SourceWorker {
    SourceWorker::new(
        SourceConfig::new("a", "localhost", 9090),
        scraper,
        Arc::new(Translator::new("container.googleapis.com/master", resource())),
        Arc::new(BatchSender::new(writer, 200)),
    )
}

fn single(points: Vec<TimeSeriesPoint>) -> TimeSeriesPoint {
    assert_eq!(points.len(), 1);
    points.into_iter().next().unwrap()
}

#[test(tokio::test)]
async fn counter_reports_raw_value_over_growing_interval() {
    let scraper = Arc::new(ScriptedScraper::new(vec![(counter(10), 0), (counter(15), 60)]));
    let writer = Arc::new(RecordingWriter::default());
    let mut worker = worker(scraper, writer.clone());

    worker.run_cycle().await;
    let first = single(writer.take());
    assert_eq!(
        first.metric_type.as_str(),
        "container.googleapis.com/master/a/requests_total"
    );
    assert_eq!(first.labels["path"].as_str(), "/");
    assert_eq!(first.resource.labels["container_name"].as_str(), "a");
    assert_eq!(first.value, 10.0);
    assert_eq!(
        first.time,
        PointTime::Interval {
            start: at(0),
            end: at(0)
        }
    );

    worker.run_cycle().await;
    let second = single(writer.take());
    assert_eq!(second.value, 15.0);
    assert_eq!(
        second.time,
        PointTime::Interval {
            start: at(0),
            end: at(60)
        }
    );
}

#[test(tokio::test)]
async fn counter_reset_starts_fresh_interval() {
    let scraper = Arc::new(ScriptedScraper::new(vec![
        (counter(10), 0),
        (counter(15), 60),
        (counter(3), 120),
        (counter(7), 180),
    ]));
    let writer = Arc::new(RecordingWriter::default());
    let mut worker = worker(scraper, writer.clone());

    worker.run_cycle().await;
    worker.run_cycle().await;
    let before_reset = writer.take().pop().unwrap();
    assert_eq!(before_reset.value, 15.0);
    assert_eq!(before_reset.time.start(), Some(at(0)));

    let report = worker.run_cycle().await;
    assert_eq!(report.resets, 1);
    let reset = single(writer.take());
    assert_eq!(reset.value, 3.0);
    assert_eq!(
        reset.time,
        PointTime::Interval {
            start: at(120),
            end: at(120)
        }
    );

    worker.run_cycle().await;
    let after = single(writer.take());
    assert_eq!(after.value, 7.0);
    assert_eq!(
        after.time,
        PointTime::Interval {
            start: at(120),
            end: at(180)
        }
    );
}

#[test(tokio::test)]
async fn whitelist_limits_exported_families() {
    let payload = "# TYPE a gauge\na 1\n# TYPE b counter\nb 2\n# TYPE c gauge\nc 3\n";
    let scraper = Arc::new(ScriptedScraper::new(vec![(payload.to_string(), 0)]));
    let writer = Arc::new(RecordingWriter::default());
    let mut worker = SourceWorker::new(
        SourceConfig::new("a", "localhost", 9090).with_whitelist(["a", "b"]),
        scraper,
        Arc::new(Translator::new("custom.googleapis.com", resource())),
        Arc::new(BatchSender::new(writer.clone(), 200)),
    );

    let report = worker.run_cycle().await;
    assert_eq!(report.skipped_families, 1);
    let mut names: Vec<_> = writer.take().into_iter().map(|p| p.metric_name).collect();
    names.sort();
    assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
}

#[test(tokio::test)]
async fn scrapes_endpoint_and_posts_time_series() {
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "# HELP up Whether the target is up.\n# TYPE up gauge\nup 1\n\
             # TYPE requests_total counter\nrequests_total{code=\"200\"} 5\n",
        ))
        .mount(&target)
        .await;

    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/projects/my-project/timeSeries"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&backend)
        .await;

    let address = target.address();
    let source = SourceConfig::new("kube-proxy", address.ip().to_string(), address.port());
    let writer = StackdriverWriter::new(
        &backend.uri(),
        "my-project",
        TokenConfig::Static("secret".to_string()),
        Duration::from_secs(2),
    )
    .expect("writer");
    let mut worker = SourceWorker::new(
        source,
        Arc::new(HttpScraper::new(Duration::from_secs(2)).expect("scraper")),
        Arc::new(Translator::new("container.googleapis.com/master", resource())),
        Arc::new(BatchSender::new(Arc::new(writer), 200)),
    );

    let report = worker.run_cycle().await;
    assert!(report.scraped);
    assert_eq!(report.points_sent, 2);

    let requests = backend.received_requests().await.expect("recording enabled");
    let body: Value = serde_json::from_slice(&requests[0].body).expect("json body");
    let series = body["timeSeries"].as_array().expect("timeSeries array");
    assert_eq!(series.len(), 2);
    let types: Vec<_> = series
        .iter()
        .map(|s| s["metric"]["type"].as_str().unwrap_or_default())
        .collect();
    assert!(types.contains(&"container.googleapis.com/master/kube-proxy/up"));
    assert!(types.contains(&"container.googleapis.com/master/kube-proxy/requests_total"));
}

#[test(tokio::test)]
async fn application_runs_every_source_until_cancelled() {
    let settings = settings(&["a", "b"], Duration::from_millis(20));

    // Both workers pop from one shared script; values only grow.
    let script = (0..100).map(|i| (counter(i), i64::from(i) * 60)).collect();
    let scraper = Arc::new(ScriptedScraper::new(script));
    let writer = Arc::new(RecordingWriter::default());

    let app = ApplicationBuilder::new(settings)
        .with_scraper(scraper)
        .with_writer(writer.clone())
        .build()
        .expect("app");

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        })
    };

    tokio::time::timeout(Duration::from_secs(5), app.run(token))
        .await
        .expect("app should stop after cancellation")
        .expect("app should succeed");
    canceller.await.expect("canceller");

    let points = writer.take();
    let containers: std::collections::BTreeSet<_> = points
        .iter()
        .map(|p| p.resource.labels["container_name"].clone())
        .collect();
    assert_eq!(
        containers,
        ["a".to_string(), "b".to_string()].into_iter().collect()
    );
}

fn settings(names: &[&str], resolution: Duration) -> Settings {
    Settings {
        sources: names
            .iter()
            .enumerate()
            .map(|(i, name)| SourceConfig::new(*name, "localhost", 9000 + i as u16))
            .collect(),
        resolution,
        scrape_timeout: resolution / 2,
        write_timeout: resolution / 2,
        metrics_prefix: "custom.googleapis.com".to_string(),
        api_endpoint: "http://127.0.0.1:1".to_string(),
        max_batch_size: 200,
        resource: resource(),
        token: TokenConfig::Static("t".to_string()),
    }
}

/// `slow` hangs well past the tick period and then fails, `broken` panics,
/// every other source serves a growing counter.
struct MixedScraper {
    served: std::sync::atomic::AtomicU32,
}

#[async_trait::async_trait]
impl Scrape for MixedScraper {
    async fn scrape(&self, source: &SourceConfig) -> Result<Scraped, Report<ScrapeError>> {
        match source.name.as_str() {
            "slow" => {
                tokio::time::sleep(Duration::from_millis(400)).await;
                Err(Report::new(ScrapeError::Timeout {
                    url: source.url(),
                    millis: 400,
                }))
            }
            "broken" => panic!("scraper bug"),
            _ => {
                let n = self
                    .served
                    .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                let report = parser::parse(counter(n).as_bytes(), Utc::now())?;
                Ok(Scraped {
                    families: report.families,
                    skipped_lines: report.skipped_lines,
                })
            }
        }
    }
}

#[test(tokio::test)]
async fn stalled_source_does_not_delay_healthy_source() {
    let writer = Arc::new(RecordingWriter::default());
    let app = ApplicationBuilder::new(settings(&["slow", "fast"], Duration::from_millis(20)))
        .with_scraper(Arc::new(MixedScraper {
            served: Default::default(),
        }))
        .with_writer(writer.clone())
        .build()
        .expect("app");

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            token.cancel();
        })
    };
    tokio::time::timeout(Duration::from_secs(5), app.run(token))
        .await
        .expect("app should stop after cancellation")
        .expect("app should succeed");
    canceller.await.expect("canceller");

    let points = writer.take();
    assert!(
        points.len() >= 5,
        "healthy source delivered only {} points",
        points.len()
    );
    assert!(points
        .iter()
        .all(|p| p.resource.labels["container_name"] == "fast"));
    // One fresh counter: every point shares the first start time.
    let starts: std::collections::BTreeSet<_> =
        points.iter().map(|p| p.time.start()).collect();
    assert_eq!(starts.len(), 1);
}

#[test(tokio::test)]
async fn panicking_worker_leaves_others_running_and_losing_all_fails() {
    let writer = Arc::new(RecordingWriter::default());
    let app = ApplicationBuilder::new(settings(&["broken", "fast"], Duration::from_millis(20)))
        .with_scraper(Arc::new(MixedScraper {
            served: Default::default(),
        }))
        .with_writer(writer.clone())
        .build()
        .expect("app");
    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        })
    };
    tokio::time::timeout(Duration::from_secs(5), app.run(token))
        .await
        .expect("app should stop after cancellation")
        .expect("one live worker is enough");
    canceller.await.expect("canceller");
    assert!(!writer.take().is_empty());

    let app = ApplicationBuilder::new(settings(&["broken"], Duration::from_millis(20)))
        .with_scraper(Arc::new(MixedScraper {
            served: Default::default(),
        }))
        .with_writer(Arc::new(RecordingWriter::default()))
        .build()
        .expect("app");
    let err = tokio::time::timeout(Duration::from_secs(5), app.run(CancellationToken::new()))
        .await
        .expect("app should give up without workers")
        .expect_err("no live workers is an error");
    assert!(err.to_string().contains("all source workers exited"));
}

#[test(tokio::test)]
async fn nan_quantile_does_not_poison_the_write() {
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "# TYPE rpc summary\nrpc{quantile=\"0.5\"} NaN\nrpc_sum 0\nrpc_count 0\n\
             # TYPE up gauge\nup 1\n",
        ))
        .mount(&target)
        .await;

    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&backend)
        .await;

    let address = target.address();
    let writer = StackdriverWriter::new(
        &backend.uri(),
        "my-project",
        TokenConfig::Static("secret".to_string()),
        Duration::from_secs(2),
    )
    .expect("writer");
    let mut worker = SourceWorker::new(
        SourceConfig::new("api", address.ip().to_string(), address.port()),
        Arc::new(HttpScraper::new(Duration::from_secs(2)).expect("scraper")),
        Arc::new(Translator::new("custom.googleapis.com", resource())),
        Arc::new(BatchSender::new(Arc::new(writer), 200)),
    );

    let report = worker.run_cycle().await;
    assert_eq!(report.skipped_points, 1);
    assert_eq!(report.points_sent, 3);
    assert_eq!(report.points_dropped, 0);

    let requests = backend.received_requests().await.expect("recording enabled");
    let body: Value = serde_json::from_slice(&requests[0].body).expect("json body");
    let series = body["timeSeries"].as_array().expect("timeSeries array");
    assert_eq!(series.len(), 3);
    assert!(series
        .iter()
        .all(|s| s["points"][0]["value"]["doubleValue"].is_f64()));
}
