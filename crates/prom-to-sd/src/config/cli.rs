use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use utils::version;

use crate::config::resource::DEFAULT_RESOURCE_TYPE;

/// Scrapes Prometheus endpoints and exports the metrics to Cloud Monitoring.
#[derive(Parser, Clone, Debug)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[arg(
        long = "source",
        help = "Source(s) to watch in [component]:http://host:port?whitelisted=a,b,c format"
    )]
    pub sources: Vec<String>,

    #[arg(
        long,
        value_hint = clap::ValueHint::FilePath,
        help = "YAML file with a `sources:` list, merged after --source flags"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        default_value = "",
        help = "The monitored target's name. DEPRECATED: Use --source instead."
    )]
    pub component: String,

    #[arg(
        long,
        default_value = "localhost",
        help = "The monitored component's hostname. DEPRECATED: Use --source instead."
    )]
    pub target_host: String,

    #[arg(
        long,
        default_value_t = 80,
        help = "The monitored component's port. DEPRECATED: Use --source instead."
    )]
    pub target_port: u16,

    #[arg(
        long,
        default_value = "",
        help = "Comma-separated list of whitelisted metrics. If empty all metrics will be exported."
    )]
    pub whitelisted_metrics: String,

    #[arg(
        long,
        default_value = "60s",
        value_parser = humantime::parse_duration,
        help = "The resolution at which the components are scraped for metrics"
    )]
    pub metrics_resolution: Duration,

    #[arg(
        long,
        default_value = "10s",
        value_parser = humantime::parse_duration,
        help = "Upper bound of one scrape; must be shorter than the resolution"
    )]
    pub scrape_timeout: Duration,

    #[arg(
        long,
        default_value = "20s",
        value_parser = humantime::parse_duration,
        help = "Upper bound of one backend write call; must be shorter than the resolution"
    )]
    pub write_timeout: Duration,

    #[arg(
        long,
        default_value = "container.googleapis.com/master",
        help = "Prefix that is appended to every metric"
    )]
    pub stackdriver_prefix: String,

    #[arg(
        long,
        default_value = "https://monitoring.googleapis.com",
        help = "The monitoring API endpoint to override the default one"
    )]
    pub api_override: String,

    #[arg(
        long,
        default_value_t = 200,
        help = "Maximum number of time series per backend write call"
    )]
    pub max_batch_size: usize,

    #[arg(long, env = "GCE_PROJECT", default_value = "", help = "Cloud project id")]
    pub project: String,

    #[arg(long, env = "GCE_ZONE", default_value = "", help = "Zone of this instance")]
    pub zone: String,

    #[arg(long, env = "CLUSTER_NAME", default_value = "", help = "Cluster name")]
    pub cluster: String,

    #[arg(long, env = "INSTANCE_ID", default_value = "", help = "Instance id")]
    pub instance: String,

    #[arg(
        long,
        default_value = DEFAULT_RESOURCE_TYPE,
        help = "Monitored resource type attached to every time series"
    )]
    pub resource_type: String,

    #[arg(
        long,
        env = "MONITORING_TOKEN",
        hide_env_values = true,
        help = "Bearer token for the monitoring API"
    )]
    pub token: Option<String>,

    #[arg(
        long,
        value_hint = clap::ValueHint::FilePath,
        conflicts_with = "token",
        help = "File holding the bearer token, re-read before every write"
    )]
    pub token_file: Option<PathBuf>,

    #[arg(
        long,
        env = "LOG_FILE",
        value_hint = clap::ValueHint::FilePath,
        help = "Also write logs to this daily rotated file"
    )]
    pub log_file: Option<PathBuf>,
}
