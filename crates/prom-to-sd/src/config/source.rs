use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use error_stack::Report;
use serde::Deserialize;
use url::Url;

use crate::errors::ConfigError;

pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// One monitored component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Component name; also the source identifier for counter state.
    pub name: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    /// Empty means every metric passes.
    pub whitelist: BTreeSet<String>,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            path: DEFAULT_METRICS_PATH.to_string(),
            whitelist: BTreeSet::new(),
        }
    }

    pub fn with_whitelist<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = metrics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }

    pub fn allows(&self, metric: &str) -> bool {
        self.whitelist.is_empty() || self.whitelist.contains(metric)
    }
}

impl fmt::Display for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url())
    }
}

/// Splits a comma separated metric list, ignoring empty entries.
pub fn parse_whitelist(list: &str) -> BTreeSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `component:http://host:port[/path]?whitelisted=a,b,c`.
impl FromStr for SourceConfig {
    type Err = Report<ConfigError>;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = |message: String| {
            Report::new(ConfigError::InvalidSource {
                source_spec: spec.to_string(),
                message,
            })
        };

        let (component, rest) = spec
            .split_once(':')
            .ok_or_else(|| invalid("expected `component:url`".to_string()))?;
        if component.is_empty() {
            return Err(invalid("component name is empty".to_string()));
        }

        let url = Url::parse(rest).map_err(|e| invalid(format!("invalid url: {e}")))?;
        if url.scheme() != "http" {
            return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
        }
        let host = url
            .host_str()
            .ok_or_else(|| invalid("url has no host".to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("url has no port".to_string()))?;

        let path = match url.path() {
            "" | "/" => DEFAULT_METRICS_PATH.to_string(),
            p => p.to_string(),
        };

        let whitelist = url
            .query_pairs()
            .filter(|(k, _)| k == "whitelisted")
            .flat_map(|(_, v)| parse_whitelist(&v))
            .collect();

        Ok(SourceConfig {
            name: component.to_string(),
            host: host.to_string(),
            port,
            path,
            whitelist,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SourcesFile {
    #[serde(default)]
    sources: Vec<SourceEntry>,
}

#[derive(Debug, Deserialize)]
struct SourceEntry {
    name: String,
    #[serde(default = "default_host")]
    host: String,
    port: u16,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    whitelisted: Vec<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl From<SourceEntry> for SourceConfig {
    fn from(entry: SourceEntry) -> Self {
        let config = SourceConfig::new(entry.name, entry.host, entry.port)
            .with_whitelist(entry.whitelisted);
        match entry.path {
            Some(path) if !path.is_empty() => config.with_path(path),
            _ => config,
        }
    }
}

/// Loads sources from a YAML file with a top-level `sources:` list.
pub fn load_sources_file(path: &Path) -> Result<Vec<SourceConfig>, Report<ConfigError>> {
    let io_error = |message: String| {
        Report::new(ConfigError::Io {
            path: path.display().to_string(),
            message,
        })
    };
    let content = std::fs::read_to_string(path).map_err(|e| io_error(e.to_string()))?;
    let file: SourcesFile =
        serde_yaml::from_str(&content).map_err(|e| io_error(e.to_string()))?;
    Ok(file.sources.into_iter().map(SourceConfig::from).collect())
}
