pub mod cli;
pub mod resource;
pub mod source;

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use error_stack::Report;

pub use cli::*;
pub use resource::*;
pub use source::*;

use crate::errors::ConfigError;

/// Where the bearer token for the monitoring API comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenConfig {
    Static(String),
    File(PathBuf),
}

/// Validated runtime settings; everything the workers need.
#[derive(Debug, Clone)]
pub struct Settings {
    pub sources: Vec<SourceConfig>,
    pub resolution: Duration,
    pub scrape_timeout: Duration,
    pub write_timeout: Duration,
    pub metrics_prefix: String,
    pub api_endpoint: String,
    pub max_batch_size: usize,
    pub resource: ResourceConfig,
    pub token: TokenConfig,
}

impl Cli {
    /// Collects the sources named by `--source`, `--component` and `--config`.
    pub fn source_configs(&self) -> Result<Vec<SourceConfig>, Report<ConfigError>> {
        let mut sources = self
            .sources
            .iter()
            .map(|spec| spec.parse::<SourceConfig>())
            .collect::<Result<Vec<_>, _>>()?;

        if !self.component.is_empty() {
            let source =
                SourceConfig::new(&self.component, &self.target_host, self.target_port)
                    .with_whitelist(parse_whitelist(&self.whitelisted_metrics));
            tracing::info!(
                "--component flag was specified. Created a new source instance: {source}"
            );
            sources.push(source);
        }

        if let Some(path) = &self.config {
            sources.extend(load_sources_file(path)?);
        }

        Ok(sources)
    }

    /// Validates the command line into [`Settings`]. Any error is fatal.
    pub fn into_settings(self) -> Result<Settings, Report<ConfigError>> {
        let sources = self.source_configs()?;
        if sources.is_empty() {
            return Err(Report::new(ConfigError::NoSources));
        }
        let mut seen = HashSet::new();
        for source in &sources {
            if !seen.insert(source.name.as_str()) {
                return Err(Report::new(ConfigError::DuplicateSource {
                    name: source.name.clone(),
                }));
            }
        }

        for (name, timeout) in [
            ("scrape timeout", self.scrape_timeout),
            ("write timeout", self.write_timeout),
        ] {
            if timeout >= self.metrics_resolution {
                return Err(Report::new(ConfigError::InvalidTimeout {
                    name,
                    timeout,
                    resolution: self.metrics_resolution,
                }));
            }
        }

        if self.max_batch_size == 0 {
            return Err(Report::new(ConfigError::Missing {
                name: "max batch size (must be positive)",
            }));
        }
        if self.project.is_empty() {
            return Err(Report::new(ConfigError::Missing { name: "project" }));
        }

        let token = match (self.token, self.token_file) {
            (Some(token), _) if !token.is_empty() => TokenConfig::Static(token),
            (_, Some(path)) => TokenConfig::File(path),
            _ => return Err(Report::new(ConfigError::Missing { name: "token" })),
        };

        Ok(Settings {
            sources,
            resolution: self.metrics_resolution,
            scrape_timeout: self.scrape_timeout,
            write_timeout: self.write_timeout,
            metrics_prefix: self.stackdriver_prefix,
            api_endpoint: self.api_override.trim_end_matches('/').to_string(),
            max_batch_size: self.max_batch_size,
            resource: ResourceConfig {
                resource_type: self.resource_type,
                project: self.project,
                zone: self.zone,
                cluster: self.cluster,
                instance: self.instance,
            },
            token,
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use similar_asserts::assert_eq;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["prom-to-sd", "--project", "p", "--token", "t"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("args should parse")
    }

    #[test]
    fn merges_source_flags_and_legacy_component() {
        let settings = cli(&[
            "--source",
            "a:http://localhost:8080",
            "--source",
            "b:http://localhost:8081?whitelisted=x",
            "--component",
            "legacy",
            "--target-port",
            "9000",
            "--whitelisted-metrics",
            "m1,m2",
        ])
        .into_settings()
        .expect("settings");

        let names: Vec<_> = settings.sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "legacy"]);
        assert_eq!(settings.sources[2].url().as_str(), "http://localhost:9000/metrics");
        assert_eq!(settings.sources[2].whitelist.len(), 2);
        assert_eq!(settings.resolution, Duration::from_secs(60));
        assert_eq!(settings.max_batch_size, 200);
        assert_eq!(settings.token, TokenConfig::Static("t".to_string()));
    }

    #[test]
    fn zero_sources_is_fatal() {
        let err = cli(&[]).into_settings().expect_err("should fail");
        assert!(matches!(err.current_context(), ConfigError::NoSources));
    }

    #[test]
    fn duplicate_source_names_rejected() {
        let err = cli(&[
            "--source",
            "a:http://localhost:1",
            "--source",
            "a:http://localhost:2",
        ])
        .into_settings()
        .expect_err("should fail");
        assert!(matches!(
            err.current_context(),
            ConfigError::DuplicateSource { .. }
        ));
    }

    #[test]
    fn timeouts_must_fit_in_resolution() {
        let err = cli(&[
            "--source",
            "a:http://localhost:1",
            "--metrics-resolution",
            "5s",
        ])
        .into_settings()
        .expect_err("should fail");
        assert!(matches!(
            err.current_context(),
            ConfigError::InvalidTimeout {
                name: "scrape timeout",
                ..
            }
        ));

        let settings = cli(&[
            "--source",
            "a:http://localhost:1",
            "--metrics-resolution",
            "30s",
            "--scrape-timeout",
            "5s",
            "--write-timeout",
            "500ms",
        ])
        .into_settings()
        .expect("settings");
        assert_eq!(settings.write_timeout, Duration::from_millis(500));
    }

    #[test]
    fn token_file_is_accepted() {
        let settings = Cli::try_parse_from([
            "prom-to-sd",
            "--project",
            "p",
            "--token-file",
            "/var/run/token",
            "--source",
            "a:http://localhost:1",
        ])
        .expect("args")
        .into_settings()
        .expect("settings");
        assert_eq!(
            settings.token,
            TokenConfig::File(PathBuf::from("/var/run/token"))
        );
    }
}
