//! Exporter settings, merged from (lowest to highest precedence) built-in
//! defaults, a YAML configuration file, `PROMETHEUS_RDS_EXPORTER_*`
//! environment variables and command-line flags.
//!
//! The configuration file is looked up in the current directory first, then
//! in the user home directory.

use crate::cli::commands::COLLECT_FLAGS;
use anyhow::{Result, bail};
use clap::ArgMatches;
use clap::parser::ValueSource;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_FILENAME: &str = "prometheus-rds-exporter.yaml";
pub const ENV_PREFIX: &str = "PROMETHEUS_RDS_EXPORTER";

const DEFAULT_LISTEN_ADDRESS: &str = ":9043";
const DEFAULT_METRICS_PATH: &str = "/metrics";
const DEFAULT_LOG_FORMAT: &str = "json";
const DEFAULT_AWS_REGION: &str = "ap-northeast-2";
const DEFAULT_ROLE_SESSION: &str = "prometheus-rds-exporter";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub debug: bool,
    #[serde(alias = "log-format")]
    pub log_format: String,
    #[serde(alias = "listen-address")]
    pub listen_address: String,
    #[serde(alias = "metrics-path")]
    pub metrics_path: String,
    #[serde(alias = "tls-cert-path")]
    pub tls_cert_path: String,
    #[serde(alias = "tls-key-path")]
    pub tls_key_path: String,
    #[serde(alias = "aws-assume-role-arn")]
    pub aws_assume_role_arn: String,
    #[serde(alias = "aws-assume-role-session")]
    pub aws_assume_role_session: String,
    #[serde(alias = "aws-regions")]
    pub aws_regions: Vec<String>,
    #[serde(alias = "collect-instance-metrics")]
    pub collect_instance_metrics: bool,
    #[serde(alias = "collect-instance-tags")]
    pub collect_instance_tags: bool,
    #[serde(alias = "collect-instance-types")]
    pub collect_instance_types: bool,
    #[serde(alias = "collect-logs-size")]
    pub collect_logs_size: bool,
    #[serde(alias = "collect-maintenances")]
    pub collect_maintenances: bool,
    #[serde(alias = "collect-quotas")]
    pub collect_quotas: bool,
    #[serde(alias = "collect-usages")]
    pub collect_usages: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            log_format: DEFAULT_LOG_FORMAT.to_string(),
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            tls_cert_path: String::new(),
            tls_key_path: String::new(),
            aws_assume_role_arn: String::new(),
            aws_assume_role_session: DEFAULT_ROLE_SESSION.to_string(),
            aws_regions: vec![DEFAULT_AWS_REGION.to_string()],
            collect_instance_metrics: true,
            collect_instance_tags: true,
            collect_instance_types: true,
            collect_logs_size: true,
            collect_maintenances: true,
            collect_quotas: true,
            collect_usages: true,
        }
    }
}

impl Settings {
    /// Merge all configuration sources for this invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source cannot be read or the
    /// merged settings fail validation.
    pub fn load(matches: &ArgMatches) -> Result<Self> {
        let explicit_file = matches.get_one::<String>("config").map(String::as_str);

        let mut settings = Self::from_sources(explicit_file)?;
        settings.apply_matches(matches);
        settings.validate()?;

        Ok(settings)
    }

    /// Defaults, then file, then environment.
    fn from_sources(explicit_file: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = explicit_file {
            builder = builder.add_source(File::from(Path::new(path)));
        } else {
            if let Some(home) = dirs::home_dir() {
                builder = builder.add_source(File::from(home.join(CONFIG_FILENAME)).required(false));
            }
            builder = builder.add_source(File::from(Path::new(CONFIG_FILENAME)).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("aws_regions"),
        );

        let merged = builder.build()?;

        Ok(merged.try_deserialize()?)
    }

    /// Command-line flags win over every other source.
    fn apply_matches(&mut self, matches: &ArgMatches) {
        for (flag, field) in [
            ("log-format", &mut self.log_format),
            ("listen-address", &mut self.listen_address),
            ("metrics-path", &mut self.metrics_path),
            ("tls-cert-path", &mut self.tls_cert_path),
            ("tls-key-path", &mut self.tls_key_path),
            ("aws-assume-role-arn", &mut self.aws_assume_role_arn),
            ("aws-assume-role-session", &mut self.aws_assume_role_session),
        ] {
            if matches.value_source(flag) == Some(ValueSource::CommandLine)
                && let Some(value) = matches.get_one::<String>(flag)
            {
                *field = value.clone();
            }
        }

        if matches.value_source("aws-regions") == Some(ValueSource::CommandLine)
            && let Some(regions) = matches.get_many::<String>("aws-regions")
        {
            self.aws_regions = regions.cloned().collect();
        }

        if matches.get_flag("debug") {
            self.debug = true;
        }

        for &flag in COLLECT_FLAGS {
            let field = match flag {
                "collect-instance-metrics" => &mut self.collect_instance_metrics,
                "collect-instance-tags" => &mut self.collect_instance_tags,
                "collect-instance-types" => &mut self.collect_instance_types,
                "collect-logs-size" => &mut self.collect_logs_size,
                "collect-maintenances" => &mut self.collect_maintenances,
                "collect-quotas" => &mut self.collect_quotas,
                "collect-usages" => &mut self.collect_usages,
                _ => continue,
            };

            // The disable flag wins over the enable flag.
            if matches.get_flag(&format!("no-{flag}")) {
                *field = false;
            } else if matches.get_flag(flag) {
                *field = true;
            }
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.log_format != "text" && self.log_format != "json" {
            bail!("invalid log-format '{}': must be 'text' or 'json'", self.log_format);
        }

        if !self.metrics_path.starts_with('/') {
            bail!("invalid metrics-path '{}': must start with '/'", self.metrics_path);
        }

        self.aws_regions.retain(|region| !region.trim().is_empty());
        if self.aws_regions.is_empty() {
            self.aws_regions = vec![DEFAULT_AWS_REGION.to_string()];
        }

        Ok(())
    }
}
