mod collect_flags;

pub use collect_flags::COLLECT_FLAGS;

use crate::build_info;
use clap::{Arg, ArgAction, ColorChoice, Command};

#[must_use]
pub fn new() -> Command {
    let command = Command::new("rds_exporter")
        .about("Prometheus exporter for AWS RDS")
        .long_about(
            "Collect AWS RDS key metrics from AWS APIs and expose them as Prometheus metrics.",
        )
        .version(build_info::VERSION)
        .color(ColorChoice::Auto)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help(format!(
                    "Config file (default is {} in the current or home directory)",
                    crate::config::CONFIG_FILENAME
                ))
                .value_name("FILE"),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Enable debug mode")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-format")
                .short('l')
                .long("log-format")
                .help("Log format [default: json]")
                .value_parser(["text", "json"]),
        )
        .arg(
            Arg::new("listen-address")
                .long("listen-address")
                .help("Address to listen on for web interface [default: :9043]")
                .value_name("ADDRESS"),
        )
        .arg(
            Arg::new("metrics-path")
                .long("metrics-path")
                .help("Path under which to expose metrics [default: /metrics]")
                .value_name("PATH"),
        )
        .arg(
            Arg::new("tls-cert-path")
                .long("tls-cert-path")
                .help("Path to TLS certificate")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("tls-key-path")
                .long("tls-key-path")
                .help("Path to private key for TLS")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("aws-assume-role-arn")
                .long("aws-assume-role-arn")
                .help("AWS IAM ARN role to assume to fetch metrics")
                .value_name("ARN"),
        )
        .arg(
            Arg::new("aws-assume-role-session")
                .long("aws-assume-role-session")
                .help("AWS assume role session name [default: prometheus-rds-exporter]")
                .value_name("NAME"),
        )
        .arg(
            Arg::new("aws-regions")
                .long("aws-regions")
                .help("AWS regions to fetch metrics from [default: ap-northeast-2]")
                .value_name("REGIONS")
                .value_delimiter(',')
                .num_args(1..),
        );

    collect_flags::add_collect_flags(command)
}
