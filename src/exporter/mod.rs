//! HTTP layer: per-region AWS client construction, the axum router exposing
//! the metrics path and a liveness probe, and the text exposition built from
//! the region collectors on every scrape.

use crate::collectors::exporter::{Configuration, RegionCollector, ScrapeVecs};
use crate::config::Settings;
use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region, SdkConfig};
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum_server::tls_rustls::RustlsConfig;
use futures::stream::{FuturesUnordered, StreamExt};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

struct AppState {
    collectors: Vec<Arc<RegionCollector>>,
}

/// One collector per configured region, with already-resolved credentials
/// and account information.
///
/// # Errors
///
/// Returns an error when the AWS configuration cannot be initialized or the
/// account identity cannot be resolved for a region.
pub async fn build_region_collectors(settings: &Settings) -> Result<Vec<Arc<RegionCollector>>> {
    let configuration = Configuration {
        collect_instance_metrics: settings.collect_instance_metrics,
        collect_instance_tags: settings.collect_instance_tags,
        collect_instance_types: settings.collect_instance_types,
        collect_logs_size: settings.collect_logs_size,
        collect_maintenances: settings.collect_maintenances,
        collect_quotas: settings.collect_quotas,
        collect_usages: settings.collect_usages,
    };

    let mut collectors = Vec::with_capacity(settings.aws_regions.len());

    for region in &settings.aws_regions {
        info!(region = %region, "initializing AWS configuration");

        let sdk_config = aws_configuration(settings, region).await;
        let (aws_account_id, aws_region) = aws_session_information(&sdk_config, region).await?;

        info!(region = %aws_region, account_id = %aws_account_id, "AWS configuration initialized");

        let collector = RegionCollector::new(
            configuration,
            aws_account_id,
            aws_region,
            Arc::new(aws_sdk_rds::Client::new(&sdk_config)),
            Arc::new(aws_sdk_ec2::Client::new(&sdk_config)),
            Arc::new(aws_sdk_cloudwatch::Client::new(&sdk_config)),
            Arc::new(aws_sdk_servicequotas::Client::new(&sdk_config)),
        );

        collectors.push(Arc::new(collector));
    }

    Ok(collectors)
}

async fn aws_configuration(settings: &Settings, region: &str) -> SdkConfig {
    let loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));

    if settings.aws_assume_role_arn.is_empty() {
        loader.load().await
    } else {
        let provider =
            aws_config::sts::AssumeRoleProvider::builder(settings.aws_assume_role_arn.clone())
                .session_name(settings.aws_assume_role_session.clone())
                .region(Region::new(region.to_string()))
                .build()
                .await;

        loader.credentials_provider(provider).load().await
    }
}

async fn aws_session_information(
    sdk_config: &SdkConfig,
    fallback_region: &str,
) -> Result<(String, String)> {
    let sts_client = aws_sdk_sts::Client::new(sdk_config);
    let identity = sts_client
        .get_caller_identity()
        .send()
        .await
        .context("can't identify AWS account")?;

    let aws_account_id = identity
        .account()
        .context("AWS caller identity carries no account id")?
        .to_string();

    let aws_region = sdk_config
        .region()
        .map_or_else(|| fallback_region.to_string(), ToString::to_string);

    Ok((aws_account_id, aws_region))
}

/// Serve the metrics endpoint until shutdown; TLS when both certificate and
/// key paths are configured.
///
/// # Errors
///
/// Returns an error when the listen address is invalid, the TLS material
/// cannot be loaded or the server stops unexpectedly.
pub async fn serve(settings: Settings, collectors: Vec<Arc<RegionCollector>>) -> Result<()> {
    let state = Arc::new(AppState { collectors });

    let app = Router::new()
        .route(&settings.metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let address = parse_listen_address(&settings.listen_address)?;
    let with_tls = !settings.tls_cert_path.is_empty() && !settings.tls_key_path.is_empty();

    info!(address = %address, tls = with_tls, path = %settings.metrics_path, "starting web server");

    if with_tls {
        let tls_config =
            RustlsConfig::from_pem_file(&settings.tls_cert_path, &settings.tls_key_path)
                .await
                .context("can't load TLS certificate or key")?;

        axum_server::bind_rustls(address, tls_config)
            .serve(app.into_make_service())
            .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(address).await?;
        axum::serve(listener, app).await?;
    }

    Ok(())
}

/// One scrape: every region collector runs concurrently against the same
/// per-request emission vecs, then the merged families are encoded. Always
/// answers 200 with whatever samples could be produced.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let vecs = ScrapeVecs::new();

    let mut scrapes = FuturesUnordered::new();
    for collector in &state.collectors {
        scrapes.push(collector.collect(&vecs));
    }
    while scrapes.next().await.is_some() {}

    let families = vecs.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&families, &mut buffer) {
        error!(reason = %err, "can't encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}

/// Accept Go-style `:9043` listen addresses next to full socket addresses.
fn parse_listen_address(address: &str) -> Result<SocketAddr> {
    let normalized = if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    };

    normalized
        .parse()
        .with_context(|| format!("invalid listen address '{address}'"))
}
