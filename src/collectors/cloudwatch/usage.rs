//! Account-wide RDS usage counters from the `AWS/Usage` namespace, fetched
//! as a single batched GetMetricData call.

use super::{CloudWatchClient, Statistics, query_window};
use crate::collectors::util::gib_to_bytes_f64;
use anyhow::Result;
use aws_sdk_cloudwatch::types::{Dimension, Metric, MetricDataQuery, MetricStat};
use std::sync::Arc;
use tracing::{debug, warn};

const USAGE_RESOURCES: [(&str, &str); 3] = [
    ("usage_allocatedstorage", "AllocatedStorage"),
    ("usage_dbinstances", "DBInstances"),
    ("usage_manualsnapshots", "ManualSnapshots"),
];

/// Current account-wide consumption counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageMetrics {
    pub allocated_storage: f64,
    pub db_instances: f64,
    pub manual_snapshots: f64,
}

fn usage_query(query_id: &str, resource: &str) -> MetricDataQuery {
    MetricDataQuery::builder()
        .id(query_id)
        .metric_stat(
            MetricStat::builder()
                .metric(
                    Metric::builder()
                        .namespace("AWS/Usage")
                        .metric_name("ResourceCount")
                        .dimensions(Dimension::builder().name("Type").value("Resource").build())
                        .dimensions(Dimension::builder().name("Resource").value(resource).build())
                        .dimensions(Dimension::builder().name("Service").value("RDS").build())
                        .dimensions(Dimension::builder().name("Class").value("None").build())
                        .build(),
                )
                .stat("Average")
                .period(super::PERIOD_SECONDS)
                .build(),
        )
        .build()
}

pub struct UsageFetcher {
    client: Arc<dyn CloudWatchClient>,
    statistics: Statistics,
}

impl UsageFetcher {
    #[must_use]
    pub fn new(client: Arc<dyn CloudWatchClient>) -> Self {
        Self {
            client,
            statistics: Statistics::default(),
        }
    }

    #[must_use]
    pub const fn statistics(&self) -> Statistics {
        self.statistics
    }

    /// Fetch the account usage counters.
    ///
    /// # Errors
    ///
    /// Returns an error when the GetMetricData call fails.
    pub async fn get_usage_metrics(&mut self) -> Result<UsageMetrics> {
        let queries = USAGE_RESOURCES
            .iter()
            .map(|(query_id, resource)| usage_query(query_id, resource))
            .collect();

        let (start_time, end_time) = query_window();

        let output = self
            .client
            .get_metric_data(queries, start_time, end_time)
            .await?;
        self.statistics.cloudwatch_api_calls += 1;

        let mut metrics = UsageMetrics::default();

        for result in output.metric_data_results() {
            let Some(value) = result.values().first().copied() else {
                warn!(id = result.id().unwrap_or_default(), "usage value is empty");
                continue;
            };

            match result.id() {
                // Upstream reports allocated storage in GiB.
                Some("usage_allocatedstorage") => {
                    metrics.allocated_storage = gib_to_bytes_f64(value);
                }
                Some("usage_dbinstances") => metrics.db_instances = value,
                Some("usage_manualsnapshots") => metrics.manual_snapshots = value,
                other => {
                    warn!(id = other.unwrap_or_default(), "unexpected usage query id");
                }
            }
        }

        debug!(?metrics, "usage metrics fetched");

        Ok(metrics)
    }
}
