//! CloudWatch fetchers: batched per-instance time-series retrieval and the
//! account-wide usage counters published in the `AWS/Usage` namespace.

mod instances;
mod usage;

pub use instances::{CloudWatchMetrics, InstanceMetrics, METRIC_NAMES, RdsFetcher};
pub use usage::{UsageFetcher, UsageMetrics};

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_cloudwatch::operation::get_metric_data::GetMetricDataOutput;
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{MetricDataQuery, ScanBy};
use std::time::{SystemTime, UNIX_EPOCH};

/// Hard cap imposed by the GetMetricData API.
pub const MAX_QUERIES_PER_REQUEST: usize = 500;

/// Query granularity, in seconds.
pub const PERIOD_SECONDS: i32 = 60;

/// Width of the query window: the most recent datapoint within the last
/// three minutes is used.
pub const WINDOW_SECONDS: i64 = 180;

/// Narrow client surface needed by the fetchers. Implemented by the real SDK
/// client and by test mocks.
#[async_trait]
pub trait CloudWatchClient: Send + Sync {
    async fn get_metric_data(
        &self,
        queries: Vec<MetricDataQuery>,
        start_time: DateTime,
        end_time: DateTime,
    ) -> Result<GetMetricDataOutput>;
}

#[async_trait]
impl CloudWatchClient for aws_sdk_cloudwatch::Client {
    async fn get_metric_data(
        &self,
        queries: Vec<MetricDataQuery>,
        start_time: DateTime,
        end_time: DateTime,
    ) -> Result<GetMetricDataOutput> {
        Ok(self
            .get_metric_data()
            .set_metric_data_queries(Some(queries))
            .start_time(start_time)
            .end_time(end_time)
            .scan_by(ScanBy::TimestampDescending)
            .send()
            .await?)
    }
}

/// `[now - 3m, now]` as SDK timestamps.
pub(crate) fn query_window() -> (DateTime, DateTime) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    (
        DateTime::from_secs(now - WINDOW_SECONDS),
        DateTime::from_secs(now),
    )
}

/// Per-fetch API call accounting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Statistics {
    pub cloudwatch_api_calls: u64,
}
