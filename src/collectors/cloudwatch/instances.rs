//! Batched retrieval of the most recent per-instance datapoints.
//!
//! One query per (instance, metric) pair is generated over the fixed metric
//! set, chunked to the GetMetricData cardinality cap and issued sequentially.
//! Each result id maps back to exactly one pair; the first value of the
//! newest-first scan wins, and an empty series leaves the field unset.

use super::{CloudWatchClient, MAX_QUERIES_PER_REQUEST, PERIOD_SECONDS, Statistics, query_window};
use anyhow::{Result, anyhow};
use aws_sdk_cloudwatch::types::{Dimension, Metric, MetricDataQuery, MetricStat};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// CloudWatch metrics collected for every instance.
pub const METRIC_NAMES: [&str; 24] = [
    "CPUUtilization",
    "DBLoad",
    "DBLoadCPU",
    "DBLoadNonCPU",
    "DatabaseConnections",
    "FreeStorageSpace",
    "FreeableMemory",
    "MaximumUsedTransactionIDs",
    "ReadIOPS",
    "ReadThroughput",
    "ReplicaLag",
    "ReplicationSlotDiskUsage",
    "SwapUsage",
    "TransactionLogsDiskUsage",
    "WriteIOPS",
    "WriteThroughput",
    "BufferCacheHitRatio",
    "Deadlocks",
    "Queries",
    "EngineUptime",
    "SumBinaryLogSize",
    "NumBinaryLogFiles",
    "AuroraBinlogReplicaLag",
    "BinLogDiskUsage",
];

/// Most recent datapoints for one instance. Absence is distinct from zero:
/// a field stays `None` when the upstream returned an empty series.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceMetrics {
    pub cpu_utilization: Option<f64>,
    pub db_load: Option<f64>,
    pub db_load_cpu: Option<f64>,
    pub db_load_non_cpu: Option<f64>,
    pub database_connections: Option<f64>,
    pub free_storage_space: Option<f64>,
    pub freeable_memory: Option<f64>,
    pub maximum_used_transaction_ids: Option<f64>,
    pub read_iops: Option<f64>,
    pub read_throughput: Option<f64>,
    pub replica_lag: Option<f64>,
    pub replication_slot_disk_usage: Option<f64>,
    pub swap_usage: Option<f64>,
    pub transaction_logs_disk_usage: Option<f64>,
    pub write_iops: Option<f64>,
    pub write_throughput: Option<f64>,
    pub buffer_cache_hit_ratio: Option<f64>,
    pub deadlocks: Option<f64>,
    pub queries: Option<f64>,
    pub engine_uptime: Option<f64>,
    pub sum_binary_log_size: Option<f64>,
    pub num_binary_log_files: Option<f64>,
    pub aurora_binlog_replica_lag: Option<f64>,
    pub bin_log_disk_usage: Option<f64>,
}

impl InstanceMetrics {
    /// Store a value under its CloudWatch metric name.
    ///
    /// # Errors
    ///
    /// Returns an error for a metric name outside [`METRIC_NAMES`]; this is a
    /// programmer error at dispatch and surfaces as a fetch failure.
    pub fn update(&mut self, field: &str, value: f64) -> Result<()> {
        match field {
            "CPUUtilization" => self.cpu_utilization = Some(value),
            "DBLoad" => self.db_load = Some(value),
            "DBLoadCPU" => self.db_load_cpu = Some(value),
            "DBLoadNonCPU" => self.db_load_non_cpu = Some(value),
            "DatabaseConnections" => self.database_connections = Some(value),
            "FreeStorageSpace" => self.free_storage_space = Some(value),
            "FreeableMemory" => self.freeable_memory = Some(value),
            "MaximumUsedTransactionIDs" => self.maximum_used_transaction_ids = Some(value),
            "ReadIOPS" => self.read_iops = Some(value),
            "ReadThroughput" => self.read_throughput = Some(value),
            "ReplicaLag" => self.replica_lag = Some(value),
            "ReplicationSlotDiskUsage" => self.replication_slot_disk_usage = Some(value),
            "SwapUsage" => self.swap_usage = Some(value),
            "TransactionLogsDiskUsage" => self.transaction_logs_disk_usage = Some(value),
            "WriteIOPS" => self.write_iops = Some(value),
            "WriteThroughput" => self.write_throughput = Some(value),
            "BufferCacheHitRatio" => self.buffer_cache_hit_ratio = Some(value),
            "Deadlocks" => self.deadlocks = Some(value),
            "Queries" => self.queries = Some(value),
            "EngineUptime" => self.engine_uptime = Some(value),
            "SumBinaryLogSize" => self.sum_binary_log_size = Some(value),
            "NumBinaryLogFiles" => self.num_binary_log_files = Some(value),
            "AuroraBinlogReplicaLag" => self.aurora_binlog_replica_lag = Some(value),
            "BinLogDiskUsage" => self.bin_log_disk_usage = Some(value),
            _ => return Err(anyhow!("can't process '{field}' metric: unknown metric")),
        }

        Ok(())
    }

    /// Read a value back by its CloudWatch metric name.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<f64> {
        match field {
            "CPUUtilization" => self.cpu_utilization,
            "DBLoad" => self.db_load,
            "DBLoadCPU" => self.db_load_cpu,
            "DBLoadNonCPU" => self.db_load_non_cpu,
            "DatabaseConnections" => self.database_connections,
            "FreeStorageSpace" => self.free_storage_space,
            "FreeableMemory" => self.freeable_memory,
            "MaximumUsedTransactionIDs" => self.maximum_used_transaction_ids,
            "ReadIOPS" => self.read_iops,
            "ReadThroughput" => self.read_throughput,
            "ReplicaLag" => self.replica_lag,
            "ReplicationSlotDiskUsage" => self.replication_slot_disk_usage,
            "SwapUsage" => self.swap_usage,
            "TransactionLogsDiskUsage" => self.transaction_logs_disk_usage,
            "WriteIOPS" => self.write_iops,
            "WriteThroughput" => self.write_throughput,
            "BufferCacheHitRatio" => self.buffer_cache_hit_ratio,
            "Deadlocks" => self.deadlocks,
            "Queries" => self.queries,
            "EngineUptime" => self.engine_uptime,
            "SumBinaryLogSize" => self.sum_binary_log_size,
            "NumBinaryLogFiles" => self.num_binary_log_files,
            "AuroraBinlogReplicaLag" => self.aurora_binlog_replica_lag,
            "BinLogDiskUsage" => self.bin_log_disk_usage,
            _ => None,
        }
    }
}

/// Result of one time-series fetch, keyed by instance identifier.
#[derive(Debug, Clone, Default)]
pub struct CloudWatchMetrics {
    pub instances: BTreeMap<String, InstanceMetrics>,
}

/// One generated query and the (instance, metric) pair it originated from.
struct MetricRequest {
    query_id: String,
    dbidentifier: String,
    metric_name: &'static str,
    query: MetricDataQuery,
}

fn query_for_instance(query_id: &str, metric_name: &'static str, dbidentifier: &str) -> MetricRequest {
    let query = MetricDataQuery::builder()
        .id(query_id)
        .metric_stat(
            MetricStat::builder()
                .metric(
                    Metric::builder()
                        .namespace("AWS/RDS")
                        .metric_name(metric_name)
                        .dimensions(
                            Dimension::builder()
                                .name("DBInstanceIdentifier")
                                .value(dbidentifier)
                                .build(),
                        )
                        .build(),
                )
                .stat("Average")
                .period(PERIOD_SECONDS)
                .build(),
        )
        .build();

    MetricRequest {
        query_id: query_id.to_string(),
        dbidentifier: dbidentifier.to_string(),
        metric_name,
        query,
    }
}

/// All queries for the given instances, in generation order.
fn queries_for_instances(dbidentifiers: &[String]) -> Vec<MetricRequest> {
    let mut requests = Vec::with_capacity(dbidentifiers.len() * METRIC_NAMES.len());

    for (index, dbidentifier) in dbidentifiers.iter().enumerate() {
        for metric_name in METRIC_NAMES {
            let query_id = format!("{}_{index}", metric_name.to_lowercase());
            requests.push(query_for_instance(&query_id, metric_name, dbidentifier));
        }
    }

    requests
}

pub struct RdsFetcher {
    client: Arc<dyn CloudWatchClient>,
    statistics: Statistics,
}

impl RdsFetcher {
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

    /// Fetch the most recent datapoints for every instance in `dbidentifiers`.
    ///
    /// # Errors
    ///
    /// Returns an error when a GetMetricData call fails or when a returned
    /// query id cannot be mapped back to its originating pair.
    pub async fn get_rds_instance_metrics(
        &mut self,
        dbidentifiers: &[String],
    ) -> Result<CloudWatchMetrics> {
        let requests = queries_for_instances(dbidentifiers);
        let lookup: HashMap<&str, &MetricRequest> = requests
            .iter()
            .map(|request| (request.query_id.as_str(), request))
            .collect();

        let (start_time, end_time) = query_window();
        let mut instances: BTreeMap<String, InstanceMetrics> = BTreeMap::new();

        for chunk in requests.chunks(MAX_QUERIES_PER_REQUEST) {
            let queries = chunk.iter().map(|request| request.query.clone()).collect();

            let output = self
                .client
                .get_metric_data(queries, start_time, end_time)
                .await?;
            self.statistics.cloudwatch_api_calls += 1;

            for result in output.metric_data_results() {
                let Some(id) = result.id() else {
                    continue;
                };

                let request = lookup
                    .get(id)
                    .ok_or_else(|| anyhow!("unexpected query id '{id}' in GetMetricData result"))?;

                match result.values().first() {
                    Some(value) => {
                        instances
                            .entry(request.dbidentifier.clone())
                            .or_default()
                            .update(request.metric_name, *value)?;
                    }
                    None => {
                        warn!(
                            dbidentifier = %request.dbidentifier,
                            metric = request.metric_name,
                            "cloudwatch returned no datapoint"
                        );
                    }
                }
            }
        }

        debug!(
            instances = instances.len(),
            api_calls = self.statistics.cloudwatch_api_calls,
            "cloudwatch instance metrics fetched"
        );

        Ok(CloudWatchMetrics { instances })
    }
}
