//! The descriptor set: every metric the collector may emit, with help text
//! and label ordering. The table is built once at compile time; `describe`
//! serves from it without touching any live fetch. Emission materializes a
//! scrape into per-request prometheus vecs built from the same table, so the
//! emitted identities are a subset of the described ones by construction.

use once_cell::sync::Lazy;
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, GaugeVec, Opts, Registry};
use std::collections::HashMap;
use std::sync::Mutex;

pub const INSTANCE_LABELS: &[&str] = &["aws_account_id", "aws_region", "dbidentifier"];
pub const INSTANCE_CLASS_LABELS: &[&str] = &["aws_account_id", "aws_region", "instance_class"];
pub const ACCOUNT_LABELS: &[&str] = &["aws_account_id", "aws_region"];

pub const INSTANCE_INFO_LABELS: &[&str] = &[
    "aws_account_id",
    "aws_region",
    "dbidentifier",
    "dbi_resource_id",
    "instance_class",
    "engine",
    "engine_version",
    "storage_type",
    "multi_az",
    "deletion_protection",
    "role",
    "source_dbidentifier",
    "pending_modified_values",
    "pending_maintenance",
    "performance_insights_enabled",
    "ca_certificate_identifier",
    "arn",
];

/// One metric identity: name, help and variable label ordering.
#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

/// CloudWatch series name, emitted gauge name and help text, one row per
/// collected series.
pub const TIMESERIES: &[(&str, &str, &str)] = &[
    ("CPUUtilization", "rds_cpu_usage_percent_average", "Instance CPU used"),
    ("DBLoad", "rds_dbload_average", "Number of active sessions for the DB engine"),
    ("DBLoadCPU", "rds_dbload_cpu_average", "Number of active sessions where the wait event type is CPU"),
    ("DBLoadNonCPU", "rds_dbload_noncpu_average", "Number of active sessions where the wait event type is not CPU"),
    ("DatabaseConnections", "rds_database_connections_average", "The number of client network connections to the database instance"),
    ("FreeStorageSpace", "rds_free_storage_bytes", "Free storage on the instance"),
    ("FreeableMemory", "rds_freeable_memory_bytes", "Amount of available random access memory. For MariaDB, MySQL, Oracle, and PostgreSQL DB instances, this metric reports the value of the MemAvailable field of /proc/meminfo"),
    ("MaximumUsedTransactionIDs", "rds_maximum_used_transaction_ids_average", "Maximum transaction IDs that have been used. Applies to only PostgreSQL"),
    ("ReadIOPS", "rds_read_iops_average", "Average number of disk read I/O operations per second"),
    ("ReadThroughput", "rds_read_throughput_bytes", "Average number of bytes read from disk per second"),
    ("ReplicaLag", "rds_replica_lag_seconds", "For read replica configurations, the amount of time a read replica DB instance lags behind the source DB instance. Applies to MariaDB, Microsoft SQL Server, MySQL, Oracle, and PostgreSQL read replicas"),
    ("ReplicationSlotDiskUsage", "rds_replication_slot_disk_usage_bytes", "Disk space used by replication slot files. Applies to PostgreSQL"),
    ("SwapUsage", "rds_swap_usage_bytes", "Amount of swap space used on the DB instance. This metric is not available for SQL Server"),
    ("TransactionLogsDiskUsage", "rds_transaction_logs_disk_usage_bytes", "Disk space used by transaction logs (only on PostgreSQL)"),
    ("WriteIOPS", "rds_write_iops_average", "Average number of disk write I/O operations per second"),
    ("WriteThroughput", "rds_write_throughput_bytes", "Average number of bytes written to disk per second"),
    ("BufferCacheHitRatio", "rds_buffer_cache_hit_ratio", "The percentage of requests that are served by the buffer cache"),
    ("Deadlocks", "rds_deadlocks", "The number of deadlocks in the database"),
    ("Queries", "rds_queries", "The average number of queries executed per second"),
    ("EngineUptime", "rds_engine_uptime_seconds", "The amount of time that the RDS instance has been running"),
    ("SumBinaryLogSize", "rds_sum_binary_log_size_bytes", "The total size of all binary logs on the master"),
    ("NumBinaryLogFiles", "rds_num_binary_log_files", "The number of binary log files on the master"),
    ("AuroraBinlogReplicaLag", "rds_aurora_binlog_replica_lag_seconds", "The amount of time a replica Aurora DB cluster lags behind the source DB cluster"),
    ("BinLogDiskUsage", "rds_binlog_disk_usage_bytes", "Binary log disk usage"),
];

const BASE_DESCRIPTORS: &[MetricSpec] = &[
    MetricSpec {
        name: "rds_exporter_build_info",
        help: "A metric with constant '1' value labeled by version from which exporter was built",
        labels: &["version", "commit_sha", "build_date", "aws_region"],
    },
    MetricSpec {
        name: "rds_exporter_errors_total",
        help: "Total number of errors encountered by the exporter",
        labels: &["aws_region"],
    },
    MetricSpec {
        name: "up",
        help: "Was the last scrape of RDS successful",
        labels: &["aws_region"],
    },
    MetricSpec {
        name: "rds_api_call_total",
        help: "Number of call to AWS API",
        labels: &["aws_account_id", "aws_region", "api"],
    },
    MetricSpec {
        name: "rds_instance_info",
        help: "RDS instance information",
        labels: INSTANCE_INFO_LABELS,
    },
    MetricSpec {
        name: "rds_instance_status",
        help: "Instance status code (1: available, 0: unknown; see documentation for the full table)",
        labels: INSTANCE_LABELS,
    },
    MetricSpec {
        name: "rds_instance_age_seconds",
        help: "Time since instance creation",
        labels: INSTANCE_LABELS,
    },
    MetricSpec {
        name: "rds_allocated_storage_bytes",
        help: "Allocated storage",
        labels: INSTANCE_LABELS,
    },
    MetricSpec {
        name: "rds_max_allocated_storage_bytes",
        help: "Upper limit to which Amazon RDS can automatically scale the storage of the DB instance",
        labels: INSTANCE_LABELS,
    },
    MetricSpec {
        name: "rds_max_disk_iops_average",
        help: "Max IOPS for the instance",
        labels: INSTANCE_LABELS,
    },
    MetricSpec {
        name: "rds_max_storage_throughput_bytes",
        help: "Max storage throughput",
        labels: INSTANCE_LABELS,
    },
    MetricSpec {
        name: "rds_backup_retention_period_seconds",
        help: "Automatic DB snapshots retention period",
        labels: INSTANCE_LABELS,
    },
    MetricSpec {
        name: "rds_certificate_expiry_timestamp_seconds",
        help: "Timestamp of the expiration of the instance certificate",
        labels: INSTANCE_LABELS,
    },
    MetricSpec {
        name: "rds_instance_log_files_size_bytes",
        help: "Total of log files on the instance",
        labels: INSTANCE_LABELS,
    },
    MetricSpec {
        name: "rds_instance_tags",
        help: "AWS tags attached to the instance",
        labels: INSTANCE_LABELS,
    },
    MetricSpec {
        name: "rds_instance_vcpu_average",
        help: "Total vCPU for this instance class",
        labels: INSTANCE_CLASS_LABELS,
    },
    MetricSpec {
        name: "rds_instance_memory_bytes",
        help: "Instance class memory",
        labels: INSTANCE_CLASS_LABELS,
    },
    MetricSpec {
        name: "rds_instance_max_iops_average",
        help: "Maximum IOPS of underlying EC2 instance class",
        labels: INSTANCE_CLASS_LABELS,
    },
    MetricSpec {
        name: "rds_instance_max_throughput_bytes",
        help: "Maximum throughput of underlying EC2 instance class",
        labels: INSTANCE_CLASS_LABELS,
    },
    MetricSpec {
        name: "rds_quota_max_dbinstances_average",
        help: "Maximum number of RDS instances allowed in the AWS account",
        labels: ACCOUNT_LABELS,
    },
    MetricSpec {
        name: "rds_quota_total_storage_bytes",
        help: "Maximum total storage for all DB instances",
        labels: ACCOUNT_LABELS,
    },
    MetricSpec {
        name: "rds_quota_maximum_db_instance_snapshots_average",
        help: "Maximum number of manual DB instance snapshots",
        labels: ACCOUNT_LABELS,
    },
    MetricSpec {
        name: "rds_usage_allocated_storage_bytes",
        help: "Total storage used by AWS RDS instances",
        labels: ACCOUNT_LABELS,
    },
    MetricSpec {
        name: "rds_usage_db_instances_average",
        help: "AWS RDS instance count",
        labels: ACCOUNT_LABELS,
    },
    MetricSpec {
        name: "rds_usage_manual_snapshots_average",
        help: "Manual snapshots count",
        labels: ACCOUNT_LABELS,
    },
];

/// The full descriptor set, base metrics plus the 24 time-series gauges.
pub static DESCRIPTORS: Lazy<Vec<MetricSpec>> = Lazy::new(|| {
    let mut specs = BASE_DESCRIPTORS.to_vec();
    specs.extend(TIMESERIES.iter().map(|(_, name, help)| MetricSpec {
        name,
        help,
        labels: INSTANCE_LABELS,
    }));
    specs
});

fn spec(name: &str) -> &'static MetricSpec {
    #[allow(clippy::expect_used)]
    DESCRIPTORS
        .iter()
        .find(|spec| spec.name == name)
        .expect("metric spec")
}

fn gauge(name: &str) -> GaugeVec {
    let spec = spec(name);
    #[allow(clippy::expect_used)]
    GaugeVec::new(Opts::new(spec.name, spec.help), spec.labels).expect("valid metric name")
}

fn counter(name: &str) -> CounterVec {
    let spec = spec(name);
    #[allow(clippy::expect_used)]
    CounterVec::new(Opts::new(spec.name, spec.help), spec.labels).expect("valid metric name")
}

/// Per-request emission vecs, one child per labeled sample set during the
/// scrape. Families with no children never reach the exposition.
pub struct ScrapeVecs {
    registry: Registry,

    pub build_info: GaugeVec,
    pub errors_total: CounterVec,
    pub up: GaugeVec,
    pub api_call_total: CounterVec,

    pub information: GaugeVec,
    pub status: GaugeVec,
    pub age: GaugeVec,
    pub allocated_storage: GaugeVec,
    pub max_allocated_storage: GaugeVec,
    pub max_iops: GaugeVec,
    pub storage_throughput: GaugeVec,
    pub backup_retention_period: GaugeVec,
    pub certificate_valid_till: GaugeVec,
    pub log_files_size: GaugeVec,

    pub instance_vcpu: GaugeVec,
    pub instance_memory: GaugeVec,
    pub instance_max_iops: GaugeVec,
    pub instance_max_throughput: GaugeVec,

    pub quota_db_instances: GaugeVec,
    pub quota_total_storage: GaugeVec,
    pub quota_max_snapshots: GaugeVec,
    pub usage_allocated_storage: GaugeVec,
    pub usage_db_instances: GaugeVec,
    pub usage_manual_snapshots: GaugeVec,

    /// CloudWatch series name -> gauge.
    timeseries: HashMap<&'static str, GaugeVec>,

    /// Dynamic `rds_instance_tags` vecs, one per distinct label-name set.
    tags: Mutex<HashMap<Vec<String>, GaugeVec>>,
}

impl Default for ScrapeVecs {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrapeVecs {
    /// Build the emission vecs for one scrape and register them.
    ///
    /// # Panics
    ///
    /// Panics if a statically-defined metric cannot be registered (should
    /// never happen).
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let registry = Registry::new();

        let vecs = Self {
            build_info: gauge("rds_exporter_build_info"),
            errors_total: counter("rds_exporter_errors_total"),
            up: gauge("up"),
            api_call_total: counter("rds_api_call_total"),
            information: gauge("rds_instance_info"),
            status: gauge("rds_instance_status"),
            age: gauge("rds_instance_age_seconds"),
            allocated_storage: gauge("rds_allocated_storage_bytes"),
            max_allocated_storage: gauge("rds_max_allocated_storage_bytes"),
            max_iops: gauge("rds_max_disk_iops_average"),
            storage_throughput: gauge("rds_max_storage_throughput_bytes"),
            backup_retention_period: gauge("rds_backup_retention_period_seconds"),
            certificate_valid_till: gauge("rds_certificate_expiry_timestamp_seconds"),
            log_files_size: gauge("rds_instance_log_files_size_bytes"),
            instance_vcpu: gauge("rds_instance_vcpu_average"),
            instance_memory: gauge("rds_instance_memory_bytes"),
            instance_max_iops: gauge("rds_instance_max_iops_average"),
            instance_max_throughput: gauge("rds_instance_max_throughput_bytes"),
            quota_db_instances: gauge("rds_quota_max_dbinstances_average"),
            quota_total_storage: gauge("rds_quota_total_storage_bytes"),
            quota_max_snapshots: gauge("rds_quota_maximum_db_instance_snapshots_average"),
            usage_allocated_storage: gauge("rds_usage_allocated_storage_bytes"),
            usage_db_instances: gauge("rds_usage_db_instances_average"),
            usage_manual_snapshots: gauge("rds_usage_manual_snapshots_average"),
            timeseries: TIMESERIES
                .iter()
                .map(|(series, name, _)| (*series, gauge(name)))
                .collect(),
            tags: Mutex::new(HashMap::new()),
            registry,
        };

        for vec in [
            &vecs.build_info,
            &vecs.up,
            &vecs.information,
            &vecs.status,
            &vecs.age,
            &vecs.allocated_storage,
            &vecs.max_allocated_storage,
            &vecs.max_iops,
            &vecs.storage_throughput,
            &vecs.backup_retention_period,
            &vecs.certificate_valid_till,
            &vecs.log_files_size,
            &vecs.instance_vcpu,
            &vecs.instance_memory,
            &vecs.instance_max_iops,
            &vecs.instance_max_throughput,
            &vecs.quota_db_instances,
            &vecs.quota_total_storage,
            &vecs.quota_max_snapshots,
            &vecs.usage_allocated_storage,
            &vecs.usage_db_instances,
            &vecs.usage_manual_snapshots,
        ] {
            vecs.registry
                .register(Box::new(vec.clone()))
                .expect("valid metric registration");
        }

        vecs.registry
            .register(Box::new(vecs.errors_total.clone()))
            .expect("valid metric registration");
        vecs.registry
            .register(Box::new(vecs.api_call_total.clone()))
            .expect("valid metric registration");

        for vec in vecs.timeseries.values() {
            vecs.registry
                .register(Box::new(vec.clone()))
                .expect("valid metric registration");
        }

        vecs
    }

    /// Gauge for a CloudWatch series name.
    #[must_use]
    pub fn timeseries_gauge(&self, series: &str) -> Option<&GaugeVec> {
        self.timeseries.get(series)
    }

    /// Gauge for one `rds_instance_tags` label-name set; created and
    /// registered on first use within the scrape.
    ///
    /// # Panics
    ///
    /// Panics if the sanitized label set cannot form a valid metric (should
    /// never happen once keys are sanitized).
    #[allow(clippy::expect_used)]
    pub fn tags_gauge(&self, label_names: &[String]) -> GaugeVec {
        let mut tags = match self.tags.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(vec) = tags.get(label_names) {
            return vec.clone();
        }

        let spec = spec("rds_instance_tags");
        let names: Vec<&str> = label_names.iter().map(String::as_str).collect();
        let vec = GaugeVec::new(Opts::new(spec.name, spec.help), &names)
            .expect("valid sanitized tag labels");

        self.registry
            .register(Box::new(vec.clone()))
            .expect("valid tag metric registration");

        tags.insert(label_names.to_vec(), vec.clone());
        vec
    }

    /// Families with at least one sample, merged by name across vecs. The
    /// text encoder rejects families without samples, so childless vecs are
    /// dropped here.
    #[must_use]
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry
            .gather()
            .into_iter()
            .filter(|family| !family.get_metric().is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_set_is_deterministic() {
        let first: Vec<&str> = DESCRIPTORS.iter().map(|spec| spec.name).collect();
        let second: Vec<&str> = DESCRIPTORS.iter().map(|spec| spec.name).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), BASE_DESCRIPTORS.len() + TIMESERIES.len());
    }

    #[test]
    fn test_descriptor_names_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for spec in DESCRIPTORS.iter() {
            assert!(seen.insert(spec.name), "duplicate descriptor {}", spec.name);
        }
    }

    #[test]
    fn test_every_timeseries_has_a_gauge() {
        let vecs = ScrapeVecs::new();
        for (series, _, _) in TIMESERIES {
            assert!(
                vecs.timeseries_gauge(series).is_some(),
                "missing gauge for {series}"
            );
        }
    }

    #[test]
    fn test_timeseries_matches_cloudwatch_metric_set() {
        let described: std::collections::HashSet<&str> =
            TIMESERIES.iter().map(|(series, _, _)| *series).collect();
        let collected: std::collections::HashSet<&str> =
            crate::collectors::cloudwatch::METRIC_NAMES.iter().copied().collect();

        assert_eq!(described, collected);
    }

    #[test]
    fn test_tags_gauge_is_cached_per_label_set() {
        let vecs = ScrapeVecs::new();
        let labels = vec![
            "aws_account_id".to_string(),
            "aws_region".to_string(),
            "dbidentifier".to_string(),
            "tag_environment".to_string(),
        ];

        let first = vecs.tags_gauge(&labels);
        first
            .with_label_values(&["123", "eu-west-1", "db-a", "production"])
            .set(0.0);
        let second = vecs.tags_gauge(&labels);
        second
            .with_label_values(&["123", "eu-west-1", "db-b", "staging"])
            .set(0.0);

        let families = vecs.gather();
        let tags_family = families
            .iter()
            .find(|family| family.get_name() == "rds_instance_tags")
            .expect("tags family");
        assert_eq!(tags_family.get_metric().len(), 2);
    }
}
