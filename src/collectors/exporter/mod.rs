//! Per-region collector: fans out the four fetchers on every scrape, joins
//! their results and materializes the metric families. A partial upstream
//! failure degrades the scrape (error counter + log), it never aborts it;
//! only the inventory fetch is fatal and turns `up` down.

mod descriptors;

pub use descriptors::{DESCRIPTORS, MetricSpec, ScrapeVecs, TIMESERIES};

use crate::build_info;
use crate::collectors::cloudwatch::{
    self, CloudWatchClient, CloudWatchMetrics, UsageFetcher, UsageMetrics,
};
use crate::collectors::ec2::{self, Ec2Client, Ec2Fetcher};
use crate::collectors::rds::{self, RdsClient, RdsInstance};
use crate::collectors::servicequotas::{QuotaFetcher, QuotaMetrics, ServiceQuotasClient};
use crate::collectors::util::clear_prometheus_label;
use futures::future::OptionFuture;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

pub const EXPORTER_UP_STATUS_CODE: f64 = 1.0;
pub const EXPORTER_DOWN_STATUS_CODE: f64 = 0.0;

/// Which subtasks run on a scrape. Set once at startup.
#[derive(Debug, Clone, Copy, Default)]
pub struct Configuration {
    pub collect_instance_metrics: bool,
    pub collect_instance_tags: bool,
    pub collect_instance_types: bool,
    pub collect_logs_size: bool,
    pub collect_maintenances: bool,
    pub collect_quotas: bool,
    pub collect_usages: bool,
}

impl Configuration {
    /// Everything enabled, the default of the CLI flags.
    #[must_use]
    pub const fn all() -> Self {
        Self {
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

/// Monotonic accumulators, the only state surviving a scrape.
#[derive(Debug, Default)]
struct Counters {
    errors: AtomicU64,
    rds_api_calls: AtomicU64,
    ec2_api_calls: AtomicU64,
    cloudwatch_api_calls: AtomicU64,
    usage_api_calls: AtomicU64,
    servicequotas_api_calls: AtomicU64,
}

/// Point-in-time copy of the counters, taken after the join barrier.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterSnapshot {
    pub errors: u64,
    pub rds_api_calls: u64,
    pub ec2_api_calls: u64,
    pub cloudwatch_api_calls: u64,
    pub usage_api_calls: u64,
    pub servicequotas_api_calls: u64,
}

/// Per-scrape result container: one slot per subtask, discarded at the end
/// of the scrape.
#[derive(Default)]
struct ScrapeMetrics {
    rds: Option<rds::Metrics>,
    ec2: Option<ec2::Metrics>,
    cloudwatch_instances: Option<CloudWatchMetrics>,
    cloudwatch_usage: Option<UsageMetrics>,
    service_quota: Option<QuotaMetrics>,
}

pub struct RegionCollector {
    configuration: Configuration,
    aws_account_id: String,
    aws_region: String,
    counters: Counters,

    rds_client: Arc<dyn RdsClient>,
    ec2_client: Arc<dyn Ec2Client>,
    cloudwatch_client: Arc<dyn CloudWatchClient>,
    servicequotas_client: Arc<dyn ServiceQuotasClient>,
}

impl RegionCollector {
    #[must_use]
    pub fn new(
        configuration: Configuration,
        aws_account_id: String,
        aws_region: String,
        rds_client: Arc<dyn RdsClient>,
        ec2_client: Arc<dyn Ec2Client>,
        cloudwatch_client: Arc<dyn CloudWatchClient>,
        servicequotas_client: Arc<dyn ServiceQuotasClient>,
    ) -> Self {
        Self {
            configuration,
            aws_account_id,
            aws_region,
            counters: Counters::default(),
            rds_client,
            ec2_client,
            cloudwatch_client,
            servicequotas_client,
        }
    }

    #[must_use]
    pub fn aws_region(&self) -> &str {
        &self.aws_region
    }

    /// Static descriptors of every metric this collector may emit;
    /// deterministic and independent of any live fetch.
    #[must_use]
    pub fn describe(&self) -> &'static [MetricSpec] {
        DESCRIPTORS.as_slice()
    }

    /// Counter values as visible after the last completed scrape.
    #[must_use]
    pub fn counters(&self) -> CounterSnapshot {
        CounterSnapshot {
            errors: self.counters.errors.load(Ordering::Relaxed),
            rds_api_calls: self.counters.rds_api_calls.load(Ordering::Relaxed),
            ec2_api_calls: self.counters.ec2_api_calls.load(Ordering::Relaxed),
            cloudwatch_api_calls: self.counters.cloudwatch_api_calls.load(Ordering::Relaxed),
            usage_api_calls: self.counters.usage_api_calls.load(Ordering::Relaxed),
            servicequotas_api_calls: self.counters.servicequotas_api_calls.load(Ordering::Relaxed),
        }
    }

    /// Execute one scrape and materialize its samples into `vecs`.
    ///
    /// Never fails: a degraded upstream bumps the error counter and leaves
    /// the affected samples unemitted, a failed inventory turns `up` down.
    /// The subtasks are plain futures joined below, so dropping the scrape
    /// future cancels every in-flight upstream call.
    pub async fn collect(&self, vecs: &ScrapeVecs) {
        debug!(region = %self.aws_region, "received scrape request");

        // Quota and account-usage fetches do not depend on the inventory and
        // start right away.
        let quotas_future: OptionFuture<_> = self
            .configuration
            .collect_quotas
            .then(|| async {
                let mut fetcher = QuotaFetcher::new(Arc::clone(&self.servicequotas_client));
                let metrics = fetcher.get_rds_quotas().await;
                (metrics, fetcher.statistics())
            })
            .into();

        let usage_future: OptionFuture<_> = self
            .configuration
            .collect_usages
            .then(|| async {
                let mut fetcher = UsageFetcher::new(Arc::clone(&self.cloudwatch_client));
                let metrics = fetcher.get_usage_metrics().await;
                (metrics, fetcher.statistics())
            })
            .into();

        // The inventory seeds the instance-level subtasks; its own failure is
        // the only fatal one.
        let instances_future = async {
            debug!(region = %self.aws_region, "get RDS instances");

            let mut fetcher = rds::RdsFetcher::new(
                Arc::clone(&self.rds_client),
                rds::Configuration {
                    collect_logs_size: self.configuration.collect_logs_size,
                    collect_maintenances: self.configuration.collect_maintenances,
                },
            );
            let inventory = fetcher.get_instances_metrics().await;
            let statistics = fetcher.statistics();

            let rds_metrics = match inventory {
                Ok(metrics) => metrics,
                Err(err) => return (Err(err), statistics, None, None),
            };

            let (instance_identifiers, instance_classes) =
                unique_identifiers_and_classes(&rds_metrics.instances);

            let cloudwatch_future: OptionFuture<_> = self
                .configuration
                .collect_instance_metrics
                .then(|| async {
                    let mut fetcher = cloudwatch::RdsFetcher::new(Arc::clone(&self.cloudwatch_client));
                    let result = fetcher.get_rds_instance_metrics(&instance_identifiers).await;
                    (result, fetcher.statistics())
                })
                .into();

            let ec2_future: OptionFuture<_> = (self.configuration.collect_instance_types
                && !instance_classes.is_empty())
            .then(|| async {
                let mut fetcher = Ec2Fetcher::new(Arc::clone(&self.ec2_client));
                let result = fetcher
                    .get_db_instance_type_information(&instance_classes)
                    .await;
                (result, fetcher.statistics())
            })
            .into();

            let (cloudwatch, ec2) = tokio::join!(cloudwatch_future, ec2_future);

            (Ok(rds_metrics), statistics, cloudwatch, ec2)
        };

        // Join barrier: every launched subtask finishes before any emission;
        // each writes its result into its own slot.
        let ((inventory, rds_statistics, cloudwatch, ec2), quotas, usage) =
            tokio::join!(instances_future, quotas_future, usage_future);

        self.counters
            .rds_api_calls
            .fetch_add(rds_statistics.rds_api_calls, Ordering::Relaxed);
        self.counters
            .errors
            .fetch_add(rds_statistics.errors, Ordering::Relaxed);

        let service_quota = quotas.map(|(metrics, statistics)| {
            self.counters
                .servicequotas_api_calls
                .fetch_add(statistics.servicequotas_api_calls, Ordering::Relaxed);
            self.counters
                .errors
                .fetch_add(statistics.errors, Ordering::Relaxed);
            metrics
        });

        let cloudwatch_usage = usage.and_then(|(result, statistics)| {
            self.counters
                .usage_api_calls
                .fetch_add(statistics.cloudwatch_api_calls, Ordering::Relaxed);
            self.degrade_on_error(result, "can't fetch usage metrics")
        });

        let cloudwatch_instances = cloudwatch.and_then(|(result, statistics)| {
            self.counters
                .cloudwatch_api_calls
                .fetch_add(statistics.cloudwatch_api_calls, Ordering::Relaxed);
            self.degrade_on_error(result, "can't fetch cloudwatch metrics")
        });

        let ec2_metrics = ec2.and_then(|(result, statistics)| {
            self.counters
                .ec2_api_calls
                .fetch_add(statistics.ec2_api_calls, Ordering::Relaxed);
            self.degrade_on_error(result, "can't fetch EC2 metrics")
        });

        let rds_metrics = match inventory {
            Ok(metrics) => metrics,
            Err(err) => {
                // Account-level results are already accounted for above and
                // discarded with the rest of the scrape.
                error!(region = %self.aws_region, reason = %err, "can't fetch RDS instances");
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                self.emit_base(vecs, EXPORTER_DOWN_STATUS_CODE);
                return;
            }
        };

        let metrics = ScrapeMetrics {
            rds: Some(rds_metrics),
            ec2: ec2_metrics,
            cloudwatch_instances,
            cloudwatch_usage,
            service_quota,
        };

        self.emit_base(vecs, EXPORTER_UP_STATUS_CODE);
        self.emit(vecs, &metrics);
    }

    /// A failed secondary fetch degrades the scrape: count it, log it, keep
    /// the affected slot empty.
    fn degrade_on_error<T>(&self, result: anyhow::Result<T>, message: &'static str) -> Option<T> {
        match result {
            Ok(metrics) => Some(metrics),
            Err(err) => {
                error!(region = %self.aws_region, reason = %err, "{message}");
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Samples emitted on every scrape, successful or not.
    fn emit_base(&self, vecs: &ScrapeVecs, up: f64) {
        vecs.build_info
            .with_label_values(&[
                build_info::VERSION,
                build_info::commit_sha(),
                build_info::build_date(),
                &self.aws_region,
            ])
            .set(1.0);

        vecs.errors_total
            .with_label_values(&[&self.aws_region])
            .inc_by(self.counters.errors.load(Ordering::Relaxed) as f64);

        vecs.up.with_label_values(&[&self.aws_region]).set(up);
    }

    #[allow(clippy::too_many_lines)]
    fn emit(&self, vecs: &ScrapeVecs, metrics: &ScrapeMetrics) {
        let counters = self.counters();
        let account = self.aws_account_id.as_str();
        let region = self.aws_region.as_str();

        // RDS inventory
        vecs.api_call_total
            .with_label_values(&[account, region, "rds"])
            .inc_by(counters.rds_api_calls as f64);

        if let Some(rds_metrics) = &metrics.rds {
            for (dbidentifier, instance) in &rds_metrics.instances {
                let labels = [account, region, dbidentifier.as_str()];

                vecs.information
                    .with_label_values(&[
                        account,
                        region,
                        dbidentifier,
                        &instance.dbi_resource_id,
                        &instance.instance_class,
                        &instance.engine,
                        &instance.engine_version,
                        &instance.storage_type,
                        &instance.multi_az.to_string(),
                        &instance.deletion_protection.to_string(),
                        instance.role.as_str(),
                        &instance.source_dbidentifier,
                        &instance.pending_modified_values.to_string(),
                        &instance.pending_maintenance_action,
                        &instance.performance_insights_enabled.to_string(),
                        &instance.ca_certificate_identifier,
                        &instance.arn,
                    ])
                    .set(1.0);

                vecs.allocated_storage
                    .with_label_values(&labels)
                    .set(instance.allocated_storage as f64);
                vecs.max_allocated_storage
                    .with_label_values(&labels)
                    .set(instance.max_allocated_storage as f64);
                vecs.max_iops
                    .with_label_values(&labels)
                    .set(instance.max_iops as f64);
                vecs.status
                    .with_label_values(&labels)
                    .set(instance.status as f64);
                vecs.storage_throughput
                    .with_label_values(&labels)
                    .set(instance.storage_throughput as f64);
                vecs.backup_retention_period
                    .with_label_values(&labels)
                    .set(instance.backup_retention_period as f64);

                if self.configuration.collect_instance_tags {
                    let (names, values) =
                        instance_tag_labels(account, region, dbidentifier, &instance.tags);
                    let value_refs: Vec<&str> = values.iter().map(String::as_str).collect();
                    vecs.tags_gauge(&names).with_label_values(&value_refs).set(0.0);
                }

                if let Some(valid_till) = instance.certificate_valid_till {
                    vecs.certificate_valid_till
                        .with_label_values(&labels)
                        .set(valid_till as f64);
                }

                if let Some(age) = instance.age {
                    vecs.age.with_label_values(&labels).set(age);
                }

                if let Some(size) = instance.log_files_size {
                    vecs.log_files_size
                        .with_label_values(&labels)
                        .set(size as f64);
                }
            }
        }

        // CloudWatch instance series: a sample only where a value is present.
        vecs.api_call_total
            .with_label_values(&[account, region, "cloudwatch"])
            .inc_by(counters.cloudwatch_api_calls as f64);

        if let Some(cloudwatch_metrics) = &metrics.cloudwatch_instances {
            for (dbidentifier, instance) in &cloudwatch_metrics.instances {
                for (series, _, _) in TIMESERIES {
                    let Some(value) = instance.get(series) else {
                        continue;
                    };
                    if let Some(gauge) = vecs.timeseries_gauge(series) {
                        gauge
                            .with_label_values(&[account, region, dbidentifier])
                            .set(value);
                    }
                }
            }
        }

        // Account usage
        if self.configuration.collect_usages {
            vecs.api_call_total
                .with_label_values(&[account, region, "usage"])
                .inc_by(counters.usage_api_calls as f64);

            if let Some(usage) = &metrics.cloudwatch_usage {
                vecs.usage_allocated_storage
                    .with_label_values(&[account, region])
                    .set(usage.allocated_storage);
                vecs.usage_db_instances
                    .with_label_values(&[account, region])
                    .set(usage.db_instances);
                vecs.usage_manual_snapshots
                    .with_label_values(&[account, region])
                    .set(usage.manual_snapshots);
            }
        }

        // EC2 instance types
        vecs.api_call_total
            .with_label_values(&[account, region, "ec2"])
            .inc_by(counters.ec2_api_calls as f64);

        if let Some(ec2_metrics) = &metrics.ec2 {
            for (instance_class, info) in &ec2_metrics.instance_types {
                let labels = [account, region, instance_class.as_str()];
                vecs.instance_max_iops
                    .with_label_values(&labels)
                    .set(info.maximum_iops as f64);
                vecs.instance_max_throughput
                    .with_label_values(&labels)
                    .set(info.maximum_throughput);
                vecs.instance_memory
                    .with_label_values(&labels)
                    .set(info.memory as f64);
                vecs.instance_vcpu
                    .with_label_values(&labels)
                    .set(info.vcpu as f64);
            }
        }

        // Service quotas
        if self.configuration.collect_quotas {
            vecs.api_call_total
                .with_label_values(&[account, region, "servicequotas"])
                .inc_by(counters.servicequotas_api_calls as f64);

            if let Some(quotas) = &metrics.service_quota {
                vecs.quota_db_instances
                    .with_label_values(&[account, region])
                    .set(quotas.db_instances);
                vecs.quota_total_storage
                    .with_label_values(&[account, region])
                    .set(quotas.total_storage);
                vecs.quota_max_snapshots
                    .with_label_values(&[account, region])
                    .set(quotas.manual_db_instance_snapshots);
            }
        }
    }
}

/// Ordered instance identifiers and deduplicated instance classes derived
/// from the inventory.
fn unique_identifiers_and_classes(
    instances: &BTreeMap<String, RdsInstance>,
) -> (Vec<String>, Vec<String>) {
    let identifiers = instances.keys().cloned().collect();
    let classes: BTreeSet<String> = instances
        .values()
        .map(|instance| instance.instance_class.clone())
        .filter(|class| !class.is_empty())
        .collect();

    (identifiers, classes.into_iter().collect())
}

/// Label names and values for one instance's `rds_instance_tags` sample.
/// Tag keys are sanitized, prefixed `tag_` and processed in sorted order;
/// on sanitized-name collision the first key wins.
fn instance_tag_labels(
    account: &str,
    region: &str,
    dbidentifier: &str,
    tags: &BTreeMap<String, String>,
) -> (Vec<String>, Vec<String>) {
    let mut names = vec![
        "aws_account_id".to_string(),
        "aws_region".to_string(),
        "dbidentifier".to_string(),
    ];
    let mut values = vec![
        account.to_string(),
        region.to_string(),
        dbidentifier.to_string(),
    ];

    for (key, value) in tags {
        let name = format!("tag_{}", clear_prometheus_label(key));
        if names.contains(&name) {
            continue;
        }
        names.push(name);
        values.push(value.clone());
    }

    (names, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_identifiers_and_classes() {
        let mut instances = BTreeMap::new();
        instances.insert(
            "db-b".to_string(),
            RdsInstance {
                instance_class: "db.t3.small".to_string(),
                ..RdsInstance::default()
            },
        );
        instances.insert(
            "db-a".to_string(),
            RdsInstance {
                instance_class: "db.t3.small".to_string(),
                ..RdsInstance::default()
            },
        );
        instances.insert(
            "db-c".to_string(),
            RdsInstance {
                instance_class: "db.r6g.large".to_string(),
                ..RdsInstance::default()
            },
        );

        let (identifiers, classes) = unique_identifiers_and_classes(&instances);

        assert_eq!(identifiers, vec!["db-a", "db-b", "db-c"]);
        assert_eq!(classes, vec!["db.r6g.large", "db.t3.small"]);
    }

    #[test]
    fn test_classes_skip_empty_values() {
        let mut instances = BTreeMap::new();
        instances.insert("db-a".to_string(), RdsInstance::default());

        let (_, classes) = unique_identifiers_and_classes(&instances);
        assert!(classes.is_empty());
    }

    #[test]
    fn test_instance_tag_labels_are_sanitized_and_prefixed() {
        let mut tags = BTreeMap::new();
        tags.insert("cost-center".to_string(), "platform".to_string());
        tags.insert("environment".to_string(), "production".to_string());

        let (names, values) = instance_tag_labels("123456789012", "eu-west-1", "db-a", &tags);

        assert_eq!(
            names,
            vec![
                "aws_account_id",
                "aws_region",
                "dbidentifier",
                "tag_cost_center",
                "tag_environment",
            ]
        );
        assert_eq!(
            values,
            vec!["123456789012", "eu-west-1", "db-a", "platform", "production"]
        );
    }

    #[test]
    fn test_instance_tag_label_collision_is_deterministic() {
        let mut tags = BTreeMap::new();
        tags.insert("cost-center".to_string(), "first".to_string());
        tags.insert("cost.center".to_string(), "second".to_string());

        let (names, values) = instance_tag_labels("123456789012", "eu-west-1", "db-a", &tags);

        // BTreeMap iterates "cost-center" before "cost.center"; the first
        // writer keeps the sanitized name.
        assert_eq!(names.iter().filter(|n| *n == "tag_cost_center").count(), 1);
        assert!(values.contains(&"first".to_string()));
        assert!(!values.contains(&"second".to_string()));
    }
}
