#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use anyhow::{Result, bail};
use async_trait::async_trait;
use aws_sdk_cloudwatch::operation::get_metric_data::GetMetricDataOutput;
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{MetricDataQuery, MetricDataResult};
use aws_sdk_ec2::operation::describe_instance_types::DescribeInstanceTypesOutput;
use aws_sdk_ec2::types::{
    EbsInfo, EbsOptimizedInfo, InstanceType, InstanceTypeInfo, MemoryInfo, VCpuInfo,
};
use aws_sdk_rds::operation::describe_db_instances::DescribeDbInstancesOutput;
use aws_sdk_rds::operation::describe_db_log_files::DescribeDbLogFilesOutput;
use aws_sdk_rds::operation::describe_pending_maintenance_actions::DescribePendingMaintenanceActionsOutput;
use aws_sdk_rds::types::{
    DbInstance, DescribeDbLogFilesDetails, PendingMaintenanceAction,
    ResourcePendingMaintenanceActions, Tag,
};
use aws_sdk_servicequotas::operation::get_service_quota::GetServiceQuotaOutput;
use aws_sdk_servicequotas::types::ServiceQuota;
use prometheus::proto::MetricFamily;
use rds_exporter::collectors::cloudwatch::CloudWatchClient;
use rds_exporter::collectors::ec2::Ec2Client;
use rds_exporter::collectors::exporter::{Configuration, RegionCollector, ScrapeVecs};
use rds_exporter::collectors::rds::RdsClient;
use rds_exporter::collectors::servicequotas::ServiceQuotasClient;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub const AWS_ACCOUNT_ID: &str = "123456789012";
pub const AWS_REGION: &str = "eu-west-1";

/// Canned t3.small hardware profile: 2 vCPU, 2 GiB memory.
pub const T3_SMALL_MEMORY_MIB: i64 = 2048;
pub const T3_SMALL_VCPU: i32 = 2;
pub const T3_SMALL_MAX_IOPS: i32 = 11_800;
pub const T3_SMALL_MAX_THROUGHPUT_MBPS: f64 = 260.62;

// ---------------------------------------------------------------------------
// RDS mock

#[derive(Default)]
pub struct MockRdsClient {
    pub instances: Vec<DbInstance>,
    pub fail: bool,
    pub log_files_size: i64,
    pub maintenance: Vec<(String, String)>,
}

#[async_trait]
impl RdsClient for MockRdsClient {
    async fn describe_db_instances(
        &self,
        _marker: Option<String>,
    ) -> Result<DescribeDbInstancesOutput> {
        if self.fail {
            bail!("DescribeDBInstances access denied");
        }

        Ok(DescribeDbInstancesOutput::builder()
            .set_db_instances(Some(self.instances.clone()))
            .build())
    }

    async fn describe_pending_maintenance_actions(
        &self,
        _marker: Option<String>,
    ) -> Result<DescribePendingMaintenanceActionsOutput> {
        let mut builder = DescribePendingMaintenanceActionsOutput::builder();

        for (arn, action) in &self.maintenance {
            builder = builder.pending_maintenance_actions(
                ResourcePendingMaintenanceActions::builder()
                    .resource_identifier(arn)
                    .pending_maintenance_action_details(
                        PendingMaintenanceAction::builder().action(action).build(),
                    )
                    .build(),
            );
        }

        Ok(builder.build())
    }

    async fn describe_db_log_files(
        &self,
        _dbidentifier: &str,
        _marker: Option<String>,
    ) -> Result<DescribeDbLogFilesOutput> {
        Ok(DescribeDbLogFilesOutput::builder()
            .describe_db_log_files(
                DescribeDbLogFilesDetails::builder()
                    .size(self.log_files_size)
                    .build(),
            )
            .build())
    }
}

// ---------------------------------------------------------------------------
// CloudWatch mock

#[derive(Debug, Clone, Copy)]
pub struct UsageValues {
    pub allocated_storage_gib: f64,
    pub db_instances: f64,
    pub manual_snapshots: f64,
}

impl Default for UsageValues {
    fn default() -> Self {
        Self {
            allocated_storage_gib: 50.0,
            db_instances: 2.0,
            manual_snapshots: 3.0,
        }
    }
}

#[derive(Default)]
pub struct MockCloudWatchClient {
    /// (dbidentifier, metric name) -> most recent value. Queried pairs not
    /// present here answer with an empty series.
    pub values: HashMap<(String, String), f64>,
    pub usage: UsageValues,
    pub fail: bool,
    /// GetMetricData calls against the AWS/RDS namespace.
    pub instance_data_calls: Arc<AtomicU64>,
}

impl MockCloudWatchClient {
    pub fn with_value(mut self, dbidentifier: &str, metric: &str, value: f64) -> Self {
        self.values
            .insert((dbidentifier.to_string(), metric.to_string()), value);
        self
    }
}

#[async_trait]
impl CloudWatchClient for MockCloudWatchClient {
    async fn get_metric_data(
        &self,
        queries: Vec<MetricDataQuery>,
        _start_time: DateTime,
        _end_time: DateTime,
    ) -> Result<GetMetricDataOutput> {
        if self.fail {
            bail!("GetMetricData access denied");
        }

        let mut results = Vec::with_capacity(queries.len());
        let mut saw_instance_namespace = false;

        for query in &queries {
            let id = query.id().unwrap_or_default().to_string();
            let Some(metric) = query.metric_stat().and_then(|stat| stat.metric()) else {
                continue;
            };

            let mut result = MetricDataResult::builder().id(&id);

            match metric.namespace() {
                Some("AWS/RDS") => {
                    saw_instance_namespace = true;
                    let metric_name = metric.metric_name().unwrap_or_default();
                    let dbidentifier = metric
                        .dimensions()
                        .first()
                        .and_then(|dimension| dimension.value())
                        .unwrap_or_default();

                    if let Some(value) = self
                        .values
                        .get(&(dbidentifier.to_string(), metric_name.to_string()))
                    {
                        result = result.values(*value);
                    }
                }
                Some("AWS/Usage") => {
                    let value = match id.as_str() {
                        "usage_allocatedstorage" => self.usage.allocated_storage_gib,
                        "usage_dbinstances" => self.usage.db_instances,
                        "usage_manualsnapshots" => self.usage.manual_snapshots,
                        _ => 0.0,
                    };
                    result = result.values(value);
                }
                _ => {}
            }

            results.push(result.build());
        }

        if saw_instance_namespace {
            self.instance_data_calls.fetch_add(1, Ordering::Relaxed);
        }

        Ok(GetMetricDataOutput::builder()
            .set_metric_data_results(Some(results))
            .build())
    }
}

/// A CloudWatch client stuck until the scrape is dropped, for cancellation
/// tests.
pub struct StalledCloudWatchClient;

#[async_trait]
impl CloudWatchClient for StalledCloudWatchClient {
    async fn get_metric_data(
        &self,
        _queries: Vec<MetricDataQuery>,
        _start_time: DateTime,
        _end_time: DateTime,
    ) -> Result<GetMetricDataOutput> {
        futures::future::pending::<()>().await;
        unreachable!("pending future resolved");
    }
}

// ---------------------------------------------------------------------------
// EC2 mock

#[derive(Default)]
pub struct MockEc2Client {
    pub fail: bool,
}

#[async_trait]
impl Ec2Client for MockEc2Client {
    async fn describe_instance_types(
        &self,
        instance_types: Vec<InstanceType>,
    ) -> Result<DescribeInstanceTypesOutput> {
        if self.fail {
            bail!("DescribeInstanceTypes access denied");
        }

        let mut known = Vec::new();

        for instance_type in instance_types {
            // Unknown types are omitted, as the upstream does.
            if instance_type.as_str() != "t3.small" {
                continue;
            }

            known.push(
                InstanceTypeInfo::builder()
                    .instance_type(instance_type)
                    .v_cpu_info(VCpuInfo::builder().default_v_cpus(T3_SMALL_VCPU).build())
                    .memory_info(MemoryInfo::builder().size_in_mi_b(T3_SMALL_MEMORY_MIB).build())
                    .ebs_info(
                        EbsInfo::builder()
                            .ebs_optimized_info(
                                EbsOptimizedInfo::builder()
                                    .maximum_iops(T3_SMALL_MAX_IOPS)
                                    .maximum_throughput_in_m_bps(T3_SMALL_MAX_THROUGHPUT_MBPS)
                                    .build(),
                            )
                            .build(),
                    )
                    .build(),
            );
        }

        Ok(DescribeInstanceTypesOutput::builder()
            .set_instance_types(Some(known))
            .build())
    }
}

// ---------------------------------------------------------------------------
// Service Quotas mock

pub struct MockServiceQuotasClient {
    pub db_instances: f64,
    pub total_storage_gib: f64,
    pub manual_snapshots: f64,
    pub fail: bool,
}

impl Default for MockServiceQuotasClient {
    fn default() -> Self {
        Self {
            db_instances: 40.0,
            total_storage_gib: 100_000.0,
            manual_snapshots: 100.0,
            fail: false,
        }
    }
}

#[async_trait]
impl ServiceQuotasClient for MockServiceQuotasClient {
    async fn get_service_quota(
        &self,
        _service_code: &str,
        quota_code: &str,
    ) -> Result<GetServiceQuotaOutput> {
        if self.fail {
            bail!("GetServiceQuota access denied");
        }

        let value = match quota_code {
            rds_exporter::collectors::servicequotas::DB_INSTANCES_QUOTA_CODE => self.db_instances,
            rds_exporter::collectors::servicequotas::TOTAL_STORAGE_QUOTA_CODE => {
                self.total_storage_gib
            }
            rds_exporter::collectors::servicequotas::MANUAL_DB_INSTANCE_SNAPSHOTS_QUOTA_CODE => {
                self.manual_snapshots
            }
            _ => bail!("unexpected quota code {quota_code}"),
        };

        Ok(GetServiceQuotaOutput::builder()
            .quota(ServiceQuota::builder().value(value).build())
            .build())
    }
}

// ---------------------------------------------------------------------------
// Fixtures and helpers

fn db_instance_builder(dbidentifier: &str) -> aws_sdk_rds::types::builders::DbInstanceBuilder {
    DbInstance::builder()
        .db_instance_identifier(dbidentifier)
        .db_instance_arn(format!(
            "arn:aws:rds:{AWS_REGION}:{AWS_ACCOUNT_ID}:db:{dbidentifier}"
        ))
        .dbi_resource_id(format!("db-resource-{dbidentifier}"))
        .db_instance_class("t3.small")
        .engine("mysql")
        .engine_version("8.0.36")
        .storage_type("gp3")
        .allocated_storage(20)
        .backup_retention_period(7)
        .db_instance_status("available")
}

/// A minimal `available` MySQL instance of class `t3.small` with 20 GiB
/// allocated storage.
pub fn db_instance(dbidentifier: &str) -> DbInstance {
    db_instance_builder(dbidentifier).build()
}

pub fn db_instance_with_tags(dbidentifier: &str, tags: &[(&str, &str)]) -> DbInstance {
    let mut builder = db_instance_builder(dbidentifier);
    for (key, value) in tags {
        builder = builder.tag_list(Tag::builder().key(*key).value(*value).build());
    }
    builder.build()
}

pub fn collector(
    configuration: Configuration,
    rds: MockRdsClient,
    cloudwatch: MockCloudWatchClient,
    ec2: MockEc2Client,
    servicequotas: MockServiceQuotasClient,
) -> RegionCollector {
    RegionCollector::new(
        configuration,
        AWS_ACCOUNT_ID.to_string(),
        AWS_REGION.to_string(),
        Arc::new(rds),
        Arc::new(ec2),
        Arc::new(cloudwatch),
        Arc::new(servicequotas),
    )
}

/// One scrape against fresh emission vecs.
pub async fn scrape(collector: &RegionCollector) -> Vec<MetricFamily> {
    let vecs = ScrapeVecs::new();
    collector.collect(&vecs).await;
    vecs.gather()
}

/// Value of the sample in `name` whose labels contain every `(name, value)`
/// pair in `labels`.
pub fn sample(families: &[MetricFamily], name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    let family = families.iter().find(|family| family.get_name() == name)?;

    for metric in family.get_metric() {
        let matches = labels.iter().all(|(label_name, label_value)| {
            metric.get_label().iter().any(|pair| {
                pair.get_name() == *label_name && pair.get_value() == *label_value
            })
        });

        if matches {
            let value = if metric.has_gauge() {
                metric.get_gauge().get_value()
            } else {
                metric.get_counter().get_value()
            };
            return Some(value);
        }
    }

    None
}

/// Number of samples in a family; zero when the family is absent.
pub fn sample_count(families: &[MetricFamily], name: &str) -> usize {
    families
        .iter()
        .find(|family| family.get_name() == name)
        .map_or(0, |family| family.get_metric().len())
}

/// Label names of the first sample of a family.
pub fn first_sample_label_names(families: &[MetricFamily], name: &str) -> Vec<String> {
    families
        .iter()
        .find(|family| family.get_name() == name)
        .and_then(|family| family.get_metric().first())
        .map(|metric| {
            metric
                .get_label()
                .iter()
                .map(|pair| pair.get_name().to_string())
                .collect()
        })
        .unwrap_or_default()
}
