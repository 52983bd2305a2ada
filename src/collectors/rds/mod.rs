//! Inventory fetcher: describes every RDS instance in the region and derives
//! the per-instance attributes emitted by the collector. The primary
//! describe-instances call is the only fetch that is fatal to a scrape;
//! log-file and maintenance enrichments degrade on failure.

pub mod status;

use crate::collectors::util::{days_to_seconds, gib_to_bytes, mbps_to_bytes};
use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_rds::operation::describe_db_instances::DescribeDbInstancesOutput;
use aws_sdk_rds::operation::describe_db_log_files::DescribeDbLogFilesOutput;
use aws_sdk_rds::operation::describe_pending_maintenance_actions::DescribePendingMaintenanceActionsOutput;
use aws_sdk_rds::types::{DbInstance, PendingModifiedValues};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error};

/// Narrow client surface needed by the fetcher. Implemented by the real SDK
/// client and by test mocks.
#[async_trait]
pub trait RdsClient: Send + Sync {
    async fn describe_db_instances(
        &self,
        marker: Option<String>,
    ) -> Result<DescribeDbInstancesOutput>;

    async fn describe_pending_maintenance_actions(
        &self,
        marker: Option<String>,
    ) -> Result<DescribePendingMaintenanceActionsOutput>;

    async fn describe_db_log_files(
        &self,
        dbidentifier: &str,
        marker: Option<String>,
    ) -> Result<DescribeDbLogFilesOutput>;
}

#[async_trait]
impl RdsClient for aws_sdk_rds::Client {
    async fn describe_db_instances(
        &self,
        marker: Option<String>,
    ) -> Result<DescribeDbInstancesOutput> {
        Ok(self
            .describe_db_instances()
            .set_marker(marker)
            .send()
            .await?)
    }

    async fn describe_pending_maintenance_actions(
        &self,
        marker: Option<String>,
    ) -> Result<DescribePendingMaintenanceActionsOutput> {
        Ok(self
            .describe_pending_maintenance_actions()
            .set_marker(marker)
            .send()
            .await?)
    }

    async fn describe_db_log_files(
        &self,
        dbidentifier: &str,
        marker: Option<String>,
    ) -> Result<DescribeDbLogFilesOutput> {
        Ok(self
            .describe_db_log_files()
            .db_instance_identifier(dbidentifier)
            .set_marker(marker)
            .send()
            .await?)
    }
}

/// Instance role derived from the replication topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstanceRole {
    #[default]
    Primary,
    Replica,
}

impl InstanceRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Replica => "replica",
        }
    }
}

/// One observed database instance. Byte-valued fields are already converted
/// at the fetch boundary; optional fields stay unset when the upstream did
/// not report them.
#[derive(Debug, Clone, Default)]
pub struct RdsInstance {
    pub dbi_resource_id: String,
    pub arn: String,
    pub engine: String,
    pub engine_version: String,
    pub instance_class: String,
    pub storage_type: String,
    pub role: InstanceRole,
    pub source_dbidentifier: String,
    pub allocated_storage: i64,
    pub max_allocated_storage: i64,
    pub max_iops: i64,
    pub storage_throughput: i64,
    pub backup_retention_period: i64,
    pub status: i64,
    pub age: Option<f64>,
    pub certificate_valid_till: Option<i64>,
    pub ca_certificate_identifier: String,
    pub pending_modified_values: bool,
    pub pending_maintenance_action: String,
    pub multi_az: bool,
    pub deletion_protection: bool,
    pub performance_insights_enabled: bool,
    pub log_files_size: Option<i64>,
    pub tags: BTreeMap<String, String>,
}

/// Result of one inventory fetch, keyed by instance identifier.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub instances: BTreeMap<String, RdsInstance>,
}

/// Per-fetch API call and error accounting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Statistics {
    pub rds_api_calls: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Configuration {
    pub collect_logs_size: bool,
    pub collect_maintenances: bool,
}

pub struct RdsFetcher {
    client: Arc<dyn RdsClient>,
    configuration: Configuration,
    statistics: Statistics,
}

impl RdsFetcher {
    #[must_use]
    pub fn new(client: Arc<dyn RdsClient>, configuration: Configuration) -> Self {
        Self {
            client,
            configuration,
            statistics: Statistics::default(),
        }
    }

    #[must_use]
    pub const fn statistics(&self) -> Statistics {
        self.statistics
    }

    /// Describe all instances in the region and derive their attributes.
    ///
    /// # Errors
    ///
    /// Returns an error when the describe-instances listing itself fails;
    /// this is the only failure that is fatal to the whole scrape.
    pub async fn get_instances_metrics(&mut self) -> Result<Metrics> {
        let maintenance = if self.configuration.collect_maintenances {
            match self.pending_maintenance_actions().await {
                Ok(actions) => actions,
                Err(err) => {
                    error!(reason = %err, "can't fetch pending maintenance actions");
                    self.statistics.errors += 1;
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        let mut instances = BTreeMap::new();
        let mut marker: Option<String> = None;

        loop {
            let page = self.client.describe_db_instances(marker).await?;
            self.statistics.rds_api_calls += 1;

            for db in page.db_instances() {
                let Some(dbidentifier) = db.db_instance_identifier() else {
                    continue;
                };

                let instance = instance_record(db, &maintenance);
                instances.insert(dbidentifier.to_string(), instance);
            }

            marker = page.marker().map(ToString::to_string);
            if marker.is_none() {
                break;
            }
        }

        if self.configuration.collect_logs_size {
            for (dbidentifier, instance) in &mut instances {
                match self.log_files_size(dbidentifier).await {
                    Ok(size) => instance.log_files_size = Some(size),
                    Err(err) => {
                        error!(dbidentifier = %dbidentifier, reason = %err, "can't fetch log files size");
                        self.statistics.errors += 1;
                    }
                }
            }
        }

        debug!(count = instances.len(), "instances described");

        Ok(Metrics { instances })
    }

    /// One sweep over the account's pending maintenance actions, keyed by
    /// resource ARN.
    async fn pending_maintenance_actions(&mut self) -> Result<HashMap<String, String>> {
        let mut actions = HashMap::new();
        let mut marker: Option<String> = None;

        loop {
            let page = self
                .client
                .describe_pending_maintenance_actions(marker)
                .await?;
            self.statistics.rds_api_calls += 1;

            for resource in page.pending_maintenance_actions() {
                let Some(arn) = resource.resource_identifier() else {
                    continue;
                };

                if let Some(action) = resource
                    .pending_maintenance_action_details()
                    .first()
                    .and_then(|detail| detail.action())
                {
                    actions.insert(arn.to_string(), action.to_string());
                }
            }

            marker = page.marker().map(ToString::to_string);
            if marker.is_none() {
                break;
            }
        }

        Ok(actions)
    }

    /// Total size of the instance's log files in bytes.
    async fn log_files_size(&mut self, dbidentifier: &str) -> Result<i64> {
        let mut total = 0;
        let mut marker: Option<String> = None;

        loop {
            let page = self
                .client
                .describe_db_log_files(dbidentifier, marker)
                .await?;
            self.statistics.rds_api_calls += 1;

            total += page
                .describe_db_log_files()
                .iter()
                .filter_map(aws_sdk_rds::types::DescribeDbLogFilesDetails::size)
                .sum::<i64>();

            marker = page.marker().map(ToString::to_string);
            if marker.is_none() {
                break;
            }
        }

        Ok(total)
    }
}

fn instance_record(db: &DbInstance, maintenance: &HashMap<String, String>) -> RdsInstance {
    let arn = db.db_instance_arn().unwrap_or_default().to_string();

    let role = if db
        .read_replica_source_db_instance_identifier()
        .is_some_and(|source| !source.is_empty())
    {
        InstanceRole::Replica
    } else {
        InstanceRole::Primary
    };

    let age = db.instance_create_time().and_then(|created| {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let elapsed = now - created.secs();
        (elapsed >= 0).then_some(elapsed as f64)
    });

    let pending_maintenance_action = maintenance.get(&arn).cloned().unwrap_or_default();

    RdsInstance {
        dbi_resource_id: db.dbi_resource_id().unwrap_or_default().to_string(),
        engine: db.engine().unwrap_or_default().to_string(),
        engine_version: db.engine_version().unwrap_or_default().to_string(),
        instance_class: db.db_instance_class().unwrap_or_default().to_string(),
        storage_type: db.storage_type().unwrap_or_default().to_string(),
        role,
        source_dbidentifier: db
            .read_replica_source_db_instance_identifier()
            .unwrap_or_default()
            .to_string(),
        allocated_storage: gib_to_bytes(i64::from(db.allocated_storage().unwrap_or_default())),
        max_allocated_storage: gib_to_bytes(i64::from(
            db.max_allocated_storage().unwrap_or_default(),
        )),
        max_iops: i64::from(db.iops().unwrap_or_default()),
        storage_throughput: mbps_to_bytes(i64::from(db.storage_throughput().unwrap_or_default())),
        backup_retention_period: days_to_seconds(i64::from(
            db.backup_retention_period().unwrap_or_default(),
        )),
        status: status::instance_status_code(db.db_instance_status().unwrap_or_default()),
        age,
        certificate_valid_till: db
            .certificate_details()
            .and_then(|details| details.valid_till())
            .map(aws_sdk_rds::primitives::DateTime::secs),
        ca_certificate_identifier: db.ca_certificate_identifier().unwrap_or_default().to_string(),
        pending_modified_values: db
            .pending_modified_values()
            .is_some_and(has_pending_modifications),
        pending_maintenance_action,
        multi_az: db.multi_az().unwrap_or_default(),
        deletion_protection: db.deletion_protection().unwrap_or_default(),
        performance_insights_enabled: db.performance_insights_enabled().unwrap_or_default(),
        log_files_size: None,
        tags: db
            .tag_list()
            .iter()
            .filter_map(|tag| Some((tag.key()?.to_string(), tag.value().unwrap_or_default().to_string())))
            .collect(),
        arn,
    }
}

/// True when any pending modification is reported for the instance.
fn has_pending_modifications(pending: &PendingModifiedValues) -> bool {
    pending.allocated_storage().is_some()
        || pending.backup_retention_period().is_some()
        || pending.db_instance_class().is_some()
        || pending.db_instance_identifier().is_some()
        || pending.engine_version().is_some()
        || pending.iops().is_some()
        || pending.master_user_password().is_some()
        || pending.multi_az().is_some()
        || pending.storage_throughput().is_some()
        || pending.storage_type().is_some()
}
