//! Account-level RDS service quotas, retrieved by their stable quota codes.

use crate::collectors::util::gib_to_bytes_f64;
use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_servicequotas::operation::get_service_quota::GetServiceQuotaOutput;
use std::sync::Arc;
use tracing::error;

pub const RDS_SERVICE_CODE: &str = "rds";
pub const DB_INSTANCES_QUOTA_CODE: &str = "L-7B6409FD";
pub const TOTAL_STORAGE_QUOTA_CODE: &str = "L-7ADDB58A";
pub const MANUAL_DB_INSTANCE_SNAPSHOTS_QUOTA_CODE: &str = "L-272F1212";

/// Narrow client surface needed by the fetcher. Implemented by the real SDK
/// client and by test mocks.
#[async_trait]
pub trait ServiceQuotasClient: Send + Sync {
    async fn get_service_quota(
        &self,
        service_code: &str,
        quota_code: &str,
    ) -> Result<GetServiceQuotaOutput>;
}

#[async_trait]
impl ServiceQuotasClient for aws_sdk_servicequotas::Client {
    async fn get_service_quota(
        &self,
        service_code: &str,
        quota_code: &str,
    ) -> Result<GetServiceQuotaOutput> {
        Ok(self
            .get_service_quota()
            .service_code(service_code)
            .quota_code(quota_code)
            .send()
            .await?)
    }
}

/// Account-wide quota values. Storage is converted from GiB to bytes at the
/// fetch boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaMetrics {
    pub db_instances: f64,
    pub total_storage: f64,
    pub manual_db_instance_snapshots: f64,
}

/// Per-fetch API call and error accounting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Statistics {
    pub servicequotas_api_calls: u64,
    pub errors: u64,
}

pub struct QuotaFetcher {
    client: Arc<dyn ServiceQuotasClient>,
    statistics: Statistics,
}

impl QuotaFetcher {
    #[must_use]
    pub fn new(client: Arc<dyn ServiceQuotasClient>) -> Self {
        Self {
            client,
            statistics: Statistics::default(),
        }
    }

    #[must_use]
    pub const fn statistics(&self) -> Statistics {
        self.statistics
    }

    /// Retrieve the RDS quotas. An individual quota failure logs, bumps the
    /// error count and yields zero for that field; the fetch itself does not
    /// abort.
    pub async fn get_rds_quotas(&mut self) -> QuotaMetrics {
        QuotaMetrics {
            db_instances: self.quota_value(DB_INSTANCES_QUOTA_CODE).await,
            total_storage: gib_to_bytes_f64(self.quota_value(TOTAL_STORAGE_QUOTA_CODE).await),
            manual_db_instance_snapshots: self
                .quota_value(MANUAL_DB_INSTANCE_SNAPSHOTS_QUOTA_CODE)
                .await,
        }
    }

    async fn quota_value(&mut self, quota_code: &str) -> f64 {
        self.statistics.servicequotas_api_calls += 1;

        let value = match self
            .client
            .get_service_quota(RDS_SERVICE_CODE, quota_code)
            .await
        {
            Ok(output) => output
                .quota()
                .and_then(aws_sdk_servicequotas::types::ServiceQuota::value),
            Err(err) => {
                error!(quota_code = quota_code, reason = %err, "can't fetch service quota");
                self.statistics.errors += 1;
                return 0.0;
            }
        };

        value.unwrap_or_else(|| {
            error!(quota_code = quota_code, "service quota has no value");
            self.statistics.errors += 1;
            0.0
        })
    }
}
