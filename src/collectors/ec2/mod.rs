//! Instance-type catalog lookup: hardware characteristics (vCPU, memory,
//! EBS caps) for each instance class observed in the inventory.

use crate::collectors::util::{mbps_to_bytes_per_second, mib_to_bytes};
use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_ec2::operation::describe_instance_types::DescribeInstanceTypesOutput;
use aws_sdk_ec2::types::InstanceType;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// RDS instance classes carry a `db.` prefix over the EC2 type name.
const DB_CLASS_PREFIX: &str = "db.";

/// Narrow client surface needed by the fetcher. Implemented by the real SDK
/// client and by test mocks.
#[async_trait]
pub trait Ec2Client: Send + Sync {
    async fn describe_instance_types(
        &self,
        instance_types: Vec<InstanceType>,
    ) -> Result<DescribeInstanceTypesOutput>;
}

#[async_trait]
impl Ec2Client for aws_sdk_ec2::Client {
    async fn describe_instance_types(
        &self,
        instance_types: Vec<InstanceType>,
    ) -> Result<DescribeInstanceTypesOutput> {
        Ok(self
            .describe_instance_types()
            .set_instance_types(Some(instance_types))
            .send()
            .await?)
    }
}

/// Hardware characteristics of one instance class, in base units.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ec2InstanceTypeInfo {
    pub vcpu: i64,
    pub memory: i64,
    pub maximum_iops: i64,
    pub maximum_throughput: f64,
}

/// Result of one catalog lookup, keyed by the instance class as observed in
/// the inventory (`db.`-prefixed).
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub instance_types: BTreeMap<String, Ec2InstanceTypeInfo>,
}

/// Per-fetch API call accounting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Statistics {
    pub ec2_api_calls: u64,
}

pub struct Ec2Fetcher {
    client: Arc<dyn Ec2Client>,
    statistics: Statistics,
}

impl Ec2Fetcher {
    #[must_use]
    pub fn new(client: Arc<dyn Ec2Client>) -> Self {
        Self {
            client,
            statistics: Statistics::default(),
        }
    }

    #[must_use]
    pub const fn statistics(&self) -> Statistics {
        self.statistics
    }

    /// Look up hardware characteristics for the given instance classes.
    /// Classes unknown to the catalog are silently omitted from the result.
    ///
    /// # Errors
    ///
    /// Returns an error when the DescribeInstanceTypes call fails.
    pub async fn get_db_instance_type_information(
        &mut self,
        instance_classes: &[String],
    ) -> Result<Metrics> {
        // EC2 type name -> instance class as observed in the inventory.
        let class_by_type: BTreeMap<String, String> = instance_classes
            .iter()
            .map(|class| (instance_type_for_class(class), class.clone()))
            .collect();

        let instance_types = class_by_type
            .keys()
            .map(|name| InstanceType::from(name.as_str()))
            .collect();

        let output = self.client.describe_instance_types(instance_types).await?;
        self.statistics.ec2_api_calls += 1;

        let mut metrics = Metrics::default();

        for info in output.instance_types() {
            let Some(type_name) = info.instance_type().map(InstanceType::as_str) else {
                continue;
            };
            let Some(class) = class_by_type.get(type_name) else {
                continue;
            };

            let vcpu = info
                .v_cpu_info()
                .and_then(aws_sdk_ec2::types::VCpuInfo::default_v_cpus)
                .unwrap_or_default();
            let memory_mib = info
                .memory_info()
                .and_then(aws_sdk_ec2::types::MemoryInfo::size_in_mi_b)
                .unwrap_or_default();
            let ebs_optimized = info
                .ebs_info()
                .and_then(aws_sdk_ec2::types::EbsInfo::ebs_optimized_info);

            metrics.instance_types.insert(
                class.clone(),
                Ec2InstanceTypeInfo {
                    vcpu: i64::from(vcpu),
                    memory: mib_to_bytes(memory_mib),
                    maximum_iops: i64::from(
                        ebs_optimized
                            .and_then(aws_sdk_ec2::types::EbsOptimizedInfo::maximum_iops)
                            .unwrap_or_default(),
                    ),
                    maximum_throughput: mbps_to_bytes_per_second(
                        ebs_optimized
                            .and_then(
                                aws_sdk_ec2::types::EbsOptimizedInfo::maximum_throughput_in_m_bps,
                            )
                            .unwrap_or_default(),
                    ),
                },
            );
        }

        debug!(types = metrics.instance_types.len(), "instance types described");

        Ok(metrics)
    }
}

/// `db.t3.small` -> `t3.small`; classes without the prefix pass through.
fn instance_type_for_class(class: &str) -> String {
    class
        .strip_prefix(DB_CLASS_PREFIX)
        .unwrap_or(class)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_type_for_class_strips_db_prefix() {
        assert_eq!(instance_type_for_class("db.t3.small"), "t3.small");
        assert_eq!(instance_type_for_class("db.r6g.2xlarge"), "r6g.2xlarge");
        assert_eq!(instance_type_for_class("t3.small"), "t3.small");
    }
}
