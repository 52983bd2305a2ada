//! Prometheus exporter for AWS RDS.
//!
//! On every scrape the per-region collector fans out bounded parallel
//! fetches across the RDS inventory, the EC2 instance-type catalog,
//! CloudWatch time series and Service Quotas, joins the partial results
//! into a per-instance view and renders them in the Prometheus text
//! exposition format. A partial upstream failure degrades the scrape, it
//! never fails it.

pub mod build_info;
pub mod cli;
pub mod collectors;
pub mod config;
pub mod exporter;
