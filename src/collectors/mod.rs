//! AWS fetchers and the per-region collector.
//!
//! Each fetcher issues one family of upstream calls behind a narrow client
//! trait and returns a typed result plus call accounting; the collector in
//! [`exporter`] drives them on every scrape.

pub mod cloudwatch;
pub mod ec2;
pub mod exporter;
pub mod rds;
pub mod servicequotas;
pub mod util;
