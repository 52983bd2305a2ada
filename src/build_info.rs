//! Build information surfaced by `rds_exporter_build_info` and `--version`.

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commit the binary was built from, when provided at build time.
#[must_use]
pub fn commit_sha() -> &'static str {
    option_env!("RDS_EXPORTER_COMMIT_SHA").unwrap_or("unknown")
}

/// Build date, when provided at build time.
#[must_use]
pub fn build_date() -> &'static str {
    option_env!("RDS_EXPORTER_BUILD_DATE").unwrap_or("unknown")
}
