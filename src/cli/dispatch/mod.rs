use crate::cli::actions::Action;
use crate::config::Settings;
use anyhow::Result;
use clap::ArgMatches;

/// Turn parsed matches into an [`Action`], merging every configuration
/// source.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or fails
/// validation.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let settings = Settings::load(matches)?;

    Ok(Action::Run { settings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn test_handler_returns_run_action() {
        let matches = commands::new().get_matches_from(vec!["rds_exporter"]);
        let action = handler(&matches).unwrap();

        let Action::Run { settings } = action;
        assert_eq!(settings.metrics_path, "/metrics");
    }

    #[test]
    fn test_handler_applies_flags() {
        let matches = commands::new().get_matches_from(vec![
            "rds_exporter",
            "--listen-address",
            "127.0.0.1:9043",
            "--no-collect-instance-tags",
        ]);
        let Action::Run { settings } = handler(&matches).unwrap();

        assert_eq!(settings.listen_address, "127.0.0.1:9043");
        assert!(!settings.collect_instance_tags);
    }
}
