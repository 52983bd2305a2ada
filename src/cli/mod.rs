pub mod actions;
pub mod commands;
pub mod dispatch;

use crate::cli::actions::Action;
use crate::config::Settings;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

pub const CONFIG_ERROR_EXIT_CODE: i32 = 1;
pub const HTTP_ERROR_EXIT_CODE: i32 = 2;
pub const EXPORTER_ERROR_EXIT_CODE: i32 = 3;
pub const AWS_ERROR_EXIT_CODE: i32 = 4;

/// Parse the command line, merge the configuration and initialize logging.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or fails
/// validation.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();
    let action = dispatch::handler(&matches)?;

    let Action::Run { settings } = &action;
    init_logging(settings);

    Ok(action)
}

/// Structured logging through tracing; JSON by default, text on request.
/// `RUST_LOG` overrides the level picked from `--debug`.
fn init_logging(settings: &Settings) {
    let default_level = if settings.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if settings.log_format == "text" {
        builder.init();
    } else {
        builder.json().init();
    }
}
