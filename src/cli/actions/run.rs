use crate::cli::actions::Action;
use crate::cli::{AWS_ERROR_EXIT_CODE, HTTP_ERROR_EXIT_CODE};
use crate::exporter;
use anyhow::Result;
use tracing::error;

/// Handle the run action: resolve the AWS clients for every region and
/// serve the metrics endpoint until shutdown.
///
/// Exits the process with the dedicated code on AWS or HTTP failure.
///
/// # Errors
///
/// Returns an error only for failures outside the AWS/HTTP phases.
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Run { settings } => {
            let collectors = match exporter::build_region_collectors(&settings).await {
                Ok(collectors) => collectors,
                Err(err) => {
                    error!(reason = %err, "can't initialize AWS configuration");
                    std::process::exit(AWS_ERROR_EXIT_CODE);
                }
            };

            if let Err(err) = exporter::serve(settings, collectors).await {
                error!(reason = %err, "web server error");
                std::process::exit(HTTP_ERROR_EXIT_CODE);
            }
        }
    }

    Ok(())
}
