use rds_exporter::cli;

#[tokio::main]
async fn main() {
    let action = match cli::start() {
        Ok(action) => action,
        Err(err) => {
            eprintln!("ERROR: Failed to load configuration: {err}");
            std::process::exit(cli::CONFIG_ERROR_EXIT_CODE);
        }
    };

    if let Err(err) = cli::actions::run::handle(action).await {
        eprintln!("ERROR: Failed to execute exporter: {err}");
        std::process::exit(cli::EXPORTER_ERROR_EXIT_CODE);
    }
}
