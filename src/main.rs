use ixa_forecast::log::enable_logging;
use ixa_forecast::runner::run_with_config;
use std::process::ExitCode;

const DEFAULT_CONFIG: &str = "forecast.json";

fn main() -> ExitCode {
    if let Err(e) = enable_logging() {
        eprintln!("failed to initialize logging: {e}");
    }

    let config = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    match run_with_config(&config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ixa-forecast: {config}: {e}");
            ExitCode::FAILURE
        }
    }
}
