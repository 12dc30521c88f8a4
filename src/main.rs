use api_firewall::cli::{run_cli, Cli};
use api_firewall::otel::{init_logging_with_config, LogConfig};
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _logging = match init_logging_with_config(&LogConfig::from_env()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };
    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "api-firewall exited with an error");
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
