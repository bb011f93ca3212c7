//! transtunnel - transparent proxy packet marking for Linux gateways.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use transtunnel::cli::Cli;
use transtunnel::error::TransTunnelError;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("transtunnel: could not initialize logging");
        return ExitCode::FAILURE;
    }

    match transtunnel::lifecycle::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            let code = err
                .downcast_ref::<TransTunnelError>()
                .map(TransTunnelError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
