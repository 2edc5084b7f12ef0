//! iris - command-line client for HCP object storage and the HCI index service

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use iris_cli::commands::{self, Cli};
use iris_cli::exit_code::ExitCode;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let exit_code = tokio::select! {
        code = commands::execute(cli) => code,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted");
            ExitCode::Interrupted
        }
    };

    std::process::exit(exit_code.as_i32());
}
