mod cli;
mod policy_source;

use std::process;

use clap::Parser;
use cli::Cli;
use sandlite::ExitReport;
use sandlite_shared::errors::SandResult;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on --debug flag
    let level = if cli.global.debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match execute(&cli) {
        Ok(report) => {
            if !report.success() {
                tracing::debug!(%report, "sandboxed command did not exit cleanly");
            }
            process::exit(report.code());
        }
        Err(error) => {
            eprintln!("Error: {}", error);
            process::exit(1);
        }
    }
}

fn execute(cli: &Cli) -> SandResult<ExitReport> {
    let request = cli::build_request(cli)?;
    tracing::info!(
        rootfs = %request.rootfs.display(),
        profile = %request.profile,
        "starting sandbox"
    );
    sandlite::run(&request)
}
