use std::process::ExitCode;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use dbserver::config::{self, Args};
use dbserver::lifecycle::startup::{self, StartupError};
use dbserver::observability::{error_chain, init_logging};
use dbserver::version;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if args.version {
        version::print_raw_info();
        return ExitCode::SUCCESS;
    }

    // Held until exit so the file writer flushes.
    let mut log_guard = None;
    match start(args, &mut log_guard).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn start(args: Args, log_guard: &mut Option<WorkerGuard>) -> Result<(), StartupError> {
    let config = config::resolve(args)?;
    *log_guard = init_logging(&config.log.level, config.log.file.as_deref())?;

    tracing::info!(
        version = version::RELEASE_VERSION,
        git_hash = version::git_hash(),
        profile = version::build_profile(),
        "dbserver starting"
    );
    tracing::info!(
        address = %config.addr,
        store = %config.store,
        path = %config.store_path,
        socket = ?config.socket,
        report_status = config.report_status,
        "Configuration loaded"
    );

    startup::run(config).await
}

fn report(e: &StartupError) {
    match e {
        // No subscriber is installed yet.
        StartupError::Config(_) | StartupError::Logging(_) => {
            eprintln!("dbserver: {}", error_chain(e))
        }
        _ => tracing::error!(error = %error_chain(e), "Startup failed"),
    }
}
