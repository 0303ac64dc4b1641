use std::process::ExitCode;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

mod args;
mod commands;
mod error;
mod progress;

use crate::args::LogLevel;
use crate::error::AppError;

/// `RUST_LOG` wins when set. Otherwise `--log-level` applies to this tool and dependencies only
/// report warnings.
fn init_logging(level: LogLevel) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .parse_lossy(format!("debuginfo_sync={}", level.as_filter())),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<(), AppError> {
    let args = args::parse()?;
    init_logging(args.log_level);
    tracing::debug!(?args, "parsed arguments");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(commands::run(args.command))
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            err.report();
            err.into()
        }
    }
}
