mod args;
mod summary;

use anyhow::Context;
use args::{CliError, parse_config};
use cfuzz_core::config::FuzzConfig;
use cfuzz_core::fuzz::{self, RunSummary};
use cfuzz_core::output::{LineFormatter, LineSink};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const CMD_ENV: &str = "CFUZZ_CMD";
const EXIT_FATAL: u8 = 1;
const EXIT_USAGE: u8 = 2;

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(config: FuzzConfig) -> anyhow::Result<RunSummary> {
    let sink = Arc::new(LineSink::new(
        std::io::stdout(),
        LineFormatter::for_config(&config),
    ));
    let summary = fuzz::run(config, sink)
        .await
        .context("fuzzing run aborted")?;
    Ok(summary)
}

#[tokio::main]
async fn main() -> ExitCode {
    let env_command = std::env::var(CMD_ENV).ok();
    let invocation = match parse_config(std::env::args_os(), env_command) {
        Ok(invocation) => invocation,
        Err(CliError::Usage(err)) => err.exit(),
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    init_logging(invocation.verbosity);
    if !invocation.quiet {
        eprint!("{}", summary::render(&invocation.config));
    }

    match run(invocation.config).await {
        Ok(totals) => {
            info!(%totals, "done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
