//! docqa - validate and score LLM-extracted document records.

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use docqa_cli::{commands, Cli, Command};
use docqa_core::Engine;
use docqa_runtime::SharedEngine;

/// Exit code when the payload could not be parsed.
const EXIT_PARSE_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable. `RUST_LOG` overrides `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = commands::load_config(&cli)?;

    match &cli.command {
        Command::Process(args) => {
            let engine = Engine::from_config(&config)?;
            let outcome = commands::execute_process(args, &engine)?;
            if outcome.is_scored() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_PARSE_FAILURE))
            }
        }
        Command::Batch(args) => {
            let engine = Arc::new(SharedEngine::from_config(&config)?);
            commands::execute_batch(args, engine).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Weights => {
            let engine = Engine::from_config(&config)?;
            print!("{}", commands::format_weights(engine.weights()));
            Ok(ExitCode::SUCCESS)
        }
    }
}
