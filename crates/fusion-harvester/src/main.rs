mod cli;
mod commands;
mod error;
mod output;
mod sink;

use std::io;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::{Cli, Command, GlobalOpts, LogFormat};
use crate::error::CliError;

const LOG_FILE_PREFIX: &str = "fusion-harvester.log";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let guard = init_tracing(&cli.global);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        drop(guard);
        std::process::exit(code);
    }
}

/// Stderr logging per `--log-format`, plus a daily rolling JSON file when
/// `--log-dir` is set. `RUST_LOG` overrides the `-v` level.
fn init_tracing(global: &GlobalOpts) -> Option<WorkerGuard> {
    let level = match global.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = match global.log_format {
        LogFormat::Text => fmt::layer()
            .with_target(false)
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(io::stderr).boxed(),
    };

    let (file_layer, guard) = match global.log_dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().json().with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "fusion-harvester", &mut io::stdout());
            Ok(())
        }

        Command::Config(ref args) => commands::config_cmd::handle(args, &cli.global),
        Command::Normalize(ref args) => commands::normalize::handle(args, &cli.global),

        Command::Run => commands::harvest::run(&cli.global).await,
        Command::Once => commands::harvest::once(&cli.global).await,
        Command::Discover(ref args) => commands::harvest::discover(args, &cli.global).await,
    }
}
