//! vex CLI - VCL parser, linter, and reference interpreter.
//!
//! This is the entry point for the `vex` binary. It uses clap for
//! argument parsing and dispatches to the command handlers. With no
//! subcommand, a bare file argument runs `lint`.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{lint::run_lint, run::run_request, stats::run_stats};

/// vex - VCL parser / linter / interpreter
#[derive(Parser, Debug)]
#[command(name = "vex")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Lint, analyze, and locally execute VCL configurations", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Add an include search path (repeatable)
    #[arg(short = 'I', long = "include_path", global = true)]
    include_path: Vec<PathBuf>,

    /// -v shows warnings, -vv shows infos as well
    #[arg(short = 'v', global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,

    /// Main VCL file (shorthand for the lint subcommand)
    file: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse and lint a configuration (default)
    Lint(LintCommand),

    /// Report aggregate configuration statistics
    Stats(StatsCommand),

    /// Execute the configuration against a synthetic request
    Run(RunCommand),
}

#[derive(Args, Debug)]
struct LintCommand {
    /// Main VCL file
    file: PathBuf,
}

#[derive(Args, Debug)]
struct StatsCommand {
    /// Main VCL file
    file: PathBuf,

    /// Output statistics as JSON
    #[arg(long = "json")]
    json: bool,
}

#[derive(Args, Debug)]
struct RunCommand {
    /// Main VCL file
    file: PathBuf,

    /// Request URL path
    #[arg(long, default_value = "/")]
    url: String,

    /// Request method
    #[arg(long, default_value = "GET")]
    method: String,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_env("VEX_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Lint(cmd)) => run_lint(&cmd.file, &cli.include_path, cli.verbose),
        Some(Commands::Stats(cmd)) => run_stats(&cmd.file, &cli.include_path, cmd.json),
        Some(Commands::Run(cmd)) => {
            run_request(&cmd.file, &cli.include_path, &cmd.method, &cmd.url)
        }
        None => match cli.file {
            Some(file) => run_lint(&file, &cli.include_path, cli.verbose),
            None => {
                eprintln!("error: no input file; see `vex --help`");
                return ExitCode::FAILURE;
            }
        },
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
