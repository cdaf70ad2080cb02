//! magecloud-build - Main entry point

use anyhow::Context;
use serde_json::{Value, json};
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use magecloud_build::build::{Build, BuildPaths};
use magecloud_build::build_log::BuildLog;
use magecloud_build::cli::{Cli, Commands};
use magecloud_build::environment::Environment;
use magecloud_build::process_guard;
use magecloud_build::sample_data::marshal_sample_data;
use magecloud_build::shell::ShellRunner;

/// Diagnostics go to stderr; stdout carries the build log
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_logger();

    // Foreground commands must not outlive the hook if the platform kills it
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }

    let cli = Cli::parse_args();
    debug!("CLI arguments parsed: {:?}", cli);

    let result = match cli.subcommand() {
        Commands::Build => return run_build(&cli),
        Commands::MarshalSampleData => run_marshal_sample_data(&cli),
        Commands::Environment => print_environment(&cli),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_build(cli: &Cli) -> ExitCode {
    info!("Running build hook in {}", cli.root.display());

    let env = Environment::from_process(&cli.root);
    let log = BuildLog::stdout();
    let runner = ShellRunner::new(&cli.root, log.clone());
    let mut build = Build::new(env, runner, log.clone());

    let outcome = build.run();
    drop(build);
    if let Err(e) = log.close() {
        warn!("Failed to flush build log: {}", e);
    }

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Build failed: {}", e);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

fn run_marshal_sample_data(cli: &Cli) -> anyhow::Result<()> {
    let log = BuildLog::stdout();
    marshal_sample_data(&BuildPaths::new(&cli.root), &log)
        .context("Failed to copy sample data media")?;
    log.close().context("Failed to flush build log")?;
    Ok(())
}

fn print_environment(cli: &Cli) -> anyhow::Result<()> {
    let env = Environment::from_process(&cli.root);
    let dump = json!({
        "variables": Value::Object(env.variables().context("Failed to decode variables")?),
        "routes": Value::Object(env.routes().context("Failed to decode routes")?),
        "relationships": Value::Object(
            env.relationships().context("Failed to decode relationships")?
        ),
    });
    println!("{}", serde_json::to_string_pretty(&dump)?);
    Ok(())
}
