//! quilt CLI Binary
//!
//! Command-line interface for building, pushing, and installing data packages.

use clap::Parser;
use quilt::cli::{exit_code, load_config, map_error, Cli, Commands, RunContext};
use quilt::error::ApiError;
use quilt::logging::{init_logging, LoggingConfig};
use std::io::IsTerminal;
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            process::exit(1);
        }
    };

    let context = match RunContext::new(cli.workspace.clone(), cli.config.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error initializing quilt: {}", e);
            eprintln!("{}", map_error(&e));
            process::exit(exit_code(&e));
        }
    };

    match runtime.block_on(run(&context, &cli.command)) {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", map_error(&e));
            process::exit(exit_code(&e));
        }
    }
}

/// Run the command; an install that would overwrite files asks before
/// retrying with force when a terminal is attached.
async fn run(context: &RunContext, command: &Commands) -> Result<String, ApiError> {
    match context.execute(command).await {
        Err(ApiError::WouldOverwrite(path)) if std::io::stdin().is_terminal() => {
            let Some(forced) = with_force(command) else {
                return Err(ApiError::WouldOverwrite(path));
            };
            let confirmed = dialoguer::Confirm::new()
                .with_prompt(format!("{} differs from the package. Overwrite?", path.display()))
                .default(false)
                .interact()
                .map_err(|e| ApiError::ConfigError(format!("Failed to get user input: {}", e)))?;
            if !confirmed {
                return Ok("Install cancelled".to_string());
            }
            context.execute(&forced).await
        }
        result => result,
    }
}

fn with_force(command: &Commands) -> Option<Commands> {
    match command {
        Commands::Install { force: false, .. } => {
            let mut forced = command.clone();
            if let Commands::Install { force, .. } = &mut forced {
                *force = true;
            }
            Some(forced)
        }
        _ => None,
    }
}

/// Build logging configuration from CLI args and the config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = load_config(&cli.workspace, cli.config.as_deref())
        .map(|c| c.logging)
        .unwrap_or_default();

    if cli.quiet {
        config.level = "off".to_string();
    }
    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
    }

    config
}
