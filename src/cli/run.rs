//! CLI entry point and dispatch
//!
//! `run()` parses arguments, initializes logging, discovers configuration,
//! creates the Tokio runtime and dispatches to a command. It owns all
//! error output; `main` only turns the returned code into the process exit
//! status.

use clap::Parser;
use std::path::PathBuf;

use rootcause_config::{CONFIG_DIR_NAME, CliArgs, Config};
use rootcause_utils::error::RootCauseError;
use rootcause_utils::exit_codes::ExitCode;
use rootcause_utils::logging::{init_tracing, init_tracing_json};
use rootcause_utils::redaction::redact_error_message;

use super::args::{Cli, Commands};
use super::commands::{self, Output};

/// Main CLI execution function.
///
/// Returns `Ok(())` when the command succeeded and the investigation it
/// followed (if any) completed; otherwise prints what went wrong and
/// returns the exit code for `main` to use.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    let logging = if cli.json {
        init_tracing_json(cli.verbose)
    } else {
        init_tracing(cli.verbose)
    };
    if let Err(e) = logging {
        eprintln!("✗ Failed to initialize logging: {e}");
    }

    let cli_args = CliArgs {
        config_path: cli.config.clone(),
        state_dir: cli.state_dir.clone(),
        max_iterations: cli.max_iterations,
        investigation_timeout_secs: cli.timeout,
        llm_provider: cli.llm_provider.clone(),
        llm_model: cli.model.clone(),
    };

    let mut config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            let err = RootCauseError::from(err);
            eprintln!("{}", err.display_for_user());
            return Err(err.to_exit_code());
        }
    };
    // Separate CLI invocations share records through the filesystem.
    if config.store.state_dir.is_none() {
        config.store.state_dir = Some(PathBuf::from(CONFIG_DIR_NAME).join("state"));
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let output = Output::new(cli.json);
    let result = rt.block_on(async {
        match cli.command {
            Commands::Start {
                query,
                alert,
                wait_for_input,
            } => {
                commands::execute_start_command(
                    query,
                    alert.as_deref(),
                    wait_for_input,
                    &config,
                    output,
                )
                .await
            }
            Commands::Status { id } => commands::execute_status_command(&id, &config, output),
            Commands::Report { id } => commands::execute_report_command(&id, &config, output),
            Commands::Supply { id, value } => {
                commands::execute_supply_command(&id, &value, &config, output).await
            }
            Commands::List => commands::execute_list_command(&config, output),
            Commands::Recover => commands::execute_recover_command(&config, output).await,
        }
    });

    match result {
        Ok(code) if code == ExitCode::SUCCESS => Ok(()),
        Ok(code) => Err(code),
        Err(error) => {
            if let Some(err) = error.downcast_ref::<RootCauseError>() {
                eprintln!("{}", err.display_for_user());
                Err(err.to_exit_code())
            } else {
                eprintln!(
                    "✗ Unexpected error: {}",
                    redact_error_message(&format!("{error:#}"))
                );
                eprintln!("\n  Run with --verbose for more detailed output");
                Err(ExitCode::INTERNAL)
            }
        }
    }
}
