//! `rootcause status`

use anyhow::Result;

use rootcause_config::Config;
use rootcause_utils::error::RootCauseError;
use rootcause_utils::exit_codes::ExitCode;

use super::common::open_service;
use super::output::Output;

/// Print the status view of `id`. Read-only.
pub fn execute_status_command(id: &str, config: &Config, output: Output) -> Result<ExitCode> {
    let service = open_service(config)?;
    let view = service.status(id).map_err(RootCauseError::from)?;
    output.status(&view)?;
    Ok(ExitCode::SUCCESS)
}
