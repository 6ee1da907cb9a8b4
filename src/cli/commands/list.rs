//! `rootcause list`

use anyhow::Result;

use rootcause_config::Config;
use rootcause_utils::exit_codes::ExitCode;

use super::common::open_service;
use super::output::Output;

pub fn execute_list_command(config: &Config, output: Output) -> Result<ExitCode> {
    let service = open_service(config)?;
    output.list(&service.list())?;
    Ok(ExitCode::SUCCESS)
}
