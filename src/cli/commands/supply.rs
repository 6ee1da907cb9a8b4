//! `rootcause supply`

use anyhow::Result;

use rootcause_config::Config;
use rootcause_store::{InvestigationStatus, SuppliedInput};
use rootcause_utils::error::RootCauseError;
use rootcause_utils::exit_codes::ExitCode;

use super::common::{POLL_INTERVAL, exit_code_for, open_service};
use super::output::Output;

/// Resume `id` with `value` and follow it until it settles again.
///
/// `value` is a `START/END` pair when it parses as one and free text
/// otherwise.
pub async fn execute_supply_command(
    id: &str,
    value: &str,
    config: &Config,
    output: Output,
) -> Result<ExitCode> {
    let service = open_service(config)?;
    let supplied = SuppliedInput::parse(value);
    if let SuppliedInput::Range(range) = &supplied {
        tracing::debug!(investigation_id = %id, range = %range, "Supplying explicit time range");
    }
    service
        .supply_input(id, supplied)
        .map_err(RootCauseError::from)?;

    let view = service
        .wait_for_settled(id, POLL_INTERVAL)
        .await
        .map_err(RootCauseError::from)?;
    output.status(&view)?;
    if view.status == InvestigationStatus::WaitingForInput && !output.is_json() {
        println!("\nAnswer with: rootcause supply {id} <START/END or description>");
    }
    Ok(exit_code_for(view.status))
}
