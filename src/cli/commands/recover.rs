//! `rootcause recover`
//!
//! Picks up investigations a previous process left behind: overdue
//! suspensions time out and running records are driven to a settled state
//! before the command returns.

use anyhow::Result;

use rootcause_config::Config;
use rootcause_store::InvestigationStatus;
use rootcause_utils::error::RootCauseError;
use rootcause_utils::exit_codes::ExitCode;

use super::common::{POLL_INTERVAL, open_service};
use super::output::Output;

pub async fn execute_recover_command(config: &Config, output: Output) -> Result<ExitCode> {
    let service = open_service(config)?;
    let summary = service.recover().map_err(RootCauseError::from)?;

    let running: Vec<String> = service
        .list()
        .into_iter()
        .filter(|view| view.status == InvestigationStatus::Running)
        .map(|view| view.id)
        .collect();
    for id in &running {
        service
            .wait_for_settled(id, POLL_INTERVAL)
            .await
            .map_err(RootCauseError::from)?;
    }

    output.recovery(&summary)?;
    Ok(ExitCode::SUCCESS)
}
