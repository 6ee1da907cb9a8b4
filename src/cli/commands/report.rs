//! `rootcause report`
//!
//! Prints the markdown report of a completed investigation. For anything
//! else the exit code follows the investigation status, so scripts can
//! tell "not yet" (0 or 4) from "never" (3 or 10).

use anyhow::Result;

use rootcause_config::Config;
use rootcause_engine::ReportView;
use rootcause_utils::error::RootCauseError;
use rootcause_utils::exit_codes::ExitCode;

use super::common::{exit_code_for, open_service};
use super::output::Output;

pub fn execute_report_command(id: &str, config: &Config, output: Output) -> Result<ExitCode> {
    let service = open_service(config)?;
    let view = service.report(id).map_err(RootCauseError::from)?;
    output.report(id, &view)?;
    Ok(match &view {
        ReportView::Ready(_) => ExitCode::SUCCESS,
        ReportView::NotYetAvailable { status } | ReportView::Unavailable { status, .. } => {
            exit_code_for(*status)
        }
    })
}
