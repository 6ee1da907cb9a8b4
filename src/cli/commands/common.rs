//! Helpers shared by the command implementations

use std::time::Duration;

use rootcause_config::Config;
use rootcause_engine::InvestigationService;
use rootcause_store::InvestigationStatus;
use rootcause_utils::error::RootCauseError;
use rootcause_utils::exit_codes::ExitCode;

/// How often followed investigations are polled for progress
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Build the service for this invocation from the effective configuration.
pub fn open_service(config: &Config) -> Result<InvestigationService, RootCauseError> {
    InvestigationService::from_config(config)
}

/// Exit code for an investigation the command followed to `status`
#[must_use]
pub fn exit_code_for(status: InvestigationStatus) -> ExitCode {
    match status {
        InvestigationStatus::Completed | InvestigationStatus::Running => ExitCode::SUCCESS,
        InvestigationStatus::WaitingForInput => ExitCode::WAITING_FOR_INPUT,
        InvestigationStatus::Failed => ExitCode::INVESTIGATION_FAILED,
        InvestigationStatus::TimedOut => ExitCode::TIMED_OUT,
    }
}
