//! `rootcause start`
//!
//! Starts an investigation from a query or an alert file and follows it
//! until it finishes or suspends. With `--wait-for-input` a suspension is
//! answered from stdin and the investigation is followed again.

use anyhow::{Context, Result};
use std::io::Write as _;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use rootcause_config::Config;
use rootcause_engine::{InvestigationService, StatusView};
use rootcause_store::{Alert, InvestigationInput, InvestigationStatus, SuppliedInput};
use rootcause_utils::error::{InvestigationError, RootCauseError};
use rootcause_utils::exit_codes::ExitCode;

use super::common::{POLL_INTERVAL, exit_code_for, open_service};
use super::output::Output;

pub async fn execute_start_command(
    query: Option<String>,
    alert: Option<&Path>,
    wait_for_input: bool,
    config: &Config,
    output: Output,
) -> Result<ExitCode> {
    let input = read_input(query, alert)?;
    let service = open_service(config)?;

    let id = service.start(input).map_err(RootCauseError::from)?;
    if !output.is_json() {
        println!("Started investigation {id}");
    }

    let mut view = follow(&service, &id).await?;
    if wait_for_input {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while view.status == InvestigationStatus::WaitingForInput {
            ask(&view)?;
            let Some(line) = lines
                .next_line()
                .await
                .context("Failed to read input from stdin")?
            else {
                debug!(investigation_id = %id, "stdin closed while waiting for input");
                break;
            };
            match service.supply_input(&id, SuppliedInput::parse(&line)) {
                Ok(_) => view = follow(&service, &id).await?,
                Err(InvestigationError::InvalidSuppliedInput(reason)) => {
                    eprintln!("✗ {reason}");
                }
                Err(err) => return Err(RootCauseError::from(err).into()),
            }
        }
    }

    output.status(&view)?;
    if view.status == InvestigationStatus::WaitingForInput && !output.is_json() {
        println!("\nAnswer with: rootcause supply {id} <START/END or description>");
    }
    Ok(exit_code_for(view.status))
}

/// Turn the command-line arguments into an investigation input.
///
/// An unreadable or malformed alert file is a usage error, reported before
/// anything is created.
fn read_input(query: Option<String>, alert: Option<&Path>) -> Result<InvestigationInput> {
    if let Some(text) = query {
        return Ok(InvestigationInput::Query { text });
    }
    let Some(path) = alert else {
        return Err(RootCauseError::from(InvestigationError::InvalidInput(
            "either --query or --alert is required".to_string(),
        ))
        .into());
    };
    let body = std::fs::read_to_string(path).map_err(|e| {
        RootCauseError::from(InvestigationError::InvalidInput(format!(
            "cannot read alert file {}: {e}",
            path.display()
        )))
    })?;
    let alert = Alert::from_alertmanager_payload(&body)
        .map_err(|reason| RootCauseError::from(InvestigationError::InvalidInput(reason)))?;
    info!(alert = %alert.alert_name, "Loaded alert payload");
    Ok(InvestigationInput::Alert(alert))
}

async fn follow(service: &InvestigationService, id: &str) -> Result<StatusView> {
    Ok(service
        .wait_for_settled(id, POLL_INTERVAL)
        .await
        .map_err(RootCauseError::from)?)
}

fn ask(view: &StatusView) -> Result<()> {
    let prompt = view
        .input_prompt
        .as_deref()
        .unwrap_or("Additional input is needed");
    let mut stderr = std::io::stderr().lock();
    writeln!(stderr, "{prompt}")?;
    write!(stderr, "> ")?;
    stderr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn query_text_is_used_verbatim() {
        let input = read_input(Some("checkout 5xx".into()), None).unwrap();
        assert_eq!(
            input,
            InvestigationInput::Query {
                text: "checkout 5xx".into()
            }
        );
    }

    #[test]
    fn alert_file_is_parsed_up_front() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"alerts": [{{"status": "firing",
                "labels": {{"alertname": "HighErrorRate", "instance": "api-1", "severity": "critical"}},
                "annotations": {{"summary": "5xx above 5%"}},
                "startsAt": "2024-05-01T10:00:00Z",
                "endsAt": "0001-01-01T00:00:00Z"}}]}}"#
        )
        .unwrap();

        let input = read_input(None, Some(file.path())).unwrap();
        let InvestigationInput::Alert(alert) = input else {
            panic!("expected an alert input");
        };
        assert_eq!(alert.alert_name, "HighErrorRate");
        assert!(alert.ends_at.is_none());
    }

    #[test]
    fn bad_alert_payload_is_a_usage_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"alerts": []}}"#).unwrap();
        let err = read_input(None, Some(file.path())).unwrap_err();
        let err = err.downcast_ref::<RootCauseError>().unwrap();
        assert_eq!(err.to_exit_code(), ExitCode::CLI_ARGS);
    }

    #[test]
    fn missing_alert_file_is_a_usage_error() {
        let err = read_input(None, Some(Path::new("/nonexistent/alert.json"))).unwrap_err();
        let err = err.downcast_ref::<RootCauseError>().unwrap();
        assert_eq!(err.to_exit_code(), ExitCode::CLI_ARGS);
    }
}
