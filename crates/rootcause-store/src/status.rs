use serde::{Deserialize, Serialize};

/// Lifecycle of an investigation.
///
/// Moves forward only, except the `waiting_for_input <-> running` pair.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InvestigationStatus {
    Running,
    WaitingForInput,
    Completed,
    Failed,
    TimedOut,
}

impl InvestigationStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }

    /// Whether the workflow is parked (terminal or waiting for a human)
    #[must_use]
    pub fn is_settled(self) -> bool {
        self.is_terminal() || self == Self::WaitingForInput
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use InvestigationStatus::{Completed, Failed, Running, TimedOut, WaitingForInput};
        if self == next {
            return !self.is_terminal();
        }
        match self {
            Running => matches!(next, WaitingForInput | Completed | Failed | TimedOut),
            WaitingForInput => matches!(next, Running | Failed | TimedOut),
            Completed | Failed | TimedOut => false,
        }
    }
}

/// Workflow stage names as recorded in `current_stage`.
///
/// `Investigate` covers the concurrent `investigate_metrics` and
/// `investigate_logs` branches.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    AnalyzeInput,
    PlanInvestigation,
    ResolveTimeRange,
    Investigate,
    EvaluateResults,
    GenerateRca,
}

/// One side of the evidence fan-out
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
pub enum Branch {
    #[serde(rename = "investigate_metrics")]
    #[strum(serialize = "investigate_metrics")]
    Metrics,
    #[serde(rename = "investigate_logs")]
    #[strum(serialize = "investigate_logs")]
    Logs,
}

impl Branch {
    pub const ALL: [Branch; 2] = [Self::Metrics, Self::Logs];
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn terminal_statuses_are_final() {
        for terminal in [
            InvestigationStatus::Completed,
            InvestigationStatus::Failed,
            InvestigationStatus::TimedOut,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(InvestigationStatus::Running));
            assert!(!terminal.can_transition_to(terminal));
        }
    }

    #[test]
    fn waiting_round_trips_with_running() {
        let running = InvestigationStatus::Running;
        let waiting = InvestigationStatus::WaitingForInput;
        assert!(running.can_transition_to(waiting));
        assert!(waiting.can_transition_to(running));
        assert!(waiting.can_transition_to(InvestigationStatus::TimedOut));
        assert!(!waiting.can_transition_to(InvestigationStatus::Completed));
    }

    #[test]
    fn names_are_snake_case() {
        assert_eq!(InvestigationStatus::WaitingForInput.to_string(), "waiting_for_input");
        assert_eq!(Stage::ResolveTimeRange.as_ref(), "resolve_time_range");
        assert_eq!(Branch::Logs.to_string(), "investigate_logs");
        assert_eq!(Stage::from_str("generate_rca").unwrap(), Stage::GenerateRca);
        assert_eq!(
            serde_json::to_string(&Branch::Metrics).unwrap(),
            "\"investigate_metrics\""
        );
    }
}
