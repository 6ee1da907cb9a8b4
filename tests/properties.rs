//! Property tests over arbitrary evaluation verdict sequences

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use proptest::prelude::*;

use rootcause::{InvestigationStatus, InvestigationStore, ReasoningService, WorkflowEngine};
use rootcause_engine::test_support::ScriptedReasoning;
use rootcause_llm::{Completion, LlmError, ReasoningRequest};
use rootcause_store::{Branch, Evidence};

use common::*;

#[derive(Debug, Clone, Copy)]
enum Verdict {
    Sufficient,
    Insufficient,
    Malformed(&'static str),
}

impl Verdict {
    fn text(self) -> &'static str {
        match self {
            Self::Sufficient => "SUFFICIENT\nThe errors line up with the spike.",
            Self::Insufficient => "INSUFFICIENT\nMissing: upstream latency",
            Self::Malformed(text) => text,
        }
    }
}

fn verdict() -> impl Strategy<Value = Verdict> {
    prop_oneof![
        Just(Verdict::Sufficient),
        Just(Verdict::Insufficient),
        prop::sample::select(vec!["", "maybe?", "NOT SUFFICIENT", "{\"other\": 1}"])
            .prop_map(Verdict::Malformed),
    ]
}

/// Records the evidence log each time evaluation is asked for a verdict.
struct EvidenceWatcher {
    inner: ScriptedReasoning,
    store: Arc<InvestigationStore>,
    snapshots: Arc<Mutex<Vec<Vec<Evidence>>>>,
}

#[async_trait]
impl ReasoningService for EvidenceWatcher {
    async fn complete(&self, request: ReasoningRequest) -> Result<Completion, LlmError> {
        if request.stage == "evaluate_results" {
            let record = self.store.read(&request.investigation_id).unwrap();
            self.snapshots.lock().unwrap().push(record.evidence);
        }
        self.inner.complete(request).await
    }
}

struct Run {
    record: rootcause::Investigation,
    snapshots: Vec<Vec<Evidence>>,
}

fn run_to_completion(verdicts: &[Verdict], max_iterations: u32) -> Run {
    let mut reasoning = reasoning().default_reply("evaluate_results", "INSUFFICIENT");
    for verdict in verdicts {
        reasoning = reasoning.reply("evaluate_results", Ok(verdict.text()));
    }
    let store = Arc::new(InvestigationStore::in_memory());
    let snapshots = Arc::new(Mutex::new(Vec::new()));
    let watcher = EvidenceWatcher {
        inner: reasoning,
        store: Arc::clone(&store),
        snapshots: Arc::clone(&snapshots),
    };
    let engine = WorkflowEngine::new(
        Arc::new(watcher),
        Arc::new(gateway()),
        store,
        settings(max_iterations),
    );
    let id = "inv-prop";
    engine
        .store()
        .create(
            id,
            alert_input(),
            max_iterations,
            Utc::now() + chrono::Duration::seconds(30),
        )
        .unwrap();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let status = rt.block_on(engine.drive(id)).unwrap();
    assert_eq!(status, InvestigationStatus::Completed);
    let snapshots = snapshots.lock().unwrap().clone();
    Run {
        record: engine.store().read(id).unwrap(),
        snapshots,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn planning_rounds_never_exceed_the_bound(
        verdicts in prop::collection::vec(verdict(), 0..8),
        max_iterations in 1u32..=5,
    ) {
        let record = run_to_completion(&verdicts, max_iterations).record;

        let first_sufficient = verdicts
            .iter()
            .position(|v| matches!(v, Verdict::Sufficient))
            .map(|i| i as u32 + 1);
        let expected = first_sufficient.map_or(max_iterations, |n| n.min(max_iterations));

        prop_assert!(record.iteration_count <= max_iterations);
        prop_assert_eq!(record.iteration_count, expected);
        prop_assert_eq!(record.plans.len() as u32, expected);
        prop_assert_eq!(record.evaluations.len() as u32, expected);

        let report = record.report.as_ref().unwrap();
        prop_assert_eq!(report.iterations, expected);
        prop_assert_eq!(report.forced_by_bound, first_sufficient.is_none_or(|n| n > max_iterations));

        for (evaluation, verdict) in record.evaluations.iter().zip(&verdicts) {
            prop_assert_eq!(evaluation.malformed, matches!(verdict, Verdict::Malformed(_)));
            prop_assert_eq!(evaluation.sufficient, matches!(verdict, Verdict::Sufficient));
        }
    }

    #[test]
    fn evidence_accumulates_in_iteration_order(
        verdicts in prop::collection::vec(verdict(), 0..6),
        max_iterations in 1u32..=4,
    ) {
        let Run { record, snapshots } = run_to_completion(&verdicts, max_iterations);

        prop_assert_eq!(record.evidence.len() as u32, 2 * record.iteration_count);
        prop_assert_eq!(snapshots.len() as u32, record.iteration_count);
        for (round, snapshot) in snapshots.iter().enumerate() {
            prop_assert_eq!(snapshot.len(), 2 * (round + 1));
        }
        // Each round's log is a prefix of the next and of the final one.
        let mut logs = snapshots.clone();
        logs.push(record.evidence.clone());
        for pair in logs.windows(2) {
            prop_assert!(pair[0].len() <= pair[1].len());
            prop_assert_eq!(&pair[1][..pair[0].len()], &pair[0][..]);
        }
        prop_assert!(record.evidence.windows(2).all(|w| w[0].iteration <= w[1].iteration));
        for iteration in 1..=record.iteration_count {
            let mut branches: Vec<Branch> = record
                .evidence_for(iteration)
                .map(|e| e.branch)
                .collect();
            branches.sort();
            prop_assert_eq!(branches, vec![Branch::Metrics, Branch::Logs]);
        }
    }
}
