//! Suggestion derivation tests.

use ghostmesh::policy::{admit, MeshPolicy};
use ghostmesh::suggestion::{
    derive, Action, ActionKind, Direction, SuggestionStatus, MESH_IMPORT_SOURCE,
};
use serde_json::json;

fn derive_from(value: serde_json::Value, policy: &MeshPolicy) -> ghostmesh::suggestion::Suggestion {
    let ghost = admit(&value, policy).expect("admitted");
    derive(&ghost, policy, 1_700_000_000)
}

#[test]
fn full_ghost_yields_three_ordered_actions() {
    let s = derive_from(
        json!({
            "pattern": "grooming_escalation",
            "manipulation_score": 0.14,
            "halt_latency_ms": 52,
            "guardian_action": "halt",
            "jurisdiction": "UK",
        }),
        &MeshPolicy::default(),
    );

    assert_eq!(s.pattern(), "grooming_escalation");
    assert_eq!(s.source(), MESH_IMPORT_SOURCE);
    assert_eq!(s.status(), SuggestionStatus::PendingHumanReview);
    assert_eq!(s.proposed_at(), 1_700_000_000);
    assert_eq!(s.actions().len(), 3);
    assert_eq!(s.notes().len(), 3);

    match s.actions()[0].kind() {
        ActionKind::TightenThreshold { new_value, .. } => {
            assert!((new_value - 0.12).abs() < 1e-9, "got {new_value}");
        }
        other => panic!("expected threshold action, got {other:?}"),
    }
    assert_eq!(s.actions()[1], Action::tighten_latency(52));
    assert_eq!(s.actions()[2], Action::high_risk_pattern("grooming_escalation"));
    assert!(s
        .actions()
        .iter()
        .all(|a| a.direction() == Direction::SaferOnly));
    assert_eq!(
        s.notes()[0],
        "Observed halt at manipulation_score≈0.140; propose cutoff 0.120."
    );
    assert_eq!(s.notes()[1], "Peer halted in 52ms; propose matching or faster.");
}

#[test]
fn small_score_floors_at_zero() {
    let s = derive_from(
        json!({
            "pattern": "p",
            "manipulation_score": 0.01,
            "guardian_action": "allow",
            "jurisdiction": "EU",
        }),
        &MeshPolicy::default(),
    );
    assert_eq!(s.actions(), [Action::tighten_threshold(0.0)]);
}

#[test]
fn custom_margin_is_applied() {
    let policy = MeshPolicy::new(Vec::new(), 0.1);
    let s = derive_from(
        json!({
            "pattern": "p",
            "manipulation_score": 0.5,
            "guardian_action": "escalate",
            "jurisdiction": "EU",
        }),
        &policy,
    );
    assert_eq!(s.actions(), [Action::tighten_threshold(0.4)]);
}

#[test]
fn non_halt_without_numbers_yields_no_actions() {
    let s = derive_from(
        json!({"pattern": "p", "guardian_action": "allow", "jurisdiction": "EU"}),
        &MeshPolicy::default(),
    );
    assert!(s.actions().is_empty());
}

#[test]
fn halt_only_marks_high_risk() {
    let s = derive_from(
        json!({"pattern": "p", "guardian_action": "halt", "jurisdiction": "EU"}),
        &MeshPolicy::default(),
    );
    assert_eq!(s.actions(), [Action::high_risk_pattern("p")]);
}

#[test]
fn action_wire_form_carries_direction() {
    let value = serde_json::to_value(Action::tighten_latency(52)).expect("serialize");
    assert_eq!(
        value,
        json!({
            "type": "tighten_latency",
            "field": "max_halt_latency_ms",
            "new_value": 52,
            "direction": "safer_only",
        })
    );
}

#[test]
fn loosening_actions_cannot_be_read_back() {
    let raw = json!({
        "type": "tighten_threshold",
        "field": "manipulation_score_cutoff",
        "new_value": 0.9,
        "direction": "looser",
    });
    assert!(serde_json::from_value::<Action>(raw).is_err());
}

fn cutoff(s: &ghostmesh::suggestion::Suggestion) -> f64 {
    match s.actions()[0].kind() {
        ActionKind::TightenThreshold { new_value, .. } => *new_value,
        other => panic!("expected threshold action, got {other:?}"),
    }
}

#[test]
fn proposed_cutoff_never_exceeds_score_minus_margin() {
    let cases = [(0.99999, 0.0), (0.12346, 0.02), (0.50005, 0.0), (1.0, 0.0)];
    for (score, margin) in cases {
        let policy = MeshPolicy::new(Vec::new(), margin);
        let s = derive_from(
            json!({
                "pattern": "p",
                "manipulation_score": score,
                "guardian_action": "allow",
                "jurisdiction": "EU",
            }),
            &policy,
        );
        let limit: f64 = score - margin;
        assert!(cutoff(&s) <= limit, "score {score} margin {margin}: {}", cutoff(&s));
    }
}

#[test]
fn cutoff_sweep_stays_at_or_below_observed_score() {
    let policy = MeshPolicy::new(Vec::new(), 0.0);
    for i in 0..=20_000u32 {
        let score = f64::from(i) / 20_000.0 + 0.000_013;
        if score > 1.0 {
            continue;
        }
        let s = derive_from(
            json!({
                "pattern": "p",
                "manipulation_score": score,
                "guardian_action": "allow",
                "jurisdiction": "EU",
            }),
            &policy,
        );
        assert!(cutoff(&s) <= score, "score {score}: {}", cutoff(&s));
    }
}
