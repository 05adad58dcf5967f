//! Admission policy tests.

use ghostmesh::ghost::GhostRejection;
use ghostmesh::policy::{admit, load_policy, parse_policy, MeshPolicy, DEFAULT_MANIPULATION_MARGIN};
use serde_json::json;

fn inbound() -> serde_json::Value {
    json!({
        "pattern": "grooming_escalation",
        "manipulation_score": 0.14,
        "halt_latency_ms": 52,
        "guardian_action": "halt",
        "jurisdiction": "UK",
    })
}

#[test]
fn missing_policy_file_uses_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let policy = load_policy(&dir.path().join("absent.yaml")).expect("defaults");
    assert_eq!(policy, MeshPolicy::default());
    assert!((policy.manipulation_margin() - DEFAULT_MANIPULATION_MARGIN).abs() < f64::EPSILON);
}

#[test]
fn policy_file_is_read_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("mesh_policy.yaml");
    std::fs::write(
        &path,
        "allowed_patterns:\n  - grooming_escalation\nmanipulation_margin: 0.05\n",
    )
    .expect("write");
    let policy = load_policy(&path).expect("policy");
    assert_eq!(policy.allowed_patterns(), ["grooming_escalation".to_owned()]);
    assert!((policy.manipulation_margin() - 0.05).abs() < f64::EPSILON);
}

#[test]
fn unreadable_policy_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    // A directory exists at the path but cannot be read as a file.
    let path = dir.path().join("mesh_policy.yaml");
    std::fs::create_dir(&path).expect("mkdir");
    assert!(load_policy(&path).is_err());
}

#[test]
fn garbage_policy_falls_back_to_defaults() {
    assert_eq!(parse_policy("allowed_patterns: [unclosed\n"), MeshPolicy::default());
    assert_eq!(parse_policy("- just\n- a list\n"), MeshPolicy::default());
}

#[test]
fn out_of_range_margin_falls_back() {
    let policy = parse_policy("manipulation_margin: 1.5\n");
    assert!((policy.manipulation_margin() - DEFAULT_MANIPULATION_MARGIN).abs() < f64::EPSILON);
    let policy = MeshPolicy::new(Vec::new(), f64::NAN);
    assert!((policy.manipulation_margin() - DEFAULT_MANIPULATION_MARGIN).abs() < f64::EPSILON);
}

#[test]
fn admits_clean_ghost() {
    let ghost = admit(&inbound(), &MeshPolicy::default()).expect("admitted");
    assert_eq!(ghost.pattern(), "grooming_escalation");
}

#[test]
fn allow_list_filters_patterns() {
    let policy = MeshPolicy::new(vec!["other_pattern".to_owned()], 0.02);
    assert_eq!(
        admit(&inbound(), &policy),
        Err(GhostRejection::PatternNotAllowed)
    );
}

#[test]
fn inbound_denied_key_is_rejected_even_when_signed() {
    let mut ghost = inbound();
    ghost["session_id"] = json!("abc");
    assert_eq!(
        admit(&ghost, &MeshPolicy::default()),
        Err(GhostRejection::DeniedKey)
    );
}

#[test]
fn inbound_unknown_key_is_rejected() {
    let mut ghost = inbound();
    ghost["free_text_hint"] = json!("x");
    assert_eq!(
        admit(&ghost, &MeshPolicy::default()),
        Err(GhostRejection::UnknownKey)
    );
}

#[test]
fn inbound_oversized_string_is_rejected() {
    let mut ghost = inbound();
    ghost["jurisdiction"] = json!("U".repeat(65));
    assert_eq!(
        admit(&ghost, &MeshPolicy::default()),
        Err(GhostRejection::OversizedString)
    );
}

#[test]
fn inbound_missing_jurisdiction_is_rejected() {
    let mut ghost = inbound();
    ghost.as_object_mut().expect("object").remove("jurisdiction");
    assert_eq!(
        admit(&ghost, &MeshPolicy::default()),
        Err(GhostRejection::MissingField)
    );
}
