//! Import tests: verification gate, admission and queueing.

use ghostmesh::ghost::make_ghost;
use ghostmesh::ingest::{ingest_packet, ingest_value, IngestError, IngestStatus, RejectReason};
use ghostmesh::packet::{compute_tag, canonical_body, Packet, TAG_FIELD};
use ghostmesh::policy::MeshPolicy;
use ghostmesh::secret::SharedSecret;
use ghostmesh::store::PendingStore;
use ghostmesh::suggestion::SuggestionStatus;
use serde_json::{json, Value};

fn secret(s: &str) -> SharedSecret {
    SharedSecret::new(s).expect("secret")
}

fn halt_ghost() -> Value {
    json!({
        "pattern": "grooming_escalation",
        "manipulation_score": 0.14,
        "halt_latency_ms": 52,
        "guardian_action": "halt",
        "jurisdiction": "UK",
    })
}

fn sealed(events: &[Value], key: &str) -> Value {
    let ghosts = events
        .iter()
        .map(|e| make_ghost(e).expect("ghost"))
        .collect();
    Packet::seal(ghosts, 1_700_000_000, &secret(key))
        .expect("seal")
        .to_value()
        .expect("value")
}

/// Sign an arbitrary mapping, bypassing the exporter's filter.
fn forge(mut body: Value, key: &str) -> Value {
    let fields = body.as_object_mut().expect("object");
    fields.remove(TAG_FIELD);
    let tag = compute_tag(&secret(key), &canonical_body(fields).expect("body")).expect("tag");
    fields.insert(TAG_FIELD.to_owned(), Value::from(tag));
    body
}

fn store() -> (tempfile::TempDir, PendingStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = PendingStore::new(dir.path().join("mesh_pending_safety.json"));
    (dir, store)
}

#[test]
fn verified_packet_queues_suggestions() {
    let (_dir, pending) = store();
    let packet = sealed(&[halt_ghost()], "k1");
    let report =
        ingest_value(&packet, &secret("k1"), &MeshPolicy::default(), &pending, 5).expect("ingest");

    assert_eq!(report.status, IngestStatus::Ok);
    assert_eq!(report.accepted, 1);
    assert_eq!(report.rejected, 0);
    assert_eq!(report.pending_file.as_deref(), Some(pending.path()));

    let items = pending.list().expect("list");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].actions().len(), 3);
    assert_eq!(items[0].status(), SuggestionStatus::PendingHumanReview);
    assert_eq!(items[0].proposed_at(), 5);
}

#[test]
fn wrong_key_rejects_whole_packet() {
    let (_dir, pending) = store();
    let packet = sealed(&[halt_ghost()], "k1");
    let report =
        ingest_value(&packet, &secret("k2"), &MeshPolicy::default(), &pending, 5).expect("ingest");

    assert_eq!(report.status, IngestStatus::Reject);
    assert_eq!(report.reason, Some(RejectReason::SignatureFailed));
    assert_eq!((report.accepted, report.rejected), (0, 0));
    assert!(!pending.path().exists());
}

#[test]
fn tampered_ghost_rejects_whole_packet() {
    let (_dir, pending) = store();
    let mut packet = sealed(&[halt_ghost()], "k1");
    packet["ghosts"][0]["manipulation_score"] = json!(0.9);
    let report =
        ingest_value(&packet, &secret("k1"), &MeshPolicy::default(), &pending, 5).expect("ingest");
    assert_eq!(report.reason, Some(RejectReason::SignatureFailed));
    assert!(!pending.path().exists());
}

#[test]
fn signed_but_leaky_ghost_is_rejected_individually() {
    let (_dir, pending) = store();
    let mut leaky = halt_ghost();
    leaky["user_id"] = json!("u-1");
    let mut missing = halt_ghost();
    missing.as_object_mut().expect("object").remove("jurisdiction");
    let packet = forge(
        json!({
            "version": "ghostmesh/1",
            "created_at": 1,
            "ghosts": [halt_ghost(), leaky, missing],
        }),
        "k1",
    );

    let report =
        ingest_value(&packet, &secret("k1"), &MeshPolicy::default(), &pending, 5).expect("ingest");
    assert_eq!(report.status, IngestStatus::Ok);
    assert_eq!((report.accepted, report.rejected), (1, 2));
    assert_eq!(pending.list().expect("list").len(), 1);
}

#[test]
fn unknown_version_is_rejected_after_verification() {
    let (_dir, pending) = store();
    let packet = forge(
        json!({"version": "ghostmesh/99", "created_at": 1, "ghosts": []}),
        "k1",
    );
    let report =
        ingest_value(&packet, &secret("k1"), &MeshPolicy::default(), &pending, 5).expect("ingest");
    assert_eq!(report.reason, Some(RejectReason::UnsupportedVersion));
}

#[test]
fn ghosts_without_actions_are_counted_as_skipped() {
    let (_dir, pending) = store();
    let quiet = json!({"pattern": "p", "guardian_action": "allow", "jurisdiction": "EU"});
    let packet = sealed(&[quiet, halt_ghost()], "k1");
    let report =
        ingest_value(&packet, &secret("k1"), &MeshPolicy::default(), &pending, 5).expect("ingest");
    assert_eq!(report.accepted, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(pending.list().expect("list").len(), 1);
}

#[test]
fn allow_list_rejects_unlisted_patterns() {
    let (_dir, pending) = store();
    let packet = sealed(&[halt_ghost()], "k1");
    let policy = MeshPolicy::new(vec!["self_harm_encouragement".to_owned()], 0.02);
    let report = ingest_value(&packet, &secret("k1"), &policy, &pending, 5).expect("ingest");
    assert_eq!((report.accepted, report.rejected), (0, 1));
    assert!(pending.list().expect("list").is_empty());
}

#[test]
fn packet_file_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    let keys = dir.path().join("keys.yaml");
    let policy = dir.path().join("mesh_policy.yaml");
    let pending = PendingStore::new(dir.path().join("pending.json"));
    let packet_path = dir.path().join("packet.mesh");

    // No key: hard failure.
    std::fs::write(&packet_path, "{}").expect("write");
    let err = ingest_packet(&packet_path, &keys, &policy, &pending, 5).expect_err("no key");
    assert!(matches!(err, IngestError::Secret(_)));

    std::fs::write(&keys, "mesh_hmac_key: k1\n").expect("write key");

    // Not JSON: whole-packet reject.
    std::fs::write(&packet_path, "not json").expect("write");
    let report = ingest_packet(&packet_path, &keys, &policy, &pending, 5).expect("ingest");
    assert_eq!(report.reason, Some(RejectReason::MalformedPacket));

    // Pretty-printed valid packet.
    let packet = sealed(&[halt_ghost()], "k1");
    std::fs::write(
        &packet_path,
        serde_json::to_string_pretty(&packet).expect("json"),
    )
    .expect("write");
    let report = ingest_packet(&packet_path, &keys, &policy, &pending, 5).expect("ingest");
    assert_eq!(report.status, IngestStatus::Ok);
    assert_eq!(report.accepted, 1);

    // Unreadable packet path.
    let err = ingest_packet(&dir.path().join("absent.mesh"), &keys, &policy, &pending, 5)
        .expect_err("missing packet");
    assert!(matches!(err, IngestError::Read { .. }));
}

#[test]
fn report_serializes_without_empty_fields() {
    let (_dir, pending) = store();
    let packet = sealed(&[halt_ghost()], "k1");
    let report =
        ingest_value(&packet, &secret("k2"), &MeshPolicy::default(), &pending, 5).expect("ingest");
    let value = serde_json::to_value(&report).expect("serialize");
    assert_eq!(
        value,
        json!({
            "status": "reject",
            "reason": "signature_failed",
            "accepted": 0,
            "rejected": 0,
            "skipped": 0,
        })
    );
}
