//! Tests for `src/logging.rs`.

use ghostmesh::logging::LoggingGuard;

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn init_with_file_creates_logs_dir() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("logs").join("mesh");
    assert!(!logs_dir.exists());

    // Only one global subscriber may exist per process, so the result is
    // not asserted; the directory is created before installation.
    let _result = ghostmesh::logging::init_with_file(&logs_dir);
    assert!(logs_dir.exists(), "logs directory should be created");
}
