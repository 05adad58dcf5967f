//! Shared secret loading tests.

use ghostmesh::secret::{load_secret, SecretError};

#[test]
fn loads_key_from_yaml() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("keys.yaml");
    std::fs::write(&path, "mesh_hmac_key: \"  k1  \"\n").expect("write");
    let secret = load_secret(&path).expect("secret");
    assert_eq!(secret.as_bytes(), b"k1");
}

#[test]
fn missing_file_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load_secret(&dir.path().join("keys.yaml")).expect_err("should fail");
    assert!(matches!(err, SecretError::NotFound { .. }));
}

#[test]
fn file_without_key_is_missing_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("keys.yaml");
    for contents in ["", "other_key: abc\n", "mesh_hmac_key: \"\"\n", "mesh_hmac_key:\n"] {
        std::fs::write(&path, contents).expect("write");
        let err = load_secret(&path).expect_err("should fail");
        assert!(
            matches!(err, SecretError::MissingKey { .. }),
            "contents {contents:?} gave {err:?}"
        );
    }
}

#[test]
fn invalid_yaml_is_a_parse_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("keys.yaml");
    std::fs::write(&path, "mesh_hmac_key: [unclosed\n").expect("write");
    let err = load_secret(&path).expect_err("should fail");
    assert!(matches!(err, SecretError::Parse { .. }));
}

#[test]
fn error_messages_never_contain_key_material() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("keys.yaml");
    std::fs::write(&path, "mesh_hmac_key: [\"super-secret-value\"\n").expect("write");
    let err = load_secret(&path).expect_err("should fail");
    assert!(!format!("{err}").contains("super-secret-value"));
}
