//! Shared mesh secret loading.
//!
//! One symmetric key per trust group, provisioned out of band into a local
//! keys file:
//!
//! ```yaml
//! mesh_hmac_key: "SOME_LONG_RANDOM_SECRET"
//! ```
//!
//! The key never leaves this module except as a borrowed byte slice for
//! HMAC computation, and is wiped from memory on drop.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use zeroize::Zeroizing;

/// Errors loading the shared secret. Export and import both fail fast on these.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// The keys file does not exist.
    #[error("keys file not found at {path}; cannot sign or verify mesh packets")]
    NotFound {
        /// Expected keys file location.
        path: PathBuf,
    },

    /// The keys file exists but could not be read.
    #[error("failed to read keys file {path}: {source}")]
    Read {
        /// Keys file location.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The keys file is not valid YAML.
    #[error("failed to parse keys file {path}: {source}")]
    Parse {
        /// Keys file location.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// The keys file has no usable `mesh_hmac_key` entry.
    #[error("mesh_hmac_key missing or empty in {path}")]
    MissingKey {
        /// Keys file location.
        path: PathBuf,
    },
}

/// Symmetric secret shared by one trust group.
#[derive(Clone)]
pub struct SharedSecret(Zeroizing<Vec<u8>>);

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

impl SharedSecret {
    /// Wrap raw key material. Returns `None` for an empty key.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Option<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return None;
        }
        Some(Self(Zeroizing::new(bytes)))
    }

    /// Key bytes for MAC computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// On-disk shape of the keys file. Unrelated entries are ignored.
#[derive(Debug, Deserialize)]
struct KeysFile {
    #[serde(default)]
    mesh_hmac_key: Option<serde_yaml::Value>,
}

/// Load the mesh secret from a YAML keys file.
///
/// # Errors
///
/// Returns [`SecretError`] if the file is absent, unreadable, unparseable,
/// or lacks a non-empty `mesh_hmac_key`.
pub fn load_secret(path: &Path) -> Result<SharedSecret, SecretError> {
    if !path.exists() {
        return Err(SecretError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let contents = Zeroizing::new(std::fs::read_to_string(path).map_err(|source| {
        SecretError::Read {
            path: path.to_path_buf(),
            source,
        }
    })?);

    parse_secret(&contents).map_err(|err| match err {
        ParseFailure::Yaml(source) => SecretError::Parse {
            path: path.to_path_buf(),
            source,
        },
        ParseFailure::Missing => SecretError::MissingKey {
            path: path.to_path_buf(),
        },
    })
}

enum ParseFailure {
    Yaml(serde_yaml::Error),
    Missing,
}

fn parse_secret(contents: &str) -> Result<SharedSecret, ParseFailure> {
    // An empty document deserializes to unit, not a mapping.
    if contents.trim().is_empty() {
        return Err(ParseFailure::Missing);
    }
    let keys: KeysFile = serde_yaml::from_str(contents).map_err(ParseFailure::Yaml)?;

    let raw = match keys.mesh_hmac_key {
        Some(serde_yaml::Value::String(s)) => Zeroizing::new(s),
        Some(serde_yaml::Value::Number(n)) => Zeroizing::new(n.to_string()),
        _ => return Err(ParseFailure::Missing),
    };

    SharedSecret::new(raw.trim().as_bytes().to_vec()).ok_or(ParseFailure::Missing)
}
