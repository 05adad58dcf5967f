//! Local admission policy for inbound ghosts.
//!
//! The policy lives only on this node and is never imported from peers.
//! It is read from a small YAML file:
//!
//! ```yaml
//! allowed_patterns:
//!   - grooming_escalation
//! manipulation_margin: 0.02
//! ```
//!
//! Missing or malformed entries fall back to their defaults individually,
//! so one bad line never disables the whole policy. A missing file means
//! defaults; a file that exists but cannot be read is an error.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::ghost::{check_value, contains_denied_key, Ghost, GhostRejection, ALLOWED_FIELDS};

/// Margin subtracted from an observed manipulation score when proposing a cutoff.
pub const DEFAULT_MANIPULATION_MARGIN: f64 = 0.02;

/// The policy file exists but could not be read.
#[derive(Debug, thiserror::Error)]
#[error("failed to read mesh policy {path}: {source}")]
pub struct PolicyError {
    /// Policy file location.
    pub path: PathBuf,
    /// Underlying I/O error.
    pub source: std::io::Error,
}

/// Admission policy for inbound ghosts.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshPolicy {
    allowed_patterns: Vec<String>,
    manipulation_margin: f64,
}

impl Default for MeshPolicy {
    fn default() -> Self {
        Self {
            allowed_patterns: Vec::new(),
            manipulation_margin: DEFAULT_MANIPULATION_MARGIN,
        }
    }
}

impl MeshPolicy {
    /// Build a policy. An invalid margin falls back to the default.
    pub fn new(allowed_patterns: Vec<String>, manipulation_margin: f64) -> Self {
        let manipulation_margin = if is_valid_margin(manipulation_margin) {
            manipulation_margin
        } else {
            DEFAULT_MANIPULATION_MARGIN
        };
        Self {
            allowed_patterns,
            manipulation_margin,
        }
    }

    /// Patterns accepted from peers. Empty means every pattern is accepted.
    pub fn allowed_patterns(&self) -> &[String] {
        &self.allowed_patterns
    }

    /// Margin in `[0, 1]` used by the suggestion deriver.
    pub fn manipulation_margin(&self) -> f64 {
        self.manipulation_margin
    }

    /// Whether `pattern` passes the allow-list.
    pub fn allows(&self, pattern: &str) -> bool {
        self.allowed_patterns.is_empty() || self.allowed_patterns.iter().any(|p| p == pattern)
    }
}

/// A negative margin would propose a looser cutoff than the one observed.
fn is_valid_margin(margin: f64) -> bool {
    margin.is_finite() && (0.0..=1.0).contains(&margin)
}

/// Load the policy file. Absence is not an error; defaults apply.
///
/// # Errors
///
/// Returns [`PolicyError`] if the file exists but cannot be read.
pub fn load_policy(path: &Path) -> Result<MeshPolicy, PolicyError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(parse_policy(&contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no mesh policy file, using defaults");
            Ok(MeshPolicy::default())
        }
        Err(source) => Err(PolicyError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parse policy YAML, falling back per entry on anything malformed.
pub fn parse_policy(contents: &str) -> MeshPolicy {
    let mut policy = MeshPolicy::default();

    let doc: serde_yaml::Value = match serde_yaml::from_str(contents) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, "mesh policy is not valid YAML, using defaults");
            return policy;
        }
    };
    let map = match doc {
        serde_yaml::Value::Mapping(map) => map,
        serde_yaml::Value::Null => return policy,
        _ => {
            warn!("mesh policy root is not a mapping, using defaults");
            return policy;
        }
    };

    match map.get("allowed_patterns") {
        None | Some(serde_yaml::Value::Null) => {}
        Some(serde_yaml::Value::Sequence(items)) => {
            for item in items {
                match item {
                    serde_yaml::Value::String(p) if !p.trim().is_empty() => {
                        policy.allowed_patterns.push(p.trim().to_owned());
                    }
                    _ => warn!("ignoring non-string entry in allowed_patterns"),
                }
            }
        }
        Some(_) => warn!("allowed_patterns is not a list, using default"),
    }

    match map.get("manipulation_margin") {
        None => {}
        Some(value) => {
            let margin = match value {
                serde_yaml::Value::Number(n) => n.as_f64(),
                serde_yaml::Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            match margin.filter(|m| is_valid_margin(*m)) {
                Some(m) => policy.manipulation_margin = m,
                None => warn!("manipulation_margin is malformed or out of [0, 1], using default"),
            }
        }
    }

    policy
}

/// Admission check for one inbound ghost from a verified packet.
///
/// Re-validates everything the sender's filter should already have done:
/// no denied keys at any depth, no keys outside the allowed field set, only
/// numbers and short strings, required fields and valid action, numeric
/// ranges. Then applies the local pattern allow-list.
pub fn admit(ghost: &Value, policy: &MeshPolicy) -> Result<Ghost, GhostRejection> {
    let Value::Object(fields) = ghost else {
        return Err(GhostRejection::NotAnObject);
    };
    if contains_denied_key(ghost) {
        return Err(GhostRejection::DeniedKey);
    }
    if fields
        .keys()
        .any(|key| !ALLOWED_FIELDS.contains(&key.as_str()))
    {
        return Err(GhostRejection::UnknownKey);
    }
    for value in fields.values() {
        check_value(value)?;
    }

    let admitted = Ghost::from_fields(fields)?;
    if !policy.allows(admitted.pattern()) {
        return Err(GhostRejection::PatternNotAllowed);
    }
    Ok(admitted)
}
