//! Privacy reduction of guardian events into exportable ghosts.
//!
//! A ghost keeps a coarse category label, the enforcement action, the
//! jurisdiction and a few numeric signals. Nothing else leaves the node.
//! An event carrying any denied key is rejected whole: partial redaction is
//! exactly the failure mode this filter exists to prevent.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

/// Keys that must never appear anywhere in an exported event.
///
/// Raw content, identifiers, network addresses, timestamps and demographic
/// or role hints all carry re-identification risk.
pub const DENIED_KEYS: &[&str] = &[
    "raw_context",
    "full_text",
    "transcript",
    "session_id",
    "user_id",
    "actor_id",
    "conversation_id",
    "ip",
    "age_hint",
    "demographic_hint",
    "geo_hint",
    "timestamp",
    "user_role",
];

/// Fields copied from a guardian event into a ghost.
pub const ALLOWED_FIELDS: &[&str] = &[
    "pattern",
    "manipulation_score",
    "empathy_drop",
    "halt_latency_ms",
    "guardian_action",
    "jurisdiction",
];

/// Maximum length, in characters, of any string value in a ghost.
pub const MAX_STRING_LEN: usize = 64;

/// Upper bound for `halt_latency_ms`.
pub const MAX_HALT_LATENCY_MS: u32 = 10_000;

/// Enforcement decision recorded by the local guardian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardianAction {
    /// The risky action was stopped.
    Halt,
    /// The action was permitted.
    Allow,
    /// The action was routed to a human.
    Escalate,
}

impl GuardianAction {
    /// Parse the wire label (`halt`, `allow`, `escalate`).
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "halt" => Some(Self::Halt),
            "allow" => Some(Self::Allow),
            "escalate" => Some(Self::Escalate),
            _ => None,
        }
    }

    /// Wire label for this action.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Halt => "halt",
            Self::Allow => "allow",
            Self::Escalate => "escalate",
        }
    }
}

/// Why an event or inbound ghost was refused.
///
/// Rejections carry only a kind, never the offending key or value, so the
/// error path cannot itself leak content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GhostRejection {
    /// The input was not a JSON object.
    NotAnObject,
    /// A denied key was present somewhere in the input.
    DeniedKey,
    /// An inbound ghost carried a key outside the allowed field set.
    UnknownKey,
    /// A field held something other than a number or a string.
    UnsupportedValue,
    /// A string value exceeded [`MAX_STRING_LEN`].
    OversizedString,
    /// `pattern`, `guardian_action` or `jurisdiction` was missing.
    MissingField,
    /// `pattern` or `jurisdiction` was not a short category label.
    InvalidLabel,
    /// `guardian_action` was not one of halt, allow, escalate.
    InvalidAction,
    /// A score was non-finite or outside its range.
    ScoreOutOfRange,
    /// `halt_latency_ms` was not an integer in `[0, 10000]`.
    LatencyOutOfRange,
    /// The pattern is not on the local allow-list.
    PatternNotAllowed,
}

impl GhostRejection {
    /// Stable snake_case name for logs and counters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotAnObject => "not_an_object",
            Self::DeniedKey => "denied_key",
            Self::UnknownKey => "unknown_key",
            Self::UnsupportedValue => "unsupported_value",
            Self::OversizedString => "oversized_string",
            Self::MissingField => "missing_field",
            Self::InvalidLabel => "invalid_label",
            Self::InvalidAction => "invalid_action",
            Self::ScoreOutOfRange => "score_out_of_range",
            Self::LatencyOutOfRange => "latency_out_of_range",
            Self::PatternNotAllowed => "pattern_not_allowed",
        }
    }
}

impl fmt::Display for GhostRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Privacy-reduced projection of one guardian event.
///
/// Only constructible through [`make_ghost`] or the import-side admission
/// check, so every instance satisfies the size and shape invariants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ghost {
    pattern: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    manipulation_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    empathy_drop: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    halt_latency_ms: Option<u32>,
    guardian_action: GuardianAction,
    jurisdiction: String,
}

impl Ghost {
    /// Coarse category label, e.g. `grooming_escalation`.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Manipulation score in `[0, 1]`, if the event carried one.
    pub fn manipulation_score(&self) -> Option<f64> {
        self.manipulation_score
    }

    /// Observed empathy drop, if present.
    pub fn empathy_drop(&self) -> Option<f64> {
        self.empathy_drop
    }

    /// Time the guardian took to halt, in milliseconds.
    pub fn halt_latency_ms(&self) -> Option<u32> {
        self.halt_latency_ms
    }

    /// Enforcement decision.
    pub fn guardian_action(&self) -> GuardianAction {
        self.guardian_action
    }

    /// Short jurisdiction code, e.g. `UK`.
    pub fn jurisdiction(&self) -> &str {
        &self.jurisdiction
    }

    /// Validated constructor over a mapping that holds only allowed fields.
    pub(crate) fn from_fields(fields: &Map<String, Value>) -> Result<Self, GhostRejection> {
        let pattern = required_label(fields, "pattern")?;
        let jurisdiction = required_label(fields, "jurisdiction")?;

        let guardian_action = match fields.get("guardian_action") {
            None => return Err(GhostRejection::MissingField),
            Some(Value::String(label)) => {
                GuardianAction::from_label(label).ok_or(GhostRejection::InvalidAction)?
            }
            Some(_) => return Err(GhostRejection::InvalidAction),
        };

        let manipulation_score = optional_score(fields, "manipulation_score", Some((0.0, 1.0)))?;
        let empathy_drop = optional_score(fields, "empathy_drop", None)?;

        let halt_latency_ms = match fields.get("halt_latency_ms") {
            None => None,
            Some(Value::Number(n)) => Some(
                n.as_u64()
                    .and_then(|ms| u32::try_from(ms).ok())
                    .filter(|ms| *ms <= MAX_HALT_LATENCY_MS)
                    .ok_or(GhostRejection::LatencyOutOfRange)?,
            ),
            Some(_) => return Err(GhostRejection::LatencyOutOfRange),
        };

        Ok(Self {
            pattern,
            manipulation_score,
            empathy_drop,
            halt_latency_ms,
            guardian_action,
            jurisdiction,
        })
    }
}

/// Reduce a guardian event to a ghost, or reject it.
///
/// Steps: reject on any denied key (searched recursively), copy allowed
/// fields that are numbers or short strings, then validate required fields,
/// the action label and numeric ranges. Pure and infallible; the caller
/// discards rejections.
pub fn make_ghost(event: &Value) -> Result<Ghost, GhostRejection> {
    let Value::Object(fields) = event else {
        return Err(GhostRejection::NotAnObject);
    };

    if contains_denied_key(event) {
        return Err(GhostRejection::DeniedKey);
    }

    let mut kept = Map::new();
    for key in ALLOWED_FIELDS {
        if let Some(value) = fields.get(*key) {
            check_value(value)?;
            kept.insert((*key).to_owned(), value.clone());
        }
    }

    Ghost::from_fields(&kept)
}

/// True if `key` is on the deny-list (ASCII case-insensitive).
pub fn is_denied_key(key: &str) -> bool {
    DENIED_KEYS
        .iter()
        .any(|denied| denied.eq_ignore_ascii_case(key))
}

/// True if a denied key appears at any depth of `value`.
pub fn contains_denied_key(value: &Value) -> bool {
    match value {
        Value::Object(map) => map
            .iter()
            .any(|(key, nested)| is_denied_key(key) || contains_denied_key(nested)),
        Value::Array(items) => items.iter().any(contains_denied_key),
        _ => false,
    }
}

/// Accept numbers and strings of at most [`MAX_STRING_LEN`] characters.
pub(crate) fn check_value(value: &Value) -> Result<(), GhostRejection> {
    match value {
        Value::Number(_) => Ok(()),
        Value::String(s) if s.chars().count() <= MAX_STRING_LEN => Ok(()),
        Value::String(_) => Err(GhostRejection::OversizedString),
        _ => Err(GhostRejection::UnsupportedValue),
    }
}

fn required_label(fields: &Map<String, Value>, key: &str) -> Result<String, GhostRejection> {
    match fields.get(key) {
        None => Err(GhostRejection::MissingField),
        Some(Value::String(label)) if is_label(label) => Ok(label.clone()),
        Some(Value::String(label)) if label.chars().count() > MAX_STRING_LEN => {
            Err(GhostRejection::OversizedString)
        }
        Some(_) => Err(GhostRejection::InvalidLabel),
    }
}

/// Category labels: non-empty, short, no whitespace or punctuation beyond `_-.:`.
fn is_label(s: &str) -> bool {
    !s.is_empty()
        && s.chars().count() <= MAX_STRING_LEN
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

fn optional_score(
    fields: &Map<String, Value>,
    key: &str,
    bounds: Option<(f64, f64)>,
) -> Result<Option<f64>, GhostRejection> {
    let Some(value) = fields.get(key) else {
        return Ok(None);
    };
    let score = value
        .as_f64()
        .filter(|s| s.is_finite())
        .ok_or(GhostRejection::ScoreOutOfRange)?;
    if let Some((lo, hi)) = bounds {
        if !(lo..=hi).contains(&score) {
            return Err(GhostRejection::ScoreOutOfRange);
        }
    }
    Ok(Some(score))
}
