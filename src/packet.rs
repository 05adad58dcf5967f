//! Mesh packet format and integrity tag.
//!
//! A packet is a JSON mapping with `version`, `created_at`, `ghosts` and
//! `integrity_tag`. The tag is a hex HMAC-SHA256 over the canonical encoding
//! of every other field: keys sorted at every depth, compact separators.
//! Any implementation reproducing that encoding can verify our packets.

use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::ghost::Ghost;
use crate::secret::SharedSecret;

type HmacSha256 = Hmac<Sha256>;

/// Version string written into every packet.
pub const PACKET_VERSION: &str = "ghostmesh/1";

/// Name of the field holding the integrity tag.
pub const TAG_FIELD: &str = "integrity_tag";

/// Errors encoding or decoding packets.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// JSON encoding failed.
    #[error("failed to encode packet: {0}")]
    Encode(#[from] serde_json::Error),

    /// The input is not a packet-shaped JSON object.
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// The MAC could not be keyed.
    #[error("invalid mesh key")]
    InvalidKey,
}

/// A sealed, write-once exchange packet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Packet {
    version: String,
    created_at: i64,
    ghosts: Vec<Ghost>,
    integrity_tag: String,
}

impl Packet {
    /// Build a packet from ghosts in collection order and attach its tag.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError`] if the body cannot be encoded.
    pub fn seal(
        ghosts: Vec<Ghost>,
        created_at: i64,
        secret: &SharedSecret,
    ) -> Result<Self, PacketError> {
        let mut body = Map::new();
        body.insert("version".to_owned(), Value::from(PACKET_VERSION));
        body.insert("created_at".to_owned(), Value::from(created_at));
        body.insert("ghosts".to_owned(), serde_json::to_value(&ghosts)?);

        let integrity_tag = compute_tag(secret, &canonical_body(&body)?)?;
        Ok(Self {
            version: PACKET_VERSION.to_owned(),
            created_at,
            ghosts,
            integrity_tag,
        })
    }

    /// Packet format version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Creation time in epoch seconds.
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Ghosts in collection order.
    pub fn ghosts(&self) -> &[Ghost] {
        &self.ghosts
    }

    /// Hex HMAC-SHA256 tag.
    pub fn integrity_tag(&self) -> &str {
        &self.integrity_tag
    }

    /// Packet as a JSON value, tag included.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Encode`] if serialization fails.
    pub fn to_value(&self) -> Result<Value, PacketError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Human-readable file form. Verification does not depend on layout.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Encode`] if serialization fails.
    pub fn to_pretty_json(&self) -> Result<String, PacketError> {
        Ok(serde_json::to_string_pretty(&canonicalize(&self.to_value()?))?)
    }

    /// Check this packet's tag against `secret`.
    pub fn verify(&self, secret: &SharedSecret) -> bool {
        self.to_value()
            .map(|value| verify(&value, secret))
            .unwrap_or(false)
    }
}

/// Recompute and compare the tag of a decoded packet.
///
/// The comparison is constant-time. A missing, non-string or non-hex tag
/// fails verification, as does anything that is not a JSON object.
pub fn verify(packet: &Value, secret: &SharedSecret) -> bool {
    let Value::Object(fields) = packet else {
        return false;
    };
    let Some(Value::String(tag)) = fields.get(TAG_FIELD) else {
        return false;
    };
    let Ok(expected) = hex::decode(tag) else {
        return false;
    };
    let Ok(body) = canonical_body(fields) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(&body);
    mac.verify_slice(&expected).is_ok()
}

/// Decode packet bytes into a JSON object without trusting any of it.
///
/// # Errors
///
/// Returns [`PacketError::Malformed`] for invalid JSON or a non-object root.
pub fn parse_packet(bytes: &[u8]) -> Result<Value, PacketError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| PacketError::Malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(PacketError::Malformed(
            "packet root is not an object".to_owned(),
        ));
    }
    Ok(value)
}

/// Canonical bytes of a packet mapping with the tag field removed.
///
/// # Errors
///
/// Returns [`PacketError::Encode`] if serialization fails.
pub fn canonical_body(fields: &Map<String, Value>) -> Result<Vec<u8>, PacketError> {
    let mut body = fields.clone();
    body.remove(TAG_FIELD);
    canonical_json(&Value::Object(body))
}

/// Compact JSON with keys sorted at every depth.
///
/// # Errors
///
/// Returns [`PacketError::Encode`] if serialization fails.
pub fn canonical_json(value: &Value) -> Result<Vec<u8>, PacketError> {
    Ok(serde_json::to_vec(&canonicalize(value))?)
}

/// Hex SHA-256 of a value's canonical encoding.
///
/// # Errors
///
/// Returns [`PacketError::Encode`] if the value cannot be encoded. Distinct
/// events must never share a fingerprint, so there is no fallback digest.
pub fn fingerprint(value: &Value) -> Result<String, PacketError> {
    let bytes = canonical_json(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Hex HMAC-SHA256 of `bytes` under `secret`.
///
/// # Errors
///
/// Returns [`PacketError::InvalidKey`] if the MAC cannot be keyed.
pub fn compute_tag(secret: &SharedSecret, bytes: &[u8]) -> Result<String, PacketError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| PacketError::InvalidKey)?;
    mac.update(bytes);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Rebuild maps with sorted keys so the encoding does not depend on
/// serde_json's map ordering feature.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (key, nested) in entries {
                sorted.insert(key.clone(), canonicalize(nested));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
