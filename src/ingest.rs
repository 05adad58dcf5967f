//! Packet import: verify, admit, derive, queue.
//!
//! Verification is a hard gate. Until the integrity tag checks out nothing
//! in the packet is looked at, and a failed check rejects the whole packet.
//! After that, ghosts are admitted or refused one by one.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::packet::{parse_packet, verify, PACKET_VERSION};
use crate::policy::{admit, load_policy, MeshPolicy, PolicyError};
use crate::secret::{load_secret, SecretError, SharedSecret};
use crate::store::{PendingStore, StoreError};
use crate::suggestion::{derive, Suggestion};

/// Errors that abort an import outright.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The shared secret could not be loaded.
    #[error("shared secret unavailable")]
    Secret(#[from] SecretError),

    /// The local policy file exists but is unreadable.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// The packet file could not be read.
    #[error("failed to read packet {path}: {source}")]
    Read {
        /// Packet location.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The pending store could not be updated.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Overall import outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// The packet verified; per-ghost counts apply.
    Ok,
    /// The packet was refused whole.
    Reject,
}

/// Why a packet was refused whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Missing or mismatched integrity tag.
    SignatureFailed,
    /// Not a packet-shaped JSON document.
    MalformedPacket,
    /// Verified, but written in a format version this node does not read.
    UnsupportedVersion,
}

/// Structured import result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Overall outcome.
    pub status: IngestStatus,
    /// Set when `status` is `reject`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    /// Ghosts that passed admission.
    pub accepted: usize,
    /// Ghosts refused by admission.
    pub rejected: usize,
    /// Accepted ghosts that yielded no tightening action.
    pub skipped: usize,
    /// Store the suggestions were queued into.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_file: Option<PathBuf>,
}

impl IngestReport {
    /// Whole-packet rejection with zero counts.
    pub fn reject(reason: RejectReason) -> Self {
        Self {
            status: IngestStatus::Reject,
            reason: Some(reason),
            accepted: 0,
            rejected: 0,
            skipped: 0,
            pending_file: None,
        }
    }

    /// Whether the packet was refused whole.
    pub fn is_rejected(&self) -> bool {
        self.status == IngestStatus::Reject
    }
}

/// Import a packet file into the pending store.
///
/// # Errors
///
/// Returns [`IngestError`] when the secret is missing, the policy or packet
/// file is unreadable, or the store cannot be updated. A packet that fails
/// verification is not an error; it yields a `reject` report.
pub fn ingest_packet(
    packet_path: &Path,
    keys_file: &Path,
    policy_file: &Path,
    pending: &PendingStore,
    now: i64,
) -> Result<IngestReport, IngestError> {
    let secret = load_secret(keys_file)?;
    let policy = load_policy(policy_file)?;

    let bytes = std::fs::read(packet_path).map_err(|source| IngestError::Read {
        path: packet_path.to_path_buf(),
        source,
    })?;
    let packet = match parse_packet(&bytes) {
        Ok(packet) => packet,
        Err(e) => {
            warn!(path = %packet_path.display(), error = %e, "packet rejected");
            return Ok(IngestReport::reject(RejectReason::MalformedPacket));
        }
    };

    let report = ingest_value(&packet, &secret, &policy, pending, now)?;
    if report.is_rejected() {
        warn!(path = %packet_path.display(), reason = ?report.reason, "packet rejected");
    }
    Ok(report)
}

/// Import an already decoded packet.
///
/// # Errors
///
/// Returns [`StoreError`] if the pending store cannot be updated.
pub fn ingest_value(
    packet: &Value,
    secret: &SharedSecret,
    policy: &MeshPolicy,
    pending: &PendingStore,
    now: i64,
) -> Result<IngestReport, StoreError> {
    if !verify(packet, secret) {
        return Ok(IngestReport::reject(RejectReason::SignatureFailed));
    }

    if packet.get("version").and_then(Value::as_str) != Some(PACKET_VERSION) {
        return Ok(IngestReport::reject(RejectReason::UnsupportedVersion));
    }
    let Some(ghosts) = packet.get("ghosts").and_then(Value::as_array) else {
        return Ok(IngestReport::reject(RejectReason::MalformedPacket));
    };

    let mut accepted: usize = 0;
    let mut rejected: usize = 0;
    let mut suggestions: Vec<Suggestion> = Vec::new();
    for raw in ghosts {
        match admit(raw, policy) {
            Ok(ghost) => {
                accepted = accepted.saturating_add(1);
                suggestions.push(derive(&ghost, policy, now));
            }
            Err(kind) => {
                rejected = rejected.saturating_add(1);
                debug!(reason = %kind, "inbound ghost rejected");
            }
        }
    }

    let queued = pending.enqueue_all(suggestions)?;
    let skipped = accepted.saturating_sub(queued);

    info!(accepted, rejected, queued, skipped, "mesh packet ingested");
    Ok(IngestReport {
        status: IngestStatus::Ok,
        reason: None,
        accepted,
        rejected,
        skipped,
        pending_file: Some(pending.path().to_path_buf()),
    })
}
