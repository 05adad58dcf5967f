//! Packet export: ghosts from recent guardian events, sealed into one new file.
//!
//! Each export is a fresh, independently verifiable artifact. The exporter
//! never overwrites or appends to an existing packet, and writes nothing at
//! all when the shared secret is unavailable.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ExportConfig, MeshPaths};
use crate::events::{EventSource, SourcedEvent};
use crate::ghost::make_ghost;
use crate::packet::{Packet, PacketError};
use crate::secret::{load_secret, SecretError, SharedSecret};
use crate::store::{read_json_list, write_json_atomic, FileLock, StoreError};

/// File extension of exported packets.
pub const PACKET_EXTENSION: &str = "mesh";

/// Upper bound on `_<n>` suffixes tried when a packet name is taken.
const MAX_NAME_ATTEMPTS: u32 = 1_000;

/// Errors during export. Nothing is written when any of these occur before
/// the packet file is in place.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The shared secret could not be loaded.
    #[error("shared secret unavailable")]
    Secret(#[from] SecretError),

    /// The event source failed.
    #[error("failed to read guardian events: {0}")]
    Events(#[source] std::io::Error),

    /// The packet could not be encoded.
    #[error(transparent)]
    Packet(#[from] PacketError),

    /// The packet file could not be written.
    #[error("failed to write packet into {dir}: {source}")]
    Write {
        /// Outbox directory.
        dir: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The export ledger could not be read or updated.
    #[error(transparent)]
    Ledger(#[from] StoreError),
}

/// A sealed packet plus bookkeeping from the filter pass.
#[derive(Debug, Clone)]
pub struct ExportedPacket {
    /// The sealed packet.
    pub packet: Packet,
    /// Events the ghost filter refused.
    pub rejected: usize,
}

/// What an export call produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    /// The new packet file.
    pub path: PathBuf,
    /// Ghosts in the packet.
    pub ghosts: usize,
    /// Events refused by the ghost filter.
    pub rejected: usize,
    /// Events skipped because an earlier export carried them.
    pub duplicates: usize,
}

/// Filter events into ghosts and seal them, in collection order.
///
/// # Errors
///
/// Returns [`PacketError`] if sealing fails.
pub fn build_packet(
    events: &[SourcedEvent],
    secret: &SharedSecret,
    created_at: i64,
) -> Result<ExportedPacket, PacketError> {
    let mut ghosts = Vec::with_capacity(events.len());
    let mut rejected: usize = 0;
    for sourced in events {
        match make_ghost(&sourced.event) {
            Ok(ghost) => ghosts.push(ghost),
            Err(kind) => {
                rejected = rejected.saturating_add(1);
                debug!(reason = %kind, "event rejected by ghost filter");
            }
        }
    }
    let packet = Packet::seal(ghosts, created_at, secret)?;
    Ok(ExportedPacket { packet, rejected })
}

/// Seal a packet from raw events, stamped with the current time.
///
/// # Errors
///
/// Returns [`PacketError`] if sealing fails.
pub fn export(events: &[Value], secret: &SharedSecret) -> Result<Packet, PacketError> {
    let sourced = events
        .iter()
        .cloned()
        .map(SourcedEvent::new)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(build_packet(&sourced, secret, chrono::Utc::now().timestamp())?.packet)
}

/// Full export: load the secret, sample events, drop ones already exported,
/// seal, write a new packet file, then record what was exported.
///
/// # Errors
///
/// Returns [`ExportError`]. A missing secret fails before anything is read
/// or written.
pub fn export_packet(
    paths: &MeshPaths,
    settings: &ExportConfig,
    source: &dyn EventSource,
    created_at: i64,
) -> Result<ExportSummary, ExportError> {
    let secret = load_secret(&paths.keys_file)?;

    let ledger = settings
        .dedupe
        .then(|| ExportLedger::new(&paths.export_ledger_file, settings.ledger_capacity));
    let _ledger_lock = match &ledger {
        Some(ledger) => Some(FileLock::acquire(ledger.path())?),
        None => None,
    };

    let events = source.recent_events().map_err(ExportError::Events)?;
    let sampled = events.len();
    let fresh = match &ledger {
        Some(ledger) => ledger.unseen(events)?,
        None => events,
    };
    let duplicates = sampled.saturating_sub(fresh.len());

    let exported = build_packet(&fresh, &secret, created_at)?;
    let path = write_packet_file(&paths.outbox_dir, &exported.packet)?;

    if let Some(ledger) = &ledger {
        ledger.record(fresh.iter().map(|e| e.fingerprint.clone()))?;
    }

    let ghosts = exported.packet.ghosts().len();
    if ghosts == 0 {
        warn!(path = %path.display(), "exported packet carries no ghosts");
    }
    info!(
        path = %path.display(),
        ghosts,
        rejected = exported.rejected,
        duplicates,
        "mesh packet exported"
    );

    Ok(ExportSummary {
        path,
        ghosts,
        rejected: exported.rejected,
        duplicates,
    })
}

/// Write `packet` under a name nobody holds yet.
///
/// The content is staged in a uniquely named temp file inside the outbox,
/// then persisted with no-clobber semantics. Every staging file is private to
/// its writer, so concurrent exports with the same timestamp each land under
/// their own `_<n>` name. The temp file is removed on every failure path.
fn write_packet_file(outbox: &Path, packet: &Packet) -> Result<PathBuf, ExportError> {
    let write_err = |source: std::io::Error| ExportError::Write {
        dir: outbox.to_path_buf(),
        source,
    };
    fs::create_dir_all(outbox).map_err(write_err)?;

    let stem = format!("packet_{}", packet.created_at());
    let json = packet.to_pretty_json()?;

    let mut staged = tempfile::Builder::new()
        .prefix(".packet_")
        .suffix(".tmp")
        .tempfile_in(outbox)
        .map_err(write_err)?;
    staged.write_all(json.as_bytes()).map_err(write_err)?;
    staged.write_all(b"\n").map_err(write_err)?;
    staged.as_file().sync_all().map_err(write_err)?;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{stem}.{PACKET_EXTENSION}")
        } else {
            format!("{stem}_{attempt}.{PACKET_EXTENSION}")
        };
        let target = outbox.join(name);
        match staged.persist_noclobber(&target) {
            Ok(_) => return Ok(target),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => staged = e.file,
            Err(e) => return Err(write_err(e.error)),
        }
    }
    Err(write_err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        "no free packet name",
    )))
}

/// Fingerprints of events already exported. Local only; never shared.
#[derive(Debug, Clone)]
struct ExportLedger {
    path: PathBuf,
    capacity: usize,
}

impl ExportLedger {
    fn new(path: &Path, capacity: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            capacity,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Drop events seen in earlier exports or earlier in this batch.
    fn unseen(&self, events: Vec<SourcedEvent>) -> Result<Vec<SourcedEvent>, StoreError> {
        let known: Vec<String> = read_json_list(&self.path)?;
        let mut seen: HashSet<String> = known.into_iter().collect();
        Ok(events
            .into_iter()
            .filter(|e| seen.insert(e.fingerprint.clone()))
            .collect())
    }

    /// Append fingerprints, keeping only the newest `capacity`.
    /// Callers hold the ledger lock.
    fn record(&self, fingerprints: impl Iterator<Item = String>) -> Result<(), StoreError> {
        let mut known: Vec<String> = read_json_list(&self.path)?;
        let before = known.len();
        known.extend(fingerprints);
        if known.len() == before {
            return Ok(());
        }
        let overflow = known.len().saturating_sub(self.capacity);
        if overflow > 0 {
            known.drain(..overflow);
        }
        write_json_atomic(&self.path, &known)
    }
}
