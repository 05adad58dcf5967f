//! Guardian event sources for export.
//!
//! The guardian runtime writes one JSON object per line into `*.jsonl`
//! files. Export samples only the few most recent files, which bounds packet
//! size and keeps stale evidence out of circulation.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::packet::{fingerprint, PacketError};

/// One guardian event with a local fingerprint.
///
/// The fingerprint is the hex SHA-256 of the event's canonical encoding.
/// It stays on this node and only feeds the export ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedEvent {
    /// The raw event mapping.
    pub event: Value,
    /// Hex SHA-256 of the canonical event.
    pub fingerprint: String,
}

impl SourcedEvent {
    /// Wrap an event and compute its fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError`] if the event cannot be canonically encoded.
    pub fn new(event: Value) -> Result<Self, PacketError> {
        let fingerprint = fingerprint(&event)?;
        Ok(Self { event, fingerprint })
    }
}

/// Supplier of recent guardian events, oldest first.
pub trait EventSource {
    /// Collect recent events in log order.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the source itself is unavailable.
    fn recent_events(&self) -> std::io::Result<Vec<SourcedEvent>>;
}

/// Reads the newest `*.jsonl` files of a runtime log directory.
#[derive(Debug, Clone)]
pub struct JsonlLogSource {
    dir: PathBuf,
    sample_files: usize,
}

impl JsonlLogSource {
    /// Source over `dir`, sampling at most `sample_files` files.
    pub fn new(dir: impl Into<PathBuf>, sample_files: usize) -> Self {
        Self {
            dir: dir.into(),
            sample_files,
        }
    }

    /// Log files to read, oldest first. Names sort chronologically.
    fn sampled_files(&self) -> std::io::Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "runtime log directory missing");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "jsonl"))
            .collect();
        files.sort();

        let skip = files.len().saturating_sub(self.sample_files);
        Ok(files.split_off(skip))
    }
}

impl EventSource for JsonlLogSource {
    fn recent_events(&self) -> std::io::Result<Vec<SourcedEvent>> {
        let mut events = Vec::new();
        for path in self.sampled_files()? {
            read_jsonl(&path, &mut events);
        }
        Ok(events)
    }
}

/// Append the parseable lines of one file. Unreadable files and bad lines
/// are skipped; their content is never logged.
fn read_jsonl(path: &Path, out: &mut Vec<SourcedEvent>) {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            debug!(path = %path.display(), kind = ?e.kind(), "skipping unreadable runtime log");
            return;
        }
    };

    let mut skipped: usize = 0;
    for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<Value>(line).map(SourcedEvent::new) {
            Ok(Ok(sourced)) => out.push(sourced),
            Ok(Err(_)) | Err(_) => skipped = skipped.saturating_add(1),
        }
    }
    if skipped > 0 {
        debug!(path = %path.display(), skipped, "skipped unparseable log lines");
    }
}

/// Events already held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticEventSource {
    events: Vec<Value>,
}

impl StaticEventSource {
    /// Source yielding `events` in order.
    pub fn new(events: Vec<Value>) -> Self {
        Self { events }
    }
}

impl EventSource for StaticEventSource {
    fn recent_events(&self) -> std::io::Result<Vec<SourcedEvent>> {
        self.events
            .iter()
            .cloned()
            .map(|event| {
                SourcedEvent::new(event)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })
            .collect()
    }
}
