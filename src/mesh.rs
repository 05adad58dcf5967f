//! One deployment's mesh operations behind a single handle.
//!
//! This is the surface the CLI wraps: `export-mesh`, `ingest-mesh`,
//! `list-pending` and `apply`. Each call is a short, self-contained file
//! transaction stamped with the current time.

use std::path::Path;

use anyhow::Context;

use crate::apply::{apply, ApplyOutcome};
use crate::config::{load_config_or_default, MeshConfig, MeshPaths, CONFIG_FILE_NAME};
use crate::events::{EventSource, JsonlLogSource};
use crate::export::{export_packet, ExportError, ExportSummary};
use crate::ingest::{ingest_packet, IngestError, IngestReport};
use crate::store::{PendingStore, StoreError};
use crate::suggestion::Suggestion;

/// Mesh operations for one deployment root.
#[derive(Debug, Clone)]
pub struct Mesh {
    config: MeshConfig,
    paths: MeshPaths,
}

impl Mesh {
    /// Handle over `root` with an already loaded configuration.
    pub fn new(root: &Path, config: MeshConfig) -> Self {
        let paths = MeshPaths::resolve(root, &config.paths);
        Self { config, paths }
    }

    /// Load `config_path` (default `<root>/ghostmesh.toml`, optional) and
    /// build a handle.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing config file is unreadable or invalid.
    pub fn open(root: &Path, config_path: Option<&Path>) -> anyhow::Result<Self> {
        let default_path = root.join(CONFIG_FILE_NAME);
        let config_path = config_path.unwrap_or(default_path.as_path());
        let config = load_config_or_default(config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?;
        Ok(Self::new(root, config))
    }

    /// Loaded configuration.
    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// Resolved artifact locations.
    pub fn paths(&self) -> &MeshPaths {
        &self.paths
    }

    /// The pending suggestion store.
    pub fn pending_store(&self) -> PendingStore {
        PendingStore::new(&self.paths.pending_file)
    }

    /// Export recent runtime log events into a new packet.
    ///
    /// # Errors
    ///
    /// See [`export_packet`].
    pub fn export_mesh(&self) -> Result<ExportSummary, ExportError> {
        let source = JsonlLogSource::new(
            &self.paths.runtime_log_dir,
            self.config.export.sample_files,
        );
        self.export_from(&source)
    }

    /// Export events from any source into a new packet.
    ///
    /// # Errors
    ///
    /// See [`export_packet`].
    pub fn export_from(&self, source: &dyn EventSource) -> Result<ExportSummary, ExportError> {
        export_packet(&self.paths, &self.config.export, source, now())
    }

    /// Verify and import a packet file.
    ///
    /// # Errors
    ///
    /// See [`ingest_packet`].
    pub fn ingest_mesh(&self, packet_path: &Path) -> Result<IngestReport, IngestError> {
        ingest_packet(
            packet_path,
            &self.paths.keys_file,
            &self.paths.policy_file,
            &self.pending_store(),
            now(),
        )
    }

    /// All stored suggestions, in store order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store is unreadable or malformed.
    pub fn list_pending(&self) -> Result<Vec<Suggestion>, StoreError> {
        self.pending_store().list()
    }

    /// Approve the suggestion at `index`.
    ///
    /// # Errors
    ///
    /// See [`apply`].
    pub fn apply(&self, index: usize) -> Result<ApplyOutcome, StoreError> {
        apply(
            &self.pending_store(),
            &self.paths.applied_log_file,
            index,
            now(),
        )
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
