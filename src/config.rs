//! Configuration loading and path resolution.
//!
//! A deployment is a directory. `ghostmesh.toml` at its root is optional;
//! every section has defaults so a minimal or empty file is valid. Relative
//! paths are resolved against the deployment root.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Default config file name inside a deployment root.
pub const CONFIG_FILE_NAME: &str = "ghostmesh.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeshConfig {
    /// Artifact locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Export sampling and deduplication.
    #[serde(default)]
    pub export: ExportConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Locations of every artifact the mesh reads or writes.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Directory of guardian runtime logs (`*.jsonl`).
    #[serde(default = "default_runtime_log_dir")]
    pub runtime_log_dir: PathBuf,

    /// Directory receiving exported packets.
    #[serde(default = "default_outbox_dir")]
    pub outbox_dir: PathBuf,

    /// Pending suggestion store.
    #[serde(default = "default_pending_file")]
    pub pending_file: PathBuf,

    /// Append-only applied log.
    #[serde(default = "default_applied_log_file")]
    pub applied_log_file: PathBuf,

    /// Local admission policy (YAML).
    #[serde(default = "default_policy_file")]
    pub policy_file: PathBuf,

    /// Shared secret store (YAML).
    #[serde(default = "default_keys_file")]
    pub keys_file: PathBuf,

    /// Fingerprints of events already exported.
    #[serde(default = "default_export_ledger_file")]
    pub export_ledger_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            runtime_log_dir: default_runtime_log_dir(),
            outbox_dir: default_outbox_dir(),
            pending_file: default_pending_file(),
            applied_log_file: default_applied_log_file(),
            policy_file: default_policy_file(),
            keys_file: default_keys_file(),
            export_ledger_file: default_export_ledger_file(),
        }
    }
}

/// Export behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// How many of the most recent log files to sample.
    #[serde(default = "default_sample_files")]
    pub sample_files: usize,

    /// Skip events that an earlier export already carried.
    #[serde(default = "default_true")]
    pub dedupe: bool,

    /// Maximum fingerprints kept in the export ledger.
    #[serde(default = "default_ledger_capacity")]
    pub ledger_capacity: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            sample_files: default_sample_files(),
            dedupe: true,
            ledger_capacity: default_ledger_capacity(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// When set, JSON logs are also written here with daily rotation.
    #[serde(default)]
    pub logs_dir: Option<PathBuf>,
}

// Default value functions for serde

fn default_runtime_log_dir() -> PathBuf {
    PathBuf::from("logs/runtime")
}
fn default_outbox_dir() -> PathBuf {
    PathBuf::from("mesh_outbox")
}
fn default_pending_file() -> PathBuf {
    PathBuf::from("mesh_pending_safety.json")
}
fn default_applied_log_file() -> PathBuf {
    PathBuf::from("mesh_applied_log.json")
}
fn default_policy_file() -> PathBuf {
    PathBuf::from("configs/mesh_policy.yaml")
}
fn default_keys_file() -> PathBuf {
    PathBuf::from("configs/keys.yaml")
}
fn default_export_ledger_file() -> PathBuf {
    PathBuf::from("mesh_export_ledger.json")
}
fn default_sample_files() -> usize {
    5
}
fn default_ledger_capacity() -> usize {
    10_000
}
fn default_true() -> bool {
    true
}

impl MeshConfig {
    /// Validate that configuration values are within sane bounds.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first out-of-bounds value.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1..=50).contains(&self.export.sample_files),
            "export.sample_files must be in [1, 50]"
        );
        anyhow::ensure!(
            self.export.ledger_capacity >= 100,
            "export.ledger_capacity must be >= 100"
        );
        anyhow::ensure!(
            self.paths.pending_file != self.paths.applied_log_file,
            "paths.pending_file and paths.applied_log_file must differ"
        );
        Ok(())
    }
}

/// Load configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or fails validation.
pub fn load_config(path: &Path) -> anyhow::Result<MeshConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    let config: MeshConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config at {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Load configuration if the file exists, defaults otherwise.
///
/// # Errors
///
/// Returns an error if an existing file is unreadable or invalid.
pub fn load_config_or_default(path: &Path) -> anyhow::Result<MeshConfig> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(MeshConfig::default())
    }
}

/// Absolute artifact locations for one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshPaths {
    /// Deployment root.
    pub root: PathBuf,
    /// Guardian runtime log directory.
    pub runtime_log_dir: PathBuf,
    /// Packet outbox.
    pub outbox_dir: PathBuf,
    /// Pending suggestion store.
    pub pending_file: PathBuf,
    /// Applied log.
    pub applied_log_file: PathBuf,
    /// Local admission policy.
    pub policy_file: PathBuf,
    /// Shared secret store.
    pub keys_file: PathBuf,
    /// Export ledger.
    pub export_ledger_file: PathBuf,
}

impl MeshPaths {
    /// Resolve configured paths against `root`. Absolute paths are kept.
    pub fn resolve(root: &Path, paths: &PathsConfig) -> Self {
        let at = |p: &Path| root.join(p);
        Self {
            root: root.to_path_buf(),
            runtime_log_dir: at(&paths.runtime_log_dir),
            outbox_dir: at(&paths.outbox_dir),
            pending_file: at(&paths.pending_file),
            applied_log_file: at(&paths.applied_log_file),
            policy_file: at(&paths.policy_file),
            keys_file: at(&paths.keys_file),
            export_ledger_file: at(&paths.export_ledger_file),
        }
    }
}
