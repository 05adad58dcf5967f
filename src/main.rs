//! ghostmesh CLI entry point.
//!
//! Provides `export-mesh`, `ingest-mesh`, `list-pending` and `apply`. Every
//! command prints a JSON result on stdout. Exit codes:
//!
//! | code | meaning                                   |
//! |------|-------------------------------------------|
//! | 0    | success                                   |
//! | 1    | other failure                             |
//! | 2    | packet rejected whole                     |
//! | 3    | pending index out of range                |
//! | 4    | shared secret missing or unreadable       |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::error;

use ghostmesh::mesh::Mesh;
use ghostmesh::secret::SecretError;
use ghostmesh::store::StoreError;

/// ghostmesh: signed peer exchange of guardian halt evidence.
#[derive(Parser)]
#[command(name = "ghostmesh", version, about)]
struct Cli {
    /// Deployment root; relative paths in the config resolve against it.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Config file (default: `<root>/ghostmesh.toml`, optional).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Export recent guardian halts as a new signed packet.
    ExportMesh,
    /// Verify a peer packet and queue safer-only suggestions.
    IngestMesh {
        /// Packet file received from a peer.
        packet_path: PathBuf,
    },
    /// Print the pending suggestion store.
    ListPending,
    /// Approve the pending suggestion at INDEX.
    Apply {
        /// Zero-based position in the pending store.
        index: usize,
    },
}

const EXIT_REJECTED: u8 = 2;
const EXIT_INDEX_OUT_OF_RANGE: u8 = 3;
const EXIT_SECRET: u8 = 4;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mesh = match Mesh::open(&cli.root, cli.config.as_deref()) {
        Ok(mesh) => mesh,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let _logging_guard = match ghostmesh::logging::init(&mesh.config().logging, &cli.root) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(&mesh, cli.command) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "command failed");
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn run(mesh: &Mesh, command: Command) -> anyhow::Result<ExitCode> {
    match command {
        Command::ExportMesh => {
            let summary = mesh.export_mesh()?;
            print_json(&summary)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::IngestMesh { packet_path } => {
            let report = mesh.ingest_mesh(&packet_path)?;
            print_json(&report)?;
            if report.is_rejected() {
                Ok(ExitCode::from(EXIT_REJECTED))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Command::ListPending => {
            let pending = mesh.list_pending()?;
            print_json(&pending)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Apply { index } => {
            let outcome = mesh.apply(index)?;
            print_json(&outcome)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Map a failure onto the documented exit codes by walking its cause chain.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.downcast_ref::<SecretError>().is_some() {
            return EXIT_SECRET;
        }
        if let Some(StoreError::IndexOutOfRange { .. }) = cause.downcast_ref::<StoreError>() {
            return EXIT_INDEX_OUT_OF_RANGE;
        }
    }
    1
}
