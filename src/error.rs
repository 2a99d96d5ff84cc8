/*============================================================
  Synavera Project: Sparkler
  Module: sparkler_core::error
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Centralise Sparkler error types to provide consistent
    diagnostics and exit semantics.

  Security / Safety Notes:
    Error contexts never include catalog credentials; only
    paths, URLs and version identifiers are exposed.

  Dependencies:
    thiserror for ergonomic error definitions.

  Operational Scope:
    Used across modules to propagate setup failures and
    consolidate exit codes for the binary entry point.

  Revision History:
    2026-10-16 COD  Established shared error definitions.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit error taxonomy with actionable context
    - No silent failure paths
    - Stable exit codes for operational tooling
============================================================*/

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use thiserror::Error;

/// Result alias for Sparkler operations.
pub type Result<T> = std::result::Result<T, SparklerError>;

/// Enumerates high-level error domains surfaced by Sparkler.
#[derive(Debug, Error)]
pub enum SparklerError {
    #[error("Signing tool not found at {}", .path.display())]
    SigningToolMissing { path: PathBuf },
    #[error("Signing {} failed with status {status}: {stderr}", .artifact.display())]
    SigningFailed {
        artifact: PathBuf,
        status: i32,
        stderr: String,
    },
    #[error("Public key missing{}", describe_optional_path(.path))]
    PublicKeyMissing { path: Option<PathBuf> },
    #[error("Private key not found at {}", .path.display())]
    PrivateKeyMissing { path: PathBuf },
    #[error("Artifact not found at {}", .path.display())]
    ArtifactMissing { path: PathBuf },
    #[error("Feed {url} unreachable: {reason}")]
    FeedUnreachable { url: String, reason: String },
    #[error("Feed {url} malformed: {reason}")]
    FeedMalformed { url: String, reason: String },
    #[error("Catalog {url} unreachable: {reason}")]
    CatalogUnreachable { url: String, reason: String },
    #[error("Catalog {url} malformed: {reason}")]
    CatalogMalformed { url: String, reason: String },
    #[error("Catalog writes require a non-empty username and password")]
    MissingCredentials,
    #[error("No local artifact for {version} at {}", .path.display())]
    MissingLocalArtifact { version: String, path: PathBuf },
    #[error("Version {version} has no remote url and cannot be published")]
    UnpublishedVersion { version: String },
    #[error("Reconciliation left {count} unresolved discrepancies")]
    Discrepancies { count: usize },
    #[error("Required command `{command}` not found")]
    CommandMissing { command: String },
    #[error("Command `{command}` failed with status {status}: {stderr}")]
    CommandFailure {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("Configuration: {0}")]
    Config(String),
    #[error("Serialization: {0}")]
    Serialization(String),
    #[error("Filesystem: {0}")]
    Filesystem(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SparklerError {
    /// Map error category to a deterministic exit code.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            SparklerError::CommandMissing { .. } => ExitCode::from(10),
            SparklerError::CommandFailure { .. } => ExitCode::from(11),
            SparklerError::SigningToolMissing { .. } => ExitCode::from(12),
            SparklerError::SigningFailed { .. } => ExitCode::from(13),
            SparklerError::Config(_) => ExitCode::from(20),
            SparklerError::PublicKeyMissing { .. } => ExitCode::from(21),
            SparklerError::PrivateKeyMissing { .. } => ExitCode::from(22),
            SparklerError::MissingCredentials => ExitCode::from(23),
            SparklerError::FeedUnreachable { .. } => ExitCode::from(30),
            SparklerError::CatalogUnreachable { .. } => ExitCode::from(31),
            SparklerError::FeedMalformed { .. } => ExitCode::from(32),
            SparklerError::CatalogMalformed { .. } => ExitCode::from(33),
            SparklerError::Serialization(_) => ExitCode::from(34),
            SparklerError::Filesystem(_) => ExitCode::from(40),
            SparklerError::Io(_) => ExitCode::from(41),
            SparklerError::ArtifactMissing { .. } => ExitCode::from(42),
            SparklerError::UnpublishedVersion { .. } => ExitCode::from(50),
            SparklerError::MissingLocalArtifact { .. } => ExitCode::from(60),
            SparklerError::Discrepancies { .. } => ExitCode::from(61),
        }
    }

    /// Errors that make every further item check pointless.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            SparklerError::CommandMissing { .. }
                | SparklerError::SigningToolMissing { .. }
                | SparklerError::PublicKeyMissing { .. }
                | SparklerError::PrivateKeyMissing { .. }
                | SparklerError::Config(_)
        )
    }
}

fn describe_optional_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" at {}", path.display()),
        None => " (not configured)".to_string(),
    }
}
