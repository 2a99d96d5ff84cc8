/*============================================================
  Synavera Project: Sparkler
  Module: sparkler_core::signature
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Produce and check DSA signatures of release artifacts by
    delegating to the external signing tool and openssl.

  Security / Safety Notes:
    Private keys are only ever passed by path to the signing
    tool. Digest and signature scratch files are removed on
    every exit path.

  Dependencies:
    tokio::process for command execution, tempfile for scoped
    scratch files, base64 for signature decoding.

  Operational Scope:
    Called by the local scanner (sign) and the reconciliation
    engine (verify).

  Revision History:
    2026-10-16 COD  Crafted external signature engine.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic command invocation with explicit checks
    - Scoped cleanup of temporary material
    - Reusable helpers for external command diagnostics
============================================================*/

use std::ffi::OsStr;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::config::SigningConfig;
use crate::error::{Result, SparklerError};

/// Exact text openssl prints for a good signature.
pub const VERIFIED_OK: &str = "Verified OK";

/// Capability to sign artifacts and verify their signatures.
#[async_trait]
pub trait SignatureProvider: Send + Sync {
    /// Produce a base64 signature for `file` using `private_key`.
    async fn sign(&self, file: &Path, private_key: &Path) -> Result<String>;

    /// Check `signature` (base64) of `file` against `public_key`.
    async fn verify(&self, file: &Path, signature: &str, public_key: Option<&Path>)
        -> Result<bool>;
}

/// Signature engine backed by `sign_update` and `openssl`.
#[derive(Debug, Clone)]
pub struct ExternalSigner {
    sign_tool: PathBuf,
    openssl: PathBuf,
    verify_digest: String,
    temp_dir: PathBuf,
}

impl ExternalSigner {
    pub fn new(config: &SigningConfig) -> Self {
        Self {
            sign_tool: config.sign_update.clone(),
            openssl: config.openssl.clone(),
            verify_digest: config.verify_digest.clone(),
            temp_dir: config
                .temp_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
        }
    }

    async fn digest(&self, file: &Path) -> Result<Vec<u8>> {
        let output = run_tool(
            &self.openssl,
            &[
                OsStr::new("dgst"),
                OsStr::new("-sha1"),
                OsStr::new("-binary"),
                file.as_os_str(),
            ],
        )
        .await?;
        if !output.status.success() {
            return Err(command_failure(&self.openssl, "dgst -sha1 -binary", &output));
        }
        Ok(output.stdout)
    }

    fn scratch_file(&self, prefix: &str, contents: &[u8]) -> Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix(prefix)
            .tempfile_in(&self.temp_dir)
            .map_err(|err| {
                SparklerError::Filesystem(format!(
                    "Failed to create scratch file in {}: {err}",
                    self.temp_dir.display()
                ))
            })?;
        file.write_all(contents)?;
        file.flush()?;
        Ok(file)
    }
}

#[async_trait]
impl SignatureProvider for ExternalSigner {
    async fn sign(&self, file: &Path, private_key: &Path) -> Result<String> {
        if !self.sign_tool.exists() {
            return Err(SparklerError::SigningToolMissing {
                path: self.sign_tool.clone(),
            });
        }

        let output = run_tool(&self.sign_tool, &[file.as_os_str(), private_key.as_os_str()]).await?;
        if !output.status.success() {
            return Err(SparklerError::SigningFailed {
                artifact: file.to_path_buf(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout).map_err(|err| {
            SparklerError::Serialization(format!(
                "{} emitted invalid UTF-8: {err}",
                self.sign_tool.display()
            ))
        })?;
        Ok(trim_line_terminator(&stdout).to_string())
    }

    async fn verify(
        &self,
        file: &Path,
        signature: &str,
        public_key: Option<&Path>,
    ) -> Result<bool> {
        let public_key = require_public_key(public_key)?;
        if !file.exists() {
            return Err(SparklerError::ArtifactMissing {
                path: file.to_path_buf(),
            });
        }

        // Undecodable base64 cannot be a valid signature.
        let Ok(signature_bytes) = BASE64.decode(signature.trim()) else {
            return Ok(false);
        };

        let digest = self.digest(file).await?;
        // Both files are removed when dropped, including on `?` returns.
        let digest_file = self.scratch_file("sparkler-digest-", &digest)?;
        let signature_file = self.scratch_file("sparkler-signature-", &signature_bytes)?;

        let output = run_tool(
            &self.openssl,
            &[
                OsStr::new("dgst"),
                OsStr::new(&self.verify_digest),
                OsStr::new("-verify"),
                public_key.as_os_str(),
                OsStr::new("-signature"),
                signature_file.path().as_os_str(),
                digest_file.path().as_os_str(),
            ],
        )
        .await?;

        // openssl exits non-zero on "Verification Failure"; only a silent failure is an error.
        if output.stdout.is_empty() && !output.status.success() {
            return Err(command_failure(&self.openssl, "dgst -verify", &output));
        }
        let verdict = String::from_utf8_lossy(&output.stdout);
        Ok(trim_line_terminator(&verdict) == VERIFIED_OK)
    }
}

/// Ensure a public key path is configured and present on disk.
pub fn require_public_key(public_key: Option<&Path>) -> Result<&Path> {
    match public_key {
        Some(path) if !path.as_os_str().is_empty() && path.exists() => Ok(path),
        Some(path) if !path.as_os_str().is_empty() => Err(SparklerError::PublicKeyMissing {
            path: Some(path.to_path_buf()),
        }),
        _ => Err(SparklerError::PublicKeyMissing { path: None }),
    }
}

/// Strip exactly one trailing `\n` or `\r\n`.
pub fn trim_line_terminator(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

async fn run_tool(program: &Path, args: &[&OsStr]) -> Result<Output> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|err| map_spawn_error(err, program))
}

fn command_failure(program: &Path, args: &str, output: &Output) -> SparklerError {
    SparklerError::CommandFailure {
        command: format!("{} {args}", program.display()),
        status: output.status.code().unwrap_or(-1),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

fn map_spawn_error(err: io::Error, program: &Path) -> SparklerError {
    if err.kind() == io::ErrorKind::NotFound {
        SparklerError::CommandMissing {
            command: program.display().to_string(),
        }
    } else {
        SparklerError::Filesystem(format!("Failed to spawn {}: {err}", program.display()))
    }
}
