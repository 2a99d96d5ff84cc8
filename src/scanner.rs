/*============================================================
  Synavera Project: Sparkler
  Module: sparkler_core::scanner
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Enumerate release artifacts in the working directory and
    describe each as a signed local Version record.

  Security / Safety Notes:
    Reads the working directory non-recursively. The private
    key is checked before the directory is touched.

  Dependencies:
    tokio::fs for directory iteration.

  Operational Scope:
    Feeds local facts into catalog reconciliation and the
    `scan` subcommand.

  Revision History:
    2026-10-16 COD  Authored lazy artifact scanner.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Fail fast on setup errors
    - Work performed on demand, one artifact at a time
============================================================*/

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tokio::fs::{self, ReadDir};

use crate::error::{Result, SparklerError};
use crate::model::{Version, ARTIFACT_EXTENSION};
use crate::signature::SignatureProvider;

/// Forward-only, single-pass sequence of local artifacts.
///
/// Each call to [`LocalScan::next`] lists the next directory entry, and
/// for artifacts reads its length and signs it. Order follows the OS
/// directory listing. After an error or exhaustion the scan yields `None`.
pub struct LocalScan<'a, S: SignatureProvider + ?Sized> {
    entries: Option<ReadDir>,
    directory: PathBuf,
    private_key: PathBuf,
    signer: &'a S,
}

impl<'a, S: SignatureProvider + ?Sized> LocalScan<'a, S> {
    /// Begin scanning `directory`, failing first if `private_key` is absent.
    pub async fn open(directory: &Path, private_key: &Path, signer: &'a S) -> Result<Self> {
        if !private_key.exists() {
            return Err(SparklerError::PrivateKeyMissing {
                path: private_key.to_path_buf(),
            });
        }

        let entries = fs::read_dir(directory).await.map_err(|err| {
            SparklerError::Filesystem(format!(
                "Failed to list working directory {}: {err}",
                directory.display()
            ))
        })?;

        Ok(Self {
            entries: Some(entries),
            directory: directory.to_path_buf(),
            private_key: private_key.to_path_buf(),
            signer,
        })
    }

    /// Produce the next artifact, or `None` once the directory is exhausted.
    pub async fn next(&mut self) -> Result<Option<Version>> {
        let result = self.advance().await;
        if !matches!(result, Ok(Some(_))) {
            self.entries = None;
        }
        result
    }

    /// Drain the remaining artifacts into a list.
    pub async fn collect(mut self) -> Result<Vec<Version>> {
        let mut versions = Vec::new();
        while let Some(version) = self.next().await? {
            versions.push(version);
        }
        Ok(versions)
    }

    async fn advance(&mut self) -> Result<Option<Version>> {
        let Some(entries) = self.entries.as_mut() else {
            return Ok(None);
        };

        while let Some(entry) = entries.next_entry().await.map_err(|err| {
            SparklerError::Filesystem(format!(
                "Failed to read entry in {}: {err}",
                self.directory.display()
            ))
        })? {
            let path = entry.path();
            let Some(version) = artifact_version(&path) else {
                continue;
            };
            // Entries that vanish or cannot be stat'ed are not artifacts.
            let Ok(metadata) = fs::metadata(&path).await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            let signature = self.signer.sign(&path, &self.private_key).await?;
            return Ok(Some(Version::local(
                version.to_string(),
                signature,
                metadata.len(),
                path,
            )));
        }
        Ok(None)
    }
}

/// Version identifier of an artifact path, if it carries the artifact extension.
pub fn artifact_version(path: &Path) -> Option<&str> {
    if path.extension() != Some(OsStr::new(ARTIFACT_EXTENSION)) {
        return None;
    }
    path.file_stem().and_then(OsStr::to_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    /// Signs with the artifact's file name; fails on a chosen name.
    struct NameSigner {
        fail_on: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl NameSigner {
        fn new() -> Self {
            Self {
                fail_on: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SignatureProvider for NameSigner {
        async fn sign(&self, file: &Path, _private_key: &Path) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = file.file_name().unwrap().to_string_lossy().to_string();
            if Some(name.as_str()) == self.fail_on {
                return Err(SparklerError::SigningFailed {
                    artifact: file.to_path_buf(),
                    status: 1,
                    stderr: "refused".into(),
                });
            }
            Ok(format!("sig:{name}"))
        }

        async fn verify(&self, _: &Path, _: &str, _: Option<&Path>) -> Result<bool> {
            Ok(true)
        }
    }

    fn workspace(files: &[(&str, usize)]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        for (name, size) in files {
            std::fs::write(dir.path().join(name), vec![b'x'; *size]).unwrap();
        }
        let key = dir.path().join("dsa_priv.pem");
        std::fs::write(&key, b"key").unwrap();
        (dir, key)
    }

    #[test]
    fn artifact_version_strips_extension() {
        assert_eq!(artifact_version(Path::new("/w/1.2.3-45.zip")), Some("1.2.3-45"));
        assert_eq!(artifact_version(Path::new("/w/1.2.3-45.delta")), None);
        assert_eq!(artifact_version(Path::new("/w/notes.txt")), None);
        assert_eq!(artifact_version(Path::new("/w/zip")), None);
    }

    #[tokio::test]
    async fn yields_only_artifacts_with_true_lengths() {
        let (dir, key) = workspace(&[
            ("1.0-1.zip", 10),
            ("1.1-2.zip", 25),
            ("1.0-1--1.1-2.delta", 4),
            ("README.md", 3),
        ]);
        std::fs::create_dir(dir.path().join("nested.zip")).unwrap();
        let signer = NameSigner::new();

        let scan = LocalScan::open(dir.path(), &key, &signer).await.unwrap();
        let mut versions = scan.collect().await.unwrap();
        versions.sort_by(|a, b| a.version.cmp(&b.version));

        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version, "1.0-1");
        assert_eq!(versions[0].short_version, "1.0");
        assert_eq!(versions[0].length, 10);
        assert_eq!(versions[0].signature, "sig:1.0-1.zip");
        assert_eq!(
            versions[0].local_path(),
            Some(dir.path().join("1.0-1.zip").as_path())
        );
        assert_eq!(versions[1].version, "1.1-2");
        assert_eq!(versions[1].length, 25);
        assert_eq!(signer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_private_key_fails_before_listing() {
        let signer = NameSigner::new();
        let absent_dir = PathBuf::from("/definitely/not/here");
        let err = LocalScan::open(&absent_dir, &absent_dir.join("key.pem"), &signer)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SparklerError::PrivateKeyMissing { .. }));
    }

    #[tokio::test]
    async fn signs_lazily_and_stops_after_failure() {
        let (dir, key) = workspace(&[("2.0-1.zip", 1)]);
        let signer = NameSigner {
            fail_on: Some("2.0-1.zip"),
            calls: AtomicUsize::new(0),
        };

        let mut scan = LocalScan::open(dir.path(), &key, &signer).await.unwrap();
        assert_eq!(signer.calls.load(Ordering::SeqCst), 0);

        let err = scan.next().await.unwrap_err();
        assert!(matches!(err, SparklerError::SigningFailed { .. }));
        assert!(scan.next().await.unwrap().is_none());
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_directory_yields_nothing() {
        let (dir, key) = workspace(&[]);
        let signer = NameSigner::new();
        let mut scan = LocalScan::open(dir.path(), &key, &signer).await.unwrap();
        assert!(scan.next().await.unwrap().is_none());
        assert!(scan.next().await.unwrap().is_none());
    }
}
