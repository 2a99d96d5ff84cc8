#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Url;
use sparkler_core::catalog::VersionCatalog;
use sparkler_core::logger::Logger;
use sparkler_core::model::Version;
use sparkler_core::signature::SignatureProvider;
use sparkler_core::Result;
use tempfile::TempDir;

/// Signs `good-<file name>`; a signature verifies only in that form.
#[derive(Default)]
pub struct FakeSigner {
    pub signs: AtomicUsize,
    pub verifies: AtomicUsize,
}

impl FakeSigner {
    pub fn signature_for(file_name: &str) -> String {
        format!("good-{file_name}")
    }

    pub fn verify_calls(&self) -> usize {
        self.verifies.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignatureProvider for FakeSigner {
    async fn sign(&self, file: &Path, _private_key: &Path) -> Result<String> {
        self.signs.fetch_add(1, Ordering::SeqCst);
        Ok(Self::signature_for(&file_name(file)))
    }

    async fn verify(
        &self,
        file: &Path,
        signature: &str,
        _public_key: Option<&Path>,
    ) -> Result<bool> {
        self.verifies.fetch_add(1, Ordering::SeqCst);
        Ok(signature == Self::signature_for(&file_name(file)))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

/// Catalog held in memory; writes replace the first record with the same id.
pub struct InMemoryCatalog {
    pub versions: Mutex<Vec<Version>>,
    pub updates: Mutex<Vec<Version>>,
    pub reject: Option<&'static str>,
}

impl InMemoryCatalog {
    pub fn new(versions: Vec<Version>) -> Self {
        Self {
            versions: Mutex::new(versions),
            updates: Mutex::new(Vec::new()),
            reject: None,
        }
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn lengths_of(&self, version: &str) -> Vec<u64> {
        self.versions
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.version == version)
            .map(|entry| entry.length)
            .collect()
    }
}

#[async_trait]
impl VersionCatalog for InMemoryCatalog {
    async fn list_versions(&self) -> Result<Vec<Version>> {
        Ok(self.versions.lock().unwrap().clone())
    }

    async fn update_version(&self, version: &Version, logger: &Logger) -> Result<bool> {
        self.updates.lock().unwrap().push(version.clone());
        if self.reject == Some(version.version.as_str()) {
            logger.error("WRITEBACK", format!("rejected {}", version.version));
            return Ok(false);
        }
        let mut versions = self.versions.lock().unwrap();
        if let Some(entry) = versions.iter_mut().find(|entry| entry.version == version.version) {
            entry.length = version.length;
        }
        Ok(true)
    }
}

pub fn remote(version: &str, length: u64) -> Version {
    Version::remote(
        version.to_string(),
        sparkler_core::model::short_version(version).to_string(),
        FakeSigner::signature_for(&format!("{version}.zip")),
        length,
        Url::parse(&format!("https://dl.example.com/{version}.zip")).unwrap(),
    )
}

/// Working directory with a key pair and the given files.
pub struct Workspace {
    pub dir: TempDir,
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

impl Workspace {
    pub fn new(files: &[(&str, usize)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let keys = dir.path().join("keys");
        std::fs::create_dir(&keys).unwrap();
        let private_key = keys.join("dsa_priv.pem");
        let public_key = keys.join("dsa_pub.pem");
        std::fs::write(&private_key, b"private").unwrap();
        std::fs::write(&public_key, b"public").unwrap();

        let workspace = Self {
            dir,
            private_key,
            public_key,
        };
        for (name, size) in files {
            workspace.write(name, *size);
        }
        workspace
    }

    pub fn write(&self, name: &str, size: usize) {
        std::fs::write(self.path().join(name), vec![0u8; size]).unwrap();
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
