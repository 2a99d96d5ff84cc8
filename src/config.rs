/*============================================================
  Synavera Project: Sparkler
  Module: sparkler_core::config
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Load Sparkler configuration from TOML, layering defaults,
    the operator's file, and environment overrides.

  Security / Safety Notes:
    Catalog credentials may be supplied via environment to
    keep them out of files on disk. They are never logged.

  Dependencies:
    toml + serde for parsing, dirs for XDG locations.

  Operational Scope:
    Read once at startup by the binary entry point; the
    resulting sections configure each client.

  Revision History:
    2026-10-16 COD  Authored configuration loader.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit defaults for every tunable
    - Missing explicit files are errors, missing defaults are not
============================================================*/

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, SparklerError};

const USERNAME_ENV: &str = "SPARKLER_CATALOG_USERNAME";
const PASSWORD_ENV: &str = "SPARKLER_CATALOG_PASSWORD";

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SparklerConfig {
    pub working_directory: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub signing: SigningConfig,
    pub feed: FeedConfig,
    pub catalog: CatalogConfig,
}

/// External signing and verification tools.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    pub sign_update: PathBuf,
    pub openssl: PathBuf,
    /// Digest flag handed to `openssl dgst` when verifying.
    pub verify_digest: String,
    pub private_key: Option<PathBuf>,
    pub public_key: Option<PathBuf>,
    /// Directory for the digest/signature scratch files.
    pub temp_dir: Option<PathBuf>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            sign_update: PathBuf::from("/usr/local/bin/sign_update"),
            openssl: PathBuf::from("/usr/bin/openssl"),
            verify_digest: "-sha1".to_string(),
            private_key: None,
            public_key: None,
            temp_dir: None,
        }
    }
}

/// Appcast location.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: Option<String>,
    /// Request timeout in seconds; 0 disables it.
    pub timeout: u64,
}

/// Catalog service location and credentials.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub app: String,
    pub feed: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Request timeout in seconds; 0 disables it.
    pub timeout: u64,
}

impl SparklerConfig {
    /// Load from an explicit path, or the default location when `None`.
    pub fn load_from_optional_path(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::load(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a configuration document from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            SparklerError::Config(format!("Failed to read {}: {err}", path.display()))
        })?;
        Self::parse(&raw).map_err(|err| match err {
            SparklerError::Config(reason) => {
                SparklerError::Config(format!("{}: {reason}", path.display()))
            }
            other => other,
        })
    }

    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| SparklerError::Config(err.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(username) = env::var(USERNAME_ENV) {
            self.catalog.username = Some(username);
        }
        if let Ok(password) = env::var(PASSWORD_ENV) {
            self.catalog.password = Some(password);
        }
    }

    /// Directory holding session logs.
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| {
            dirs::state_dir()
                .or_else(dirs::data_local_dir)
                .unwrap_or_else(env::temp_dir)
                .join("sparkler")
                .join("logs")
        })
    }

    /// Working directory holding `.zip` and `.delta` artifacts.
    pub fn working_directory(&self) -> PathBuf {
        self.working_directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sparkler").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    // Process environment is shared by every test thread.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn empty_document_yields_defaults() {
        let config = SparklerConfig::parse("").unwrap();
        assert_eq!(config.signing.verify_digest, "-sha1");
        assert_eq!(config.signing.openssl, PathBuf::from("/usr/bin/openssl"));
        assert_eq!(config.feed.timeout, 0);
        assert_eq!(config.working_directory(), PathBuf::from("."));
        assert!(config.catalog.username.is_none());
    }

    #[test]
    fn sections_are_parsed() {
        let config = SparklerConfig::parse(
            r#"
            working_directory = "/srv/releases"
            report_path = "/srv/report.json"

            [signing]
            sign_update = "/opt/sparkle/sign_update"
            private_key = "/keys/dsa_priv.pem"
            public_key = "/keys/dsa_pub.pem"

            [feed]
            url = "https://example.com/appcast.xml"
            timeout = 30

            [catalog]
            base_url = "https://catalog.example.com/"
            app = "manuscripts"
            feed = "stable"
            username = "release"
            "#,
        )
        .unwrap();

        assert_eq!(config.working_directory(), PathBuf::from("/srv/releases"));
        assert_eq!(
            config.signing.sign_update,
            PathBuf::from("/opt/sparkle/sign_update")
        );
        assert_eq!(config.signing.verify_digest, "-sha1");
        assert_eq!(
            config.feed.url.as_deref(),
            Some("https://example.com/appcast.xml")
        );
        assert_eq!(config.feed.timeout, 30);
        assert_eq!(config.catalog.app, "manuscripts");
        assert_eq!(config.catalog.username.as_deref(), Some("release"));
        assert!(config.catalog.password.is_none());
    }

    #[test]
    fn unknown_types_are_config_errors() {
        let err = SparklerConfig::parse("[feed]\ntimeout = \"soon\"").unwrap_err();
        assert!(matches!(err, SparklerError::Config(_)));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("absent.toml");
        let err = SparklerConfig::load_from_optional_path(Some(absent.as_path())).unwrap_err();
        assert!(matches!(err, SparklerError::Config(_)));
    }

    #[test]
    fn environment_overrides_file_credentials() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[catalog]\nbase_url = \"https://catalog.example.com\"\nusername = \"file-user\"\n",
        )
        .unwrap();

        env::set_var(USERNAME_ENV, "ci-user");
        env::set_var(PASSWORD_ENV, "ci-secret");
        let loaded = SparklerConfig::load_from_optional_path(Some(path.as_path()));
        env::remove_var(USERNAME_ENV);
        env::remove_var(PASSWORD_ENV);

        let config = loaded.unwrap();
        assert_eq!(config.catalog.username.as_deref(), Some("ci-user"));
        assert_eq!(config.catalog.password.as_deref(), Some("ci-secret"));
        assert_eq!(config.catalog.base_url, "https://catalog.example.com");

        let untouched = SparklerConfig::load_from_optional_path(Some(path.as_path())).unwrap();
        assert_eq!(untouched.catalog.username.as_deref(), Some("file-user"));
        assert!(untouched.catalog.password.is_none());
    }
}
