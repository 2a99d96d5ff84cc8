/*============================================================
  Synavera Project: Sparkler
  Module: sparkler_core::catalog
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Talk to the JSON release catalog: list the versions of an
    app feed and write corrected version metadata back.

  Security / Safety Notes:
    Writes use HTTP Basic authentication. Credentials are held
    in memory only and never appear in logs or errors.

  Dependencies:
    reqwest for HTTP, serde for payloads, base64 for the
    authorization header, urlencoding for path segments.

  Operational Scope:
    Remote side of the verify-catalog flow; also provides the
    catalog wire format used to print appcast contents.

  Revision History:
    2026-10-16 COD  Implemented catalog client.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Structured response parsing with explicit error paths
    - Write-back failures reported, never escalated
    - Configurable timeouts
============================================================*/

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use urlencoding::encode;

use crate::config::CatalogConfig;
use crate::error::{Result, SparklerError};
use crate::logger::Logger;
use crate::model::{Delta, Version};

/// Read/write access to published version metadata.
#[async_trait]
pub trait VersionCatalog: Send + Sync {
    /// List every version the catalog knows for this app feed.
    async fn list_versions(&self) -> Result<Vec<Version>>;

    /// Replace the catalog record for `version.version`.
    ///
    /// Returns `Ok(false)` when the catalog rejects the write or answers
    /// with something that is not a version; the cause is logged.
    async fn update_version(&self, version: &Version, logger: &Logger) -> Result<bool>;
}

/// Basic-auth credentials for catalog writes.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// `Authorization` header value: `Basic base64(username:password)`.
    pub fn basic_auth_header(&self) -> String {
        let login = format!("{}:{}", self.username, self.password);
        format!("Basic {}", BASE64.encode(login))
    }
}

/// HTTP client for the catalog service.
#[derive(Clone)]
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
    app: String,
    feed: String,
    credentials: Option<Credentials>,
}

impl CatalogClient {
    /// Construct a new client from configuration.
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(SparklerError::Config("catalog base_url is not set".into()));
        }
        let credentials = match (&config.username, &config.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        Ok(Self {
            client: build_http_client(config.timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app: config.app.clone(),
            feed: config.feed.clone(),
            credentials,
        })
    }

    pub fn versions_url(&self) -> String {
        format!(
            "{}/apps/{}/{}/versions",
            self.base_url,
            encode(&self.app),
            encode(&self.feed)
        )
    }

    pub fn version_url(&self, version: &str) -> String {
        format!("{}/{}", self.versions_url(), encode(version))
    }

    fn complete_credentials(&self) -> Result<&Credentials> {
        self.credentials
            .as_ref()
            .filter(|credentials| credentials.is_complete())
            .ok_or(SparklerError::MissingCredentials)
    }
}

#[async_trait]
impl VersionCatalog for CatalogClient {
    async fn list_versions(&self) -> Result<Vec<Version>> {
        let url = self.versions_url();
        let unreachable = |reason: String| SparklerError::CatalogUnreachable {
            url: url.clone(),
            reason,
        };
        let malformed = |reason: String| SparklerError::CatalogMalformed {
            url: url.clone(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| unreachable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(unreachable(format!("status {}", response.status())));
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| unreachable(err.to_string()))?;

        let payload: Vec<WireVersion> =
            serde_json::from_slice(&body).map_err(|err| malformed(err.to_string()))?;
        payload
            .into_iter()
            .map(|entry| entry.into_version().map_err(&malformed))
            .collect()
    }

    async fn update_version(&self, version: &Version, logger: &Logger) -> Result<bool> {
        let credentials = self.complete_credentials()?;
        let body = WireVersion::from_version(version).ok_or_else(|| {
            SparklerError::UnpublishedVersion {
                version: version.version.clone(),
            }
        })?;
        let url = self.version_url(&version.version);
        logger.info("UPDATE", format!("Updating version {} at {url}", version.version));

        let sent = self
            .client
            .put(&url)
            .header(AUTHORIZATION, credentials.basic_auth_header())
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await;
        let response = match sent {
            Ok(response) => response,
            Err(err) => {
                logger.error("WRITEBACK", format!("PUT {url} failed: {err}"));
                return Ok(false);
            }
        };

        let status = response.status();
        let payload = match response.bytes().await {
            Ok(payload) => payload,
            Err(err) => {
                logger.error("WRITEBACK", format!("Reading response from {url} failed: {err}"));
                return Ok(false);
            }
        };
        if !status.is_success() {
            logger.error(
                "WRITEBACK",
                format!(
                    "Catalog rejected {} with status {status}: {}",
                    version.version,
                    String::from_utf8_lossy(&payload).trim()
                ),
            );
            return Ok(false);
        }

        let accepted = serde_json::from_slice::<WireVersion>(&payload)
            .map_err(|err| err.to_string())
            .and_then(WireVersion::into_version);
        match accepted {
            Ok(accepted) => {
                logger.debug(
                    "WRITEBACK",
                    format!(
                        "Catalog now holds {} with length {}",
                        accepted.version, accepted.length
                    ),
                );
                Ok(true)
            }
            Err(reason) => {
                logger.error(
                    "WRITEBACK",
                    format!("Undecodable response for {}: {reason}", version.version),
                );
                Ok(false)
            }
        }
    }
}

/// Catalog JSON version object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WireVersion {
    pub url: String,
    pub version: String,
    pub short_version: String,
    pub signature: String,
    pub length: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deltas: Vec<WireDelta>,
}

/// Catalog JSON delta object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WireDelta {
    pub url: String,
    pub identifier: String,
    pub from_version: String,
    pub to_version: String,
    pub signature: String,
    pub length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_version_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_version_signature: Option<String>,
}

impl WireVersion {
    /// Encode a version; `None` when it has no remote url to publish.
    pub fn from_version(version: &Version) -> Option<Self> {
        let url = version.remote_url()?;
        Some(Self {
            url: url.to_string(),
            version: version.version.clone(),
            short_version: version.short_version.clone(),
            signature: version.signature.clone(),
            length: version.length,
            deltas: version.deltas.iter().map(WireDelta::from).collect(),
        })
    }

    /// Decode into a remote Version. Catalog listings carry no deltas.
    pub fn into_version(self) -> std::result::Result<Version, String> {
        let url = Url::parse(&self.url).map_err(|err| {
            format!("version {} has invalid url `{}`: {err}", self.version, self.url)
        })?;
        Ok(Version::remote(
            self.version,
            self.short_version,
            self.signature,
            self.length,
            url,
        ))
    }
}

impl From<&Delta> for WireDelta {
    fn from(delta: &Delta) -> Self {
        Self {
            url: delta.url.to_string(),
            identifier: delta.identifier(),
            from_version: delta.from_version.clone(),
            to_version: delta.to_version.clone(),
            signature: delta.signature.clone(),
            length: delta.length,
            from_version_signature: delta.from_version_signature.clone(),
            to_version_signature: delta.to_version_signature.clone(),
        }
    }
}

/// Shared HTTP client construction; `timeout_secs == 0` means no timeout.
pub(crate) fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    let mut builder =
        reqwest::Client::builder().user_agent(concat!("Sparkler/", env!("CARGO_PKG_VERSION")));
    if timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_secs));
    }
    builder
        .build()
        .map_err(|err| SparklerError::Config(format!("Failed to build HTTP client: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    fn config(base_url: &str) -> CatalogConfig {
        CatalogConfig {
            base_url: base_url.into(),
            app: "Manuscripts App".into(),
            feed: "stable".into(),
            username: Some("release".into()),
            password: Some("s3cret".into()),
            timeout: 0,
        }
    }

    #[test]
    fn urls_encode_path_segments() {
        let client = CatalogClient::new(&config("https://catalog.example.com/")).unwrap();
        assert_eq!(
            client.versions_url(),
            "https://catalog.example.com/apps/Manuscripts%20App/stable/versions"
        );
        assert_eq!(
            client.version_url("1.2-3"),
            "https://catalog.example.com/apps/Manuscripts%20App/stable/versions/1.2-3"
        );
    }

    #[test]
    fn basic_auth_header_encodes_login() {
        let credentials = Credentials {
            username: "release".into(),
            password: "s3cret".into(),
        };
        assert_eq!(credentials.basic_auth_header(), "Basic cmVsZWFzZTpzM2NyZXQ=");
    }

    #[test]
    fn empty_base_url_is_a_config_error() {
        assert!(matches!(
            CatalogClient::new(&config("  ")).err(),
            Some(SparklerError::Config(_))
        ));
    }

    #[test]
    fn wire_version_decodes_catalog_json() {
        let wire: WireVersion = serde_json::from_str(
            r#"{"url":"https://dl.example.com/1.0-1.zip","version":"1.0-1",
                "shortVersion":"1.0","signature":"MCw=","length":90}"#,
        )
        .unwrap();
        let version = wire.into_version().unwrap();
        assert_eq!(version.version, "1.0-1");
        assert_eq!(version.short_version, "1.0");
        assert_eq!(version.length, 90);
        assert!(version.deltas.is_empty());
    }

    #[test]
    fn wire_version_rejects_bad_url() {
        let wire = WireVersion {
            url: "not a url".into(),
            version: "1.0-1".into(),
            short_version: "1.0".into(),
            signature: "MCw=".into(),
            length: 1,
            deltas: Vec::new(),
        };
        assert!(wire.into_version().unwrap_err().contains("invalid url"));
    }

    #[test]
    fn local_only_versions_cannot_be_encoded() {
        let local = Version::local("1.0-1".into(), "sig".into(), 3, PathBuf::from("/w/1.0-1.zip"));
        assert!(WireVersion::from_version(&local).is_none());
    }

    #[test]
    fn deltas_encode_with_identifier() {
        let delta = Delta::new(
            "1.0-1".into(),
            "1.1-2".into(),
            Url::parse("https://dl.example.com/1.0-1--1.1-2.delta").unwrap(),
            "MC0=".into(),
            12,
        )
        .unwrap();
        let version = Version::remote(
            "1.1-2".into(),
            "1.1".into(),
            "MCw=".into(),
            40,
            Url::parse("https://dl.example.com/1.1-2.zip").unwrap(),
        )
        .with_deltas(vec![delta]);

        let json = serde_json::to_value(WireVersion::from_version(&version).unwrap()).unwrap();
        assert_eq!(json["shortVersion"], "1.1");
        assert_eq!(json["deltas"][0]["identifier"], "1.0-1--1.1-2");
        assert_eq!(json["deltas"][0]["fromVersion"], "1.0-1");
        assert!(json["deltas"][0].get("fromVersionSignature").is_none());
    }

    #[tokio::test]
    async fn update_without_password_is_refused_before_any_request() {
        let mut config = config("http://127.0.0.1:9");
        config.password = Some(String::new());
        let client = CatalogClient::new(&config).unwrap();
        let version = Version::remote(
            "1.0-1".into(),
            "1.0".into(),
            "sig".into(),
            1,
            Url::parse("https://dl.example.com/1.0-1.zip").unwrap(),
        );

        let err = client
            .update_version(&version, &Logger::quiet())
            .await
            .unwrap_err();
        assert!(matches!(err, SparklerError::MissingCredentials));
    }
}
